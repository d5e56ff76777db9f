//! The production [`LightningNode`] implementation.
//!
//! Talks to the node's management API: unary calls are JSON over HTTP,
//! long-lived streams are JSON frames over a websocket. A stream is opened
//! by connecting to `/v1/events` and sending a single subscribe frame
//! naming the channel (and carrying the operation request, for the
//! operation streams); every subsequent text frame is one item.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use lnhub_sdk::objects::{
    CloseChannelRequest, NewAddressRequest, NewPaymentRequest, OpenChannelRequest,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use super::{
    ChannelCloseUpdate, ChannelEventUpdate, ChannelOpenUpdate, ChannelSnapshot,
    ClosedChannelSnapshot, EventStream, ForwardEntry, GraphUpdate, HtlcEvent, InvoiceUpdate,
    LightningNode, NodeError, NodeInfo, PaymentUpdate, PeerEventUpdate, RemoteNodeInfo,
    RoutingPolicySnapshot, TransactionUpdate,
};

/// Connection settings for the external node's management API.
#[derive(Debug, Clone)]
pub struct RemoteNodeConfig {
    /// HTTP base address, e.g. `https://node.example:8080/`.
    pub address: Url,
    /// Websocket base address; derived from `address` when absent.
    pub ws_address: Option<Url>,
    pub auth_token: String,
}

/// [`LightningNode`] implementation over the node's remote management API.
pub struct RemoteNode {
    http: reqwest::Client,
    base: Url,
    ws_base: Url,
    auth_token: String,
}

/// First frame sent on a freshly opened event websocket.
#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    token: &'a str,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<serde_json::Value>,
}

impl RemoteNode {
    pub fn new(config: RemoteNodeConfig) -> Result<Self, NodeError> {
        let ws_base = match config.ws_address {
            Some(url) => url,
            None => derive_ws_url(&config.address)?,
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base: config.address,
            ws_base,
            auth_token: config.auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, NodeError> {
        self.base
            .join(path)
            .map_err(|e| NodeError::Transport(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NodeError> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, NodeError> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(&self.auth_token)
            .query(query)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, NodeError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NodeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(NodeError::Api { message });
        }
        Ok(response.json().await?)
    }

    /// Connect the event websocket, send the subscribe frame for `channel`,
    /// and adapt the incoming text frames into a typed stream.
    async fn open_stream<T>(
        &self,
        channel: &'static str,
        request: Option<serde_json::Value>,
    ) -> Result<EventStream<T>, NodeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self
            .ws_base
            .join("v1/events")
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        let (mut sink, frames) = socket.split();

        let subscribe = serde_json::to_string(&SubscribeFrame {
            token: &self.auth_token,
            channel,
            request,
        })?;
        sink.send(Message::Text(subscribe))
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        debug!(channel, "node event stream opened");

        let items = frames.filter_map(|frame| {
            futures_util::future::ready(match frame {
                Ok(Message::Text(text)) => {
                    Some(serde_json::from_str::<T>(&text).map_err(NodeError::from))
                }
                Ok(Message::Close(_)) => Some(Err(NodeError::Disconnected)),
                Ok(_) => None,
                Err(e) => Some(Err(NodeError::Transport(e.to_string()))),
            })
        });
        Ok(Box::pin(items))
    }
}

/// Map the HTTP base URL onto the matching websocket scheme.
fn derive_ws_url(address: &Url) -> Result<Url, NodeError> {
    let mut ws = address.clone();
    let scheme = match address.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    ws.set_scheme(scheme)
        .map_err(|_| NodeError::Transport(format!("cannot derive ws url from {address}")))?;
    Ok(ws)
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    channels: Vec<ChannelSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosedChannelsResponse {
    channels: Vec<ClosedChannelSnapshot>,
}

#[derive(Debug, Deserialize)]
struct PoliciesResponse {
    policies: Vec<RoutingPolicySnapshot>,
}

#[derive(Debug, Deserialize)]
struct ForwardsResponse {
    forwards: Vec<ForwardEntry>,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[async_trait]
impl LightningNode for RemoteNode {
    async fn get_info(&self) -> Result<NodeInfo, NodeError> {
        self.get_json("v1/getinfo").await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSnapshot>, NodeError> {
        let response: ChannelsResponse = self.get_json("v1/channels").await?;
        Ok(response.channels)
    }

    async fn closed_channels(&self) -> Result<Vec<ClosedChannelSnapshot>, NodeError> {
        let response: ClosedChannelsResponse = self.get_json("v1/channels/closed").await?;
        Ok(response.channels)
    }

    async fn get_node_info(&self, pubkey: &str) -> Result<RemoteNodeInfo, NodeError> {
        self.get_json(&format!("v1/graph/nodes/{pubkey}")).await
    }

    async fn routing_policies(&self) -> Result<Vec<RoutingPolicySnapshot>, NodeError> {
        let response: PoliciesResponse = self.get_json("v1/graph/policies").await?;
        Ok(response.policies)
    }

    async fn forwarding_history(
        &self,
        since_time_ns: i64,
        limit: u32,
    ) -> Result<Vec<ForwardEntry>, NodeError> {
        let response: ForwardsResponse = self
            .get_json_with_query(
                "v1/forwards",
                &[
                    ("sinceTimeNs", since_time_ns.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.forwards)
    }

    async fn subscribe_transactions(&self) -> Result<EventStream<TransactionUpdate>, NodeError> {
        self.open_stream("transactions", None).await
    }

    async fn subscribe_htlc_events(&self) -> Result<EventStream<HtlcEvent>, NodeError> {
        self.open_stream("htlc-events", None).await
    }

    async fn subscribe_channel_events(&self) -> Result<EventStream<ChannelEventUpdate>, NodeError> {
        self.open_stream("channel-events", None).await
    }

    async fn subscribe_channel_graph(&self) -> Result<EventStream<GraphUpdate>, NodeError> {
        self.open_stream("channel-graph", None).await
    }

    async fn subscribe_invoices(&self) -> Result<EventStream<InvoiceUpdate>, NodeError> {
        self.open_stream("invoices", None).await
    }

    async fn subscribe_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError> {
        self.open_stream("payments", None).await
    }

    async fn track_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError> {
        self.open_stream("payment-updates", None).await
    }

    async fn subscribe_peer_events(&self) -> Result<EventStream<PeerEventUpdate>, NodeError> {
        self.open_stream("peer-events", None).await
    }

    async fn send_payment(
        &self,
        request: &NewPaymentRequest,
    ) -> Result<EventStream<PaymentUpdate>, NodeError> {
        let request = serde_json::to_value(request)?;
        self.open_stream("send-payment", Some(request)).await
    }

    async fn new_address(&self, request: &NewAddressRequest) -> Result<String, NodeError> {
        let response: AddressResponse = self.post_json("v1/addresses", request).await?;
        Ok(response.address)
    }

    async fn open_channel(
        &self,
        request: &OpenChannelRequest,
    ) -> Result<EventStream<ChannelOpenUpdate>, NodeError> {
        let request = serde_json::to_value(request)?;
        self.open_stream("open-channel", Some(request)).await
    }

    async fn close_channel(
        &self,
        request: &CloseChannelRequest,
    ) -> Result<EventStream<ChannelCloseUpdate>, NodeError> {
        let request = serde_json::to_value(request)?;
        self.open_stream("close-channel", Some(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_derived_from_http_scheme() {
        let http: Url = "http://node.local:8080/".parse().unwrap();
        assert_eq!(derive_ws_url(&http).unwrap().scheme(), "ws");
        let https: Url = "https://node.local:8080/".parse().unwrap();
        assert_eq!(derive_ws_url(&https).unwrap().scheme(), "wss");
    }

    #[test]
    fn subscribe_frame_shape() {
        let frame = SubscribeFrame {
            token: "secret",
            channel: "invoices",
            request: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["channel"], "invoices");
        assert_eq!(json["token"], "secret");
        assert!(json.get("request").is_none());
    }

    #[test]
    fn subscribe_frame_carries_operation_request() {
        let frame = SubscribeFrame {
            token: "secret",
            channel: "close-channel",
            request: Some(serde_json::json!({"channelPoint": "ab:0"})),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["request"]["channelPoint"], "ab:0");
    }
}
