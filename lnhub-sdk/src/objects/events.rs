//! Client-visible event payloads.
//!
//! These are the JSON shapes a gateway session relays to its client when the
//! matching event kind is in the session's interest set. Each payload
//! serializes as its own object; there is no outer envelope on the wire.
//! Operation responses (`*Response`) carry the `request_id` of the websocket
//! request that triggered them so clients can correlate.

use serde::{Deserialize, Serialize};

/// Terminal and non-terminal payment states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    InFlight,
    Succeeded,
    Failed,
}

/// Progress of a channel open initiated through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenChannelStatus {
    /// Funding transaction broadcast, not yet confirmed.
    Pending,
    /// Channel is open and usable.
    Open,
}

/// Progress of a channel close initiated through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCloseStatus {
    ClosePending,
    Closed,
}

/// Invoice lifecycle states as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    Open,
    Settled,
    Canceled,
    Accepted,
}

/// Channel lifecycle transitions observed on the channel events stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelLifecycle {
    Opened,
    Closed,
    Active,
    Inactive,
    /// All pending HTLCs of a closed channel have been swept.
    FullyResolved,
}

/// Whether a peer connection came up or went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerEventKind {
    Online,
    Offline,
}

/// Result/progress of a payment initiated via `newPayment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentResponse {
    pub request_id: String,
    pub node_id: i32,
    pub payment_hash: String,
    pub status: PaymentStatus,
    pub preimage: Option<String>,
    pub fee_paid_msat: Option<i64>,
    pub failure_reason: Option<String>,
}

/// Address produced by a `newAddress` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddressResponse {
    pub request_id: String,
    pub node_id: i32,
    pub address: String,
}

/// Progress of an `openChannel` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResponse {
    pub request_id: String,
    pub node_id: i32,
    pub status: OpenChannelStatus,
    pub funding_txid: Option<String>,
    /// Populated once the funding output is known.
    pub channel_point: Option<String>,
}

/// Progress of a `closeChannel` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelResponse {
    pub request_id: String,
    pub node_id: i32,
    pub status: ChannelCloseStatus,
    pub closing_txid: Option<String>,
}

/// A channel lifecycle transition seen on the node's channel events stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStateEvent {
    pub node_id: i32,
    pub channel_point: String,
    pub remote_pubkey: Option<String>,
    pub state: ChannelLifecycle,
    pub capacity_sat: Option<i64>,
}

/// An on-chain wallet transaction relevant to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub node_id: i32,
    pub txid: String,
    pub amount_sat: i64,
    pub block_height: Option<i32>,
}

/// An invoice state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEvent {
    pub node_id: i32,
    pub payment_hash: String,
    pub state: InvoiceState,
    pub value_msat: i64,
    pub amt_paid_msat: Option<i64>,
}

/// A peer connection coming online or dropping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEvent {
    pub node_id: i32,
    pub pubkey: String,
    pub kind: PeerEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_response_shape() {
        let resp = NewPaymentResponse {
            request_id: "42".into(),
            node_id: 1,
            payment_hash: "abcd".into(),
            status: PaymentStatus::Succeeded,
            preimage: Some("ef01".into()),
            fee_paid_msat: Some(12),
            failure_reason: None,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["requestId"], "42");
        assert_eq!(value["status"], "SUCCEEDED");
        assert_eq!(value["feePaidMsat"], 12);
    }

    #[test]
    fn lifecycle_wire_names() {
        assert_eq!(
            serde_json::to_string(&ChannelLifecycle::FullyResolved).unwrap(),
            r#""FULLY_RESOLVED""#
        );
        let state: ChannelLifecycle = serde_json::from_str(r#""INACTIVE""#).unwrap();
        assert_eq!(state, ChannelLifecycle::Inactive);
    }
}
