//! The external node collaborator boundary.
//!
//! [`LightningNode`] is the narrow interface the rest of the system consumes:
//! unary snapshot and operation calls, plus one long-lived subscribe method
//! per stream kind. A stream yields typed items until it is dropped or the
//! remote endpoint closes it; stream exhaustion and transport faults surface
//! as errors, distinguishable from cooperative cancellation (which tasks
//! handle through their cancellation token, never through the stream).

pub mod remote;

use async_trait::async_trait;
use futures_util::Stream;
use lnhub_sdk::objects::{
    ChannelCloseStatus, ChannelLifecycle, CloseChannelRequest, InvoiceState, NewPaymentRequest,
    OpenChannelRequest, OpenChannelStatus, PaymentStatus, PeerEventKind,
};
use serde::Deserialize;
use std::pin::Pin;
use thiserror::Error;

pub use remote::{RemoteNode, RemoteNodeConfig};

/// Errors surfaced by the external node collaborator.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Failed to reach or keep a connection to the node.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an application-level error.
    #[error("node API error: {message}")]
    Api { message: String },

    /// A stream item or response body did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// HTTP request error.
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote endpoint closed a long-lived stream.
    #[error("stream disconnected")]
    Disconnected,
}

/// A long-lived sequence of typed items from one node stream.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, NodeError>> + Send>>;

/// Identity and sync state of the local node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub identity_pubkey: String,
    pub alias: Option<String>,
    pub block_height: i64,
}

/// One currently open channel as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
    pub funding_txid: String,
    pub funding_output_index: i32,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub active: bool,
}

/// One historical (closed) channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedChannelSnapshot {
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
    pub funding_txid: String,
    pub funding_output_index: i32,
    /// `cooperative`, `local_force`, `remote_force`, `breach`, ...
    pub close_type: Option<String>,
}

/// Graph record for a single remote node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNodeInfo {
    pub pubkey: String,
    pub alias: Option<String>,
    pub color: Option<String>,
    pub last_update: Option<i64>,
}

/// One direction of a channel's advertised routing policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicySnapshot {
    pub channel_point: String,
    pub advertising_pubkey: String,
    pub fee_base_msat: i64,
    pub fee_rate_ppm: i64,
    pub min_htlc_msat: i64,
    pub max_htlc_msat: i64,
    pub time_lock_delta: i32,
    #[serde(default)]
    pub disabled: bool,
    pub last_update: i64,
}

/// An on-chain wallet transaction from the transactions stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub txid: String,
    pub amount_sat: i64,
    pub block_height: Option<i32>,
    pub total_fees_sat: Option<i64>,
    pub timestamp: i64,
    #[serde(default)]
    pub dest_addresses: Vec<String>,
}

/// Kind of an HTLC resolution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HtlcEventKind {
    Forward,
    ForwardFail,
    Settle,
    LinkFail,
}

/// One HTLC event from the router stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtlcEvent {
    pub time_ns: i64,
    pub event_type: HtlcEventKind,
    pub incoming_channel_id: Option<i64>,
    pub outgoing_channel_id: Option<i64>,
    pub incoming_htlc_id: Option<i64>,
    pub outgoing_htlc_id: Option<i64>,
}

/// One channel lifecycle transition from the channel events stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEventUpdate {
    pub kind: ChannelLifecycle,
    pub channel_point: String,
    pub remote_pubkey: Option<String>,
    pub capacity_sat: Option<i64>,
    pub funding_txid: Option<String>,
    pub funding_output_index: Option<i32>,
    #[serde(default)]
    pub private: bool,
    pub close_type: Option<String>,
}

/// One gossip update from the channel graph stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphUpdate {
    Node(RemoteNodeInfo),
    Channel(RoutingPolicySnapshot),
}

/// One invoice state change from the invoices stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceUpdate {
    pub payment_hash: String,
    pub payment_request: Option<String>,
    pub value_msat: i64,
    pub state: InvoiceState,
    pub amt_paid_msat: Option<i64>,
    pub settled_at: Option<i64>,
}

/// One payment state transition, from the payments streams or a send call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub payment_hash: String,
    pub status: PaymentStatus,
    pub value_msat: i64,
    pub fee_msat: Option<i64>,
    pub preimage: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Option<i64>,
}

/// A peer connection transition from the peer events stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEventUpdate {
    pub pubkey: String,
    pub kind: PeerEventKind,
}

/// One settled forward from the forwarding history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardEntry {
    pub time_ns: i64,
    pub incoming_channel_id: i64,
    pub outgoing_channel_id: i64,
    pub amt_in_msat: i64,
    pub amt_out_msat: i64,
    pub fee_msat: i64,
}

/// Progress update for a channel open initiated by us.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOpenUpdate {
    pub status: OpenChannelStatus,
    pub funding_txid: Option<String>,
    pub channel_point: Option<String>,
}

/// Progress update for a channel close initiated by us.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCloseUpdate {
    pub status: ChannelCloseStatus,
    pub closing_txid: Option<String>,
}

/// The external node's management API.
///
/// One implementation speaks to the real node ([`RemoteNode`]); tests
/// substitute in-memory fakes.
#[async_trait]
pub trait LightningNode: Send + Sync {
    // -- Unary snapshot calls -------------------------------------------

    async fn get_info(&self) -> Result<NodeInfo, NodeError>;
    async fn list_channels(&self) -> Result<Vec<ChannelSnapshot>, NodeError>;
    async fn closed_channels(&self) -> Result<Vec<ClosedChannelSnapshot>, NodeError>;
    async fn get_node_info(&self, pubkey: &str) -> Result<RemoteNodeInfo, NodeError>;
    /// Advertised routing policies for all of our open channels.
    async fn routing_policies(&self) -> Result<Vec<RoutingPolicySnapshot>, NodeError>;
    /// Forwards settled strictly after `since_time_ns`, oldest first,
    /// at most `limit` entries.
    async fn forwarding_history(
        &self,
        since_time_ns: i64,
        limit: u32,
    ) -> Result<Vec<ForwardEntry>, NodeError>;

    // -- Long-lived streams ---------------------------------------------

    async fn subscribe_transactions(&self) -> Result<EventStream<TransactionUpdate>, NodeError>;
    async fn subscribe_htlc_events(&self) -> Result<EventStream<HtlcEvent>, NodeError>;
    async fn subscribe_channel_events(&self) -> Result<EventStream<ChannelEventUpdate>, NodeError>;
    async fn subscribe_channel_graph(&self) -> Result<EventStream<GraphUpdate>, NodeError>;
    async fn subscribe_invoices(&self) -> Result<EventStream<InvoiceUpdate>, NodeError>;
    /// Newly initiated payments.
    async fn subscribe_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError>;
    /// State transitions of in-flight payments.
    async fn track_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError>;
    async fn subscribe_peer_events(&self) -> Result<EventStream<PeerEventUpdate>, NodeError>;

    // -- Domain operations ----------------------------------------------

    /// Initiate a payment; the returned stream yields updates until the
    /// payment reaches a terminal state.
    async fn send_payment(
        &self,
        request: &NewPaymentRequest,
    ) -> Result<EventStream<PaymentUpdate>, NodeError>;
    async fn new_address(&self, request: &lnhub_sdk::objects::NewAddressRequest)
    -> Result<String, NodeError>;
    async fn open_channel(
        &self,
        request: &OpenChannelRequest,
    ) -> Result<EventStream<ChannelOpenUpdate>, NodeError>;
    async fn close_channel(
        &self,
        request: &CloseChannelRequest,
    ) -> Result<EventStream<ChannelCloseUpdate>, NodeError>;
}
