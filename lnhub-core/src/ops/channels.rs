use futures_util::StreamExt;
use lnhub_sdk::objects::{
    CloseChannelRequest, CloseChannelResponse, OpenChannelRequest, OpenChannelResponse,
};
use tracing::debug;

use super::OpError;
use crate::cache::NodeScopedSetCache;
use crate::events::{EventBus, EventEnvelope};
use crate::node::LightningNode;

pub(crate) fn validate_open(request: &OpenChannelRequest) -> Result<(), OpError> {
    if request.node_pubkey.is_empty() {
        return Err(OpError::Invalid("nodePubkey is required".to_string()));
    }
    if request.local_funding_amount_sat <= 0 {
        return Err(OpError::Invalid(
            "localFundingAmountSat must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Open a channel and relay funding progress onto the bus.
pub async fn open_channel(
    node: &dyn LightningNode,
    bus: &EventBus,
    request: OpenChannelRequest,
    request_id: &str,
) -> Result<(), OpError> {
    validate_open(&request)?;

    let node_id = request.node_id;
    let mut updates = node.open_channel(&request).await?;
    while let Some(update) = updates.next().await {
        let update = update?;
        debug!(request_id, status = ?update.status, "channel open update");
        bus.publish(EventEnvelope::ChannelOpen(OpenChannelResponse {
            request_id: request_id.to_string(),
            node_id,
            status: update.status,
            funding_txid: update.funding_txid,
            channel_point: update.channel_point,
        }));
    }
    Ok(())
}

/// Close a channel and relay closing progress onto the bus.
///
/// The channel point is checked against the open channel point cache first,
/// so an unknown point is rejected without a node round-trip.
pub async fn close_channel(
    node: &dyn LightningNode,
    bus: &EventBus,
    channel_points: &NodeScopedSetCache,
    request: CloseChannelRequest,
    request_id: &str,
) -> Result<(), OpError> {
    if !channel_points.contains(request.node_id, &request.channel_point) {
        return Err(OpError::Invalid(format!(
            "unknown channel point: {}",
            request.channel_point
        )));
    }

    let node_id = request.node_id;
    let mut updates = node.close_channel(&request).await?;
    while let Some(update) = updates.next().await {
        let update = update?;
        debug!(request_id, status = ?update.status, "channel close update");
        bus.publish(EventEnvelope::ChannelClose(CloseChannelResponse {
            request_id: request_id.to_string(),
            node_id,
            status: update.status,
            closing_txid: update.closing_txid,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_requires_pubkey_and_positive_amount() {
        let mut request = OpenChannelRequest {
            node_id: 1,
            node_pubkey: String::new(),
            local_funding_amount_sat: 100_000,
            push_sat: None,
            sat_per_vbyte: None,
            private: None,
            min_htlc_msat: None,
        };
        assert!(validate_open(&request).is_err());

        request.node_pubkey = "02ab".into();
        assert!(validate_open(&request).is_ok());

        request.local_funding_amount_sat = 0;
        assert!(validate_open(&request).is_err());
    }
}
