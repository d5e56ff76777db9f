use lnhub_sdk::objects::{NewAddressRequest, NewAddressResponse};
use tracing::debug;

use super::OpError;
use crate::events::{EventBus, EventEnvelope};
use crate::node::LightningNode;

/// Ask the node for a fresh on-chain address and publish it on the bus.
pub async fn new_address(
    node: &dyn LightningNode,
    bus: &EventBus,
    request: NewAddressRequest,
    request_id: &str,
) -> Result<(), OpError> {
    let address = node.new_address(&request).await?;
    debug!(request_id, %address, "new address created");
    bus.publish(EventEnvelope::Address(NewAddressResponse {
        request_id: request_id.to_string(),
        node_id: request.node_id,
        address,
    }));
    Ok(())
}
