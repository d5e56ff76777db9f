use futures_util::StreamExt;
use lnhub_sdk::objects::{NewPaymentRequest, NewPaymentResponse};
use tracing::debug;

use super::OpError;
use crate::events::{EventBus, EventEnvelope};
use crate::node::LightningNode;

/// Validate a payment request without touching the node.
pub(crate) fn validate_payment(request: &NewPaymentRequest) -> Result<(), OpError> {
    let has_invoice = request
        .payment_request
        .as_deref()
        .is_some_and(|r| !r.is_empty());
    let has_keysend = request
        .dest_pubkey
        .as_deref()
        .is_some_and(|k| !k.is_empty())
        && request.amt_msat.is_some();
    if !has_invoice && !has_keysend {
        return Err(OpError::Invalid(
            "either paymentRequest or destPubkey with amtMsat is required".to_string(),
        ));
    }
    if request.fee_limit_msat < 0 {
        return Err(OpError::Invalid("feeLimitMsat must not be negative".to_string()));
    }
    Ok(())
}

/// Initiate a payment and relay every state transition onto the bus.
///
/// Returns once the node's update stream ends (terminal state) or fails;
/// the error goes straight back to the requesting client.
pub async fn send_new_payment(
    node: &dyn LightningNode,
    bus: &EventBus,
    request: NewPaymentRequest,
    request_id: &str,
) -> Result<(), OpError> {
    validate_payment(&request)?;

    let node_id = request.node_id;
    let mut updates = node.send_payment(&request).await?;
    while let Some(update) = updates.next().await {
        let update = update?;
        debug!(request_id, payment_hash = %update.payment_hash, status = ?update.status,
            "payment update");
        bus.publish(EventEnvelope::Payment(NewPaymentResponse {
            request_id: request_id.to_string(),
            node_id,
            payment_hash: update.payment_hash,
            status: update.status,
            preimage: update.preimage,
            fee_paid_msat: update.fee_msat,
            failure_reason: update.failure_reason,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> NewPaymentRequest {
        NewPaymentRequest {
            node_id: 1,
            payment_request: None,
            dest_pubkey: None,
            amt_msat: None,
            fee_limit_msat: 1000,
            timeout_seconds: None,
            allow_self_payment: false,
        }
    }

    #[test]
    fn rejects_request_with_no_destination() {
        let err = validate_payment(&base_request()).unwrap_err();
        assert!(matches!(err, OpError::Invalid(_)));
    }

    #[test]
    fn accepts_invoice_payment() {
        let request = NewPaymentRequest {
            payment_request: Some("lnbc1...".into()),
            ..base_request()
        };
        assert!(validate_payment(&request).is_ok());
    }

    #[test]
    fn keysend_needs_amount() {
        let request = NewPaymentRequest {
            dest_pubkey: Some("02ab".into()),
            ..base_request()
        };
        assert!(validate_payment(&request).is_err());

        let request = NewPaymentRequest {
            dest_pubkey: Some("02ab".into()),
            amt_msat: Some(1500),
            ..base_request()
        };
        assert!(validate_payment(&request).is_ok());
    }

    #[test]
    fn rejects_negative_fee_limit() {
        let request = NewPaymentRequest {
            payment_request: Some("lnbc1...".into()),
            fee_limit_msat: -1,
            ..base_request()
        };
        assert!(validate_payment(&request).is_err());
    }
}
