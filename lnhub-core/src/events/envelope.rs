//! The tagged event envelope published on the broadcast bus.

use lnhub_sdk::objects::{
    ChannelStateEvent, CloseChannelResponse, InvoiceEvent, NewAddressResponse, NewPaymentResponse,
    OpenChannelResponse, PeerEvent, TransactionEvent,
};

/// Discriminator tag for [`EventEnvelope`] variants.
///
/// Gateway sessions keep a set of these as their interest filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Payment,
    Address,
    ChannelOpen,
    ChannelClose,
    ChannelState,
    Transaction,
    Invoice,
    Peer,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Payment => "payment",
            EventKind::Address => "address",
            EventKind::ChannelOpen => "channel-open",
            EventKind::ChannelClose => "channel-close",
            EventKind::ChannelState => "channel-state",
            EventKind::Transaction => "transaction",
            EventKind::Invoice => "invoice",
            EventKind::Peer => "peer",
        };
        write!(f, "{name}")
    }
}

/// One normalized domain occurrence, published for distribution.
///
/// Exactly one variant is populated per envelope. Consumers must tolerate
/// kinds they do not understand (match on [`kind()`](EventEnvelope::kind)
/// and skip), so new variants can be added without breaking sessions.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventEnvelope {
    Payment(NewPaymentResponse),
    Address(NewAddressResponse),
    ChannelOpen(OpenChannelResponse),
    ChannelClose(CloseChannelResponse),
    ChannelState(ChannelStateEvent),
    Transaction(TransactionEvent),
    Invoice(InvoiceEvent),
    Peer(PeerEvent),
}

impl EventEnvelope {
    /// The tag of the populated variant.
    pub fn kind(&self) -> EventKind {
        match self {
            EventEnvelope::Payment(_) => EventKind::Payment,
            EventEnvelope::Address(_) => EventKind::Address,
            EventEnvelope::ChannelOpen(_) => EventKind::ChannelOpen,
            EventEnvelope::ChannelClose(_) => EventKind::ChannelClose,
            EventEnvelope::ChannelState(_) => EventKind::ChannelState,
            EventEnvelope::Transaction(_) => EventKind::Transaction,
            EventEnvelope::Invoice(_) => EventKind::Invoice,
            EventEnvelope::Peer(_) => EventKind::Peer,
        }
    }

    /// Serialize the inner payload as the JSON shape a client receives.
    ///
    /// The envelope itself never appears on the wire; each payload is its
    /// own object.
    pub fn client_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EventEnvelope::Payment(p) => serde_json::to_value(p),
            EventEnvelope::Address(a) => serde_json::to_value(a),
            EventEnvelope::ChannelOpen(o) => serde_json::to_value(o),
            EventEnvelope::ChannelClose(c) => serde_json::to_value(c),
            EventEnvelope::ChannelState(s) => serde_json::to_value(s),
            EventEnvelope::Transaction(t) => serde_json::to_value(t),
            EventEnvelope::Invoice(i) => serde_json::to_value(i),
            EventEnvelope::Peer(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lnhub_sdk::objects::PaymentStatus;

    #[test]
    fn kind_matches_variant() {
        let envelope = EventEnvelope::Address(NewAddressResponse {
            request_id: "1".into(),
            node_id: 1,
            address: "bc1q...".into(),
        });
        assert_eq!(envelope.kind(), EventKind::Address);
    }

    #[test]
    fn client_payload_is_unwrapped() {
        let envelope = EventEnvelope::Payment(NewPaymentResponse {
            request_id: "9".into(),
            node_id: 1,
            payment_hash: "aa".into(),
            status: PaymentStatus::InFlight,
            preimage: None,
            fee_paid_msat: None,
            failure_reason: None,
        });
        let value = envelope.client_payload().unwrap();
        // No envelope wrapper on the wire: the payload's own fields sit at
        // the top level.
        assert_eq!(value["requestId"], "9");
        assert!(value.get("Payment").is_none());
    }
}
