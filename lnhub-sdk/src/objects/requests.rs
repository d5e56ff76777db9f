//! Operation request payloads carried inside a [`WsRequest`](super::ws::WsRequest).
//!
//! Each request names the local node it targets via `node_id`; amounts are
//! integer satoshi / millisatoshi, never floats.

use serde::{Deserialize, Serialize};

/// On-chain address kinds the node can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Native segwit (bech32).
    P2wpkh,
    /// Segwit nested in P2SH, for legacy senders.
    NestedP2wpkh,
    /// Taproot.
    P2tr,
}

/// Request payload for paying an invoice or sending a keysend payment.
///
/// Either `payment_request` (a BOLT11 invoice) or `dest_pubkey` + `amt_msat`
/// (keysend) must be populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentRequest {
    pub node_id: i32,
    /// BOLT11 invoice to pay.
    pub payment_request: Option<String>,
    /// Destination public key for keysend when no invoice is supplied.
    pub dest_pubkey: Option<String>,
    /// Amount override in millisatoshi (required for zero-amount invoices
    /// and keysend).
    pub amt_msat: Option<i64>,
    /// Upper bound on routing fees, in millisatoshi.
    pub fee_limit_msat: i64,
    /// Give up pathfinding after this many seconds.
    pub timeout_seconds: Option<i32>,
    #[serde(default)]
    pub allow_self_payment: bool,
}

/// Request payload for generating a fresh on-chain address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddressRequest {
    pub node_id: i32,
    pub address_type: AddressType,
}

/// Request payload for opening a channel to a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelRequest {
    pub node_id: i32,
    /// Public key of the peer to open to.
    pub node_pubkey: String,
    /// Channel capacity funded by the local node, in satoshi.
    pub local_funding_amount_sat: i64,
    /// Amount pushed to the remote side on open, in satoshi.
    pub push_sat: Option<i64>,
    /// Funding transaction fee rate.
    pub sat_per_vbyte: Option<u64>,
    /// Open as an unannounced channel.
    pub private: Option<bool>,
    pub min_htlc_msat: Option<u64>,
}

/// Request payload for closing an existing channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelRequest {
    pub node_id: i32,
    /// `<funding txid>:<output index>` of the channel to close.
    pub channel_point: String,
    /// Force-close without waiting for the peer to cooperate.
    pub force: Option<bool>,
    /// Closing transaction fee rate (cooperative close only).
    pub sat_per_vbyte: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_request_camel_case_fields() {
        let json = r#"{
            "nodeId": 1,
            "paymentRequest": "lnbc1...",
            "feeLimitMsat": 10000
        }"#;
        let req: NewPaymentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.node_id, 1);
        assert_eq!(req.payment_request.as_deref(), Some("lnbc1..."));
        assert_eq!(req.fee_limit_msat, 10_000);
        assert!(!req.allow_self_payment);
        assert_eq!(req.amt_msat, None);
    }

    #[test]
    fn address_type_wire_names() {
        let req: NewAddressRequest =
            serde_json::from_str(r#"{"nodeId":2,"addressType":"p2tr"}"#).unwrap();
        assert_eq!(req.address_type, AddressType::P2tr);
        let json = serde_json::to_string(&NewAddressRequest {
            node_id: 2,
            address_type: AddressType::NestedP2wpkh,
        })
        .unwrap();
        assert!(json.contains(r#""addressType":"nested_p2wpkh""#));
    }
}
