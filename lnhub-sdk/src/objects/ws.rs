//! Websocket session protocol.
//!
//! The `GET /ws` endpoint upgrades to a duplex session. Inbound frames are
//! [`WsRequest`] objects; outbound frames are [`Pong`], [`WsError`], or a
//! relayed event payload (see [`super::events`]).
//!
//! # Protocol
//!
//! 1. The client sends `{"reqId":"...","type":"...", ...}` with at most one
//!    populated payload field matching `type`.
//! 2. `{"type":"ping"}` is answered with `{"message":"pong"}` and needs no
//!    `reqId`.
//! 3. Every other recognized type requires a non-empty `reqId`; failures are
//!    reported as `{"id":"<reqId>","type":"Error","error":"..."}`.
//! 4. A frame that does not decode at all yields a [`WsError`] with an empty
//!    id and [`PARSE_FAILURE`] as the message.

use serde::{Deserialize, Serialize};

use super::requests::{
    CloseChannelRequest, NewAddressRequest, NewPaymentRequest, OpenChannelRequest,
};

/// Fixed diagnostic sent when an inbound frame cannot be decoded.
pub const PARSE_FAILURE: &str =
    "Could not parse request, please check that your JSON is correctly formatted.";

/// One inbound client request.
///
/// `request_type` discriminates which payload field must be populated;
/// dispatch rejects requests where the two disagree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsRequest {
    pub req_id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub new_payment_request: Option<NewPaymentRequest>,
    pub new_address_request: Option<NewAddressRequest>,
    pub open_channel_request: Option<OpenChannelRequest>,
    pub close_channel_request: Option<CloseChannelRequest>,
}

/// Liveness acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub message: String,
}

impl Pong {
    pub fn new() -> Self {
        Self {
            message: "pong".to_string(),
        }
    }
}

impl Default for Pong {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed error frame relayed back to the requesting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsError {
    #[serde(rename = "id")]
    pub req_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
}

impl WsError {
    /// Build an error frame for the given request id.
    pub fn new(req_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            req_id: req_id.into(),
            kind: "Error".to_string(),
            error: error.into(),
        }
    }

    /// The fixed parse-failure frame (empty id).
    pub fn parse_failure() -> Self {
        Self::new("", PARSE_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_decodes_without_payloads() {
        let req: WsRequest = serde_json::from_str(r#"{"reqId":"1","type":"ping"}"#).unwrap();
        assert_eq!(req.req_id, "1");
        assert_eq!(req.request_type, "ping");
        assert!(req.new_payment_request.is_none());
    }

    #[test]
    fn missing_req_id_defaults_to_empty() {
        let req: WsRequest = serde_json::from_str(r#"{"type":"newPayment"}"#).unwrap();
        assert_eq!(req.req_id, "");
        assert_eq!(req.request_type, "newPayment");
    }

    #[test]
    fn pong_shape() {
        let json = serde_json::to_string(&Pong::new()).unwrap();
        assert_eq!(json, r#"{"message":"pong"}"#);
    }

    #[test]
    fn error_shape_matches_protocol() {
        let err = WsError::new("2", "unknown NewPaymentRequest for type: newPayment");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["id"], "2");
        assert_eq!(value["type"], "Error");
        assert_eq!(
            value["error"],
            "unknown NewPaymentRequest for type: newPayment"
        );
    }

    #[test]
    fn parse_failure_has_empty_id() {
        let err = WsError::parse_failure();
        assert_eq!(err.req_id, "");
        assert_eq!(err.error, PARSE_FAILURE);
    }

    #[test]
    fn request_with_payload_roundtrips() {
        let json = r#"{
            "reqId": "7",
            "type": "closeChannel",
            "closeChannelRequest": {"nodeId":1,"channelPoint":"ab:0","force":true}
        }"#;
        let req: WsRequest = serde_json::from_str(json).unwrap();
        let payload = req.close_channel_request.as_ref().unwrap();
        assert_eq!(payload.channel_point, "ab:0");
        assert_eq!(payload.force, Some(true));
        let back = serde_json::to_string(&req).unwrap();
        let reparsed: WsRequest = serde_json::from_str(&back).unwrap();
        assert_eq!(req, reparsed);
    }
}
