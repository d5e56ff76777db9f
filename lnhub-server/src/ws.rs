//! The per-client gateway session.
//!
//! Each websocket connection runs three units of work anchored to one
//! session-scoped cancellation token and one outbound queue:
//!
//! - an **inbound loop** decoding [`WsRequest`] frames and dispatching each
//!   on its own task (a slow operation never blocks the read path),
//! - a **relay loop** owning the session's bus subscription and forwarding
//!   only the envelope kinds in the session's interest set,
//! - an **outbound writer**, the sole writer to the transport, draining the
//!   queue so command responses and relayed events never interleave.
//!
//! Per-request failures go back to the requesting client as [`WsError`]
//! frames; transport failures tear down this session only.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use lnhub_core::events::{BusSubscription, EventKind};
use lnhub_core::ops;
use lnhub_sdk::objects::{
    CloseChannelRequest, NewAddressRequest, NewPaymentRequest, OpenChannelRequest, Pong, WsError,
    WsRequest,
};

use crate::state::AppState;

/// Per-session outbound queue depth.
const OUTBOUND_QUEUE: usize = 64;

/// `GET /ws` - upgrade to a gateway session.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| gateway_session(socket, state))
}

/// One frame waiting in the outbound queue.
enum OutboundFrame {
    Pong(Pong),
    Error(WsError),
    /// A relayed event payload, already in its client JSON shape.
    Event(serde_json::Value),
}

impl OutboundFrame {
    fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundFrame::Pong(pong) => serde_json::to_string(pong),
            OutboundFrame::Error(err) => serde_json::to_string(err),
            OutboundFrame::Event(value) => serde_json::to_string(value),
        }
    }
}

/// Envelope kinds a fresh session relays to its client.
///
/// Kept as a per-session value so the set can become client-configurable
/// without touching the relay loop.
fn default_relay_kinds() -> HashSet<EventKind> {
    [
        EventKind::Payment,
        EventKind::Address,
        EventKind::ChannelOpen,
        EventKind::ChannelClose,
    ]
    .into_iter()
    .collect()
}

async fn gateway_session(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    let done = CancellationToken::new();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE);
    let (mut sink, frames) = socket.split();
    let subscription = state.bus.subscribe();
    debug!(%session_id, "gateway session opened");

    let inbound = tokio::spawn(inbound_loop(
        frames,
        state,
        out_tx.clone(),
        done.clone(),
        session_id,
    ));
    let relay = tokio::spawn(relay_loop(
        subscription,
        default_relay_kinds(),
        out_tx,
        done.clone(),
        session_id,
    ));

    outbound_writer(&mut sink, &mut out_rx, &done, session_id).await;

    // Whatever ended the writer ends the session; both loops observe the
    // token and exit, dropping the bus subscription with the relay loop.
    done.cancel();
    let _ = inbound.await;
    let _ = relay.await;
    debug!(%session_id, "gateway session closed");
}

/// Drain the outbound queue into the transport. Sole writer to the socket.
async fn outbound_writer(
    sink: &mut SplitSink<WebSocket, Message>,
    out_rx: &mut mpsc::Receiver<OutboundFrame>,
    done: &CancellationToken,
    session_id: Uuid,
) {
    loop {
        tokio::select! {
            biased;

            _ = done.cancelled() => return,

            frame = out_rx.recv() => {
                let Some(frame) = frame else { return };
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(%session_id, error = %e, "failed to encode outbound frame");
                        return;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    debug!(%session_id, "websocket write failed");
                    return;
                }
            }
        }
    }
}

/// Decode inbound frames; each decoded request is dispatched on its own task.
async fn inbound_loop(
    mut frames: SplitStream<WebSocket>,
    state: AppState,
    out: mpsc::Sender<OutboundFrame>,
    done: CancellationToken,
    session_id: Uuid,
) {
    loop {
        tokio::select! {
            biased;

            _ = done.cancelled() => return,

            frame = frames.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsRequest>(&text) {
                            Ok(request) => {
                                tokio::spawn(process_request(
                                    state.clone(),
                                    request,
                                    out.clone(),
                                ));
                            }
                            Err(e) => {
                                debug!(%session_id, error = %e, "undecodable request");
                                if out.send(OutboundFrame::Error(WsError::parse_failure()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        if out.send(OutboundFrame::Error(WsError::parse_failure()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    // Keepalive frames are handled by the transport.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%session_id, "client closed connection");
                        done.cancel();
                        return;
                    }
                    Some(Err(e)) => {
                        debug!(%session_id, error = %e, "websocket read failed");
                        done.cancel();
                        return;
                    }
                }
            }
        }
    }
}

/// Forward bus envelopes the session is interested in.
async fn relay_loop(
    mut subscription: BusSubscription,
    kinds: HashSet<EventKind>,
    out: mpsc::Sender<OutboundFrame>,
    done: CancellationToken,
    session_id: Uuid,
) {
    loop {
        tokio::select! {
            biased;

            _ = done.cancelled() => return,

            maybe = subscription.recv() => {
                let Some(envelope) = maybe else { return };
                if !kinds.contains(&envelope.kind()) {
                    continue;
                }
                match envelope.client_payload() {
                    Ok(payload) => {
                        if out.send(OutboundFrame::Event(payload)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(%session_id, error = %e, "failed to serialize event payload");
                    }
                }
            }
        }
    }
}

/// A validated inbound command.
#[derive(Debug)]
enum Command {
    Ping,
    Payment(NewPaymentRequest),
    Address(NewAddressRequest),
    Open(OpenChannelRequest),
    Close(CloseChannelRequest),
}

/// Validate the discriminator/payload agreement of one request.
fn parse_command(request: &WsRequest) -> Result<Command, WsError> {
    let request_type = request.request_type.as_str();
    if request_type == "ping" {
        return Ok(Command::Ping);
    }

    if request.req_id.is_empty() {
        return Err(WsError::new(
            "",
            format!("unknown ReqId for type: {request_type}"),
        ));
    }

    match request_type {
        "newPayment" => request
            .new_payment_request
            .clone()
            .map(Command::Payment)
            .ok_or_else(|| {
                WsError::new(
                    request.req_id.as_str(),
                    format!("unknown NewPaymentRequest for type: {request_type}"),
                )
            }),
        "newAddress" => request
            .new_address_request
            .clone()
            .map(Command::Address)
            .ok_or_else(|| {
                WsError::new(
                    request.req_id.as_str(),
                    format!("unknown NewAddressRequest for type: {request_type}"),
                )
            }),
        "openChannel" => request
            .open_channel_request
            .clone()
            .map(Command::Open)
            .ok_or_else(|| {
                WsError::new(
                    request.req_id.as_str(),
                    format!("unknown OpenChannelRequest for type: {request_type}"),
                )
            }),
        "closeChannel" => request
            .close_channel_request
            .clone()
            .map(Command::Close)
            .ok_or_else(|| {
                WsError::new(
                    request.req_id.as_str(),
                    format!("unknown CloseChannelRequest for type: {request_type}"),
                )
            }),
        other => Err(WsError::new(
            request.req_id.as_str(),
            format!("unknown request type: {other}"),
        )),
    }
}

/// Dispatch one request to its collaborator operation.
///
/// Every failure becomes a typed error frame carrying the original
/// correlation id; nothing is thrown back at the transport.
async fn process_request(state: AppState, request: WsRequest, out: mpsc::Sender<OutboundFrame>) {
    let command = match parse_command(&request) {
        Ok(command) => command,
        Err(err) => {
            let _ = out.send(OutboundFrame::Error(err)).await;
            return;
        }
    };

    let result = match command {
        Command::Ping => {
            let _ = out.send(OutboundFrame::Pong(Pong::new())).await;
            return;
        }
        Command::Payment(payload) => {
            ops::send_new_payment(state.node.as_ref(), &state.bus, payload, &request.req_id).await
        }
        Command::Address(payload) => {
            ops::new_address(state.node.as_ref(), &state.bus, payload, &request.req_id).await
        }
        Command::Open(payload) => {
            ops::open_channel(state.node.as_ref(), &state.bus, payload, &request.req_id).await
        }
        Command::Close(payload) => {
            ops::close_channel(
                state.node.as_ref(),
                &state.bus,
                &state.caches.channel_points,
                payload,
                &request.req_id,
            )
            .await
        }
    };

    if let Err(err) = result {
        let _ = out
            .send(OutboundFrame::Error(WsError::new(
                request.req_id.as_str(),
                err.to_string(),
            )))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> WsRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ping_needs_no_req_id() {
        let req = request(r#"{"type":"ping"}"#);
        assert!(matches!(parse_command(&req), Ok(Command::Ping)));
    }

    #[test]
    fn missing_payload_yields_exact_error() {
        let req = request(r#"{"reqId":"2","type":"newPayment"}"#);
        let err = parse_command(&req).unwrap_err();
        assert_eq!(err.req_id, "2");
        assert_eq!(err.kind, "Error");
        assert_eq!(err.error, "unknown NewPaymentRequest for type: newPayment");
    }

    #[test]
    fn empty_req_id_is_rejected_for_operations() {
        let req = request(r#"{"type":"newAddress"}"#);
        let err = parse_command(&req).unwrap_err();
        assert_eq!(err.req_id, "");
        assert_eq!(err.error, "unknown ReqId for type: newAddress");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let req = request(r#"{"reqId":"9","type":"selfDestruct"}"#);
        let err = parse_command(&req).unwrap_err();
        assert_eq!(err.error, "unknown request type: selfDestruct");
    }

    #[test]
    fn matching_payload_is_accepted() {
        let req = request(
            r#"{"reqId":"5","type":"newAddress",
                "newAddressRequest":{"nodeId":1,"addressType":"p2wpkh"}}"#,
        );
        assert!(matches!(parse_command(&req), Ok(Command::Address(_))));
    }

    #[test]
    fn default_filter_covers_command_responses_only() {
        let kinds = default_relay_kinds();
        assert!(kinds.contains(&EventKind::Payment));
        assert!(kinds.contains(&EventKind::Address));
        assert!(kinds.contains(&EventKind::ChannelOpen));
        assert!(kinds.contains(&EventKind::ChannelClose));
        assert!(!kinds.contains(&EventKind::Invoice));
        assert!(!kinds.contains(&EventKind::Transaction));
    }

    #[test]
    fn pong_frame_shape() {
        let json = OutboundFrame::Pong(Pong::new()).to_json().unwrap();
        assert_eq!(json, r#"{"message":"pong"}"#);
    }

    #[test]
    fn parse_failure_frame_shape() {
        let json = OutboundFrame::Error(WsError::parse_failure()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "");
        assert_eq!(value["type"], "Error");
    }
}
