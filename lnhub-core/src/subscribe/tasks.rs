//! The long-lived subscription tasks owned by the supervisor.
//!
//! Every task follows the same inner contract: open one stream on the
//! external node, and for each received item write zero or more records
//! through the store and publish zero or more envelopes on the bus. A task
//! returns `Ok` only when the shared scope is cancelled.
//!
//! Disconnect policy is explicit and per-stream: `channel-graph` and
//! `forwards` retry internally with bounded, jittered backoff because their
//! data is idempotent; every other stream surfaces the disconnect as a task
//! failure immediately, because a silent gap there is worse than a restart.

use futures_util::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lnhub_sdk::objects::{ChannelLifecycle, ChannelStateEvent, InvoiceEvent, PeerEvent,
    TransactionEvent};

use super::TaskError;
use crate::cache::{CacheUpdate, Caches};
use crate::db::LedgerStore;
use crate::entities::channel::{ChannelEventRecord, ChannelUpsert};
use crate::entities::forward::ForwardInsert;
use crate::entities::htlc::HtlcEventRecord;
use crate::entities::invoice::InvoiceUpsert;
use crate::entities::payment::{PaymentStateUpdate, PaymentUpsert};
use crate::entities::routing_policy::RoutingPolicyUpsert;
use crate::entities::transaction::TransactionUpsert;
use crate::entities::{ChannelStatus, HtlcEventType};
use crate::events::channels::CacheUpdateSender;
use crate::events::{EventBus, EventEnvelope};
use crate::node::{GraphUpdate, HtlcEventKind, LightningNode, NodeError};

/// Bounded retry for the idempotent streams.
const STREAM_RETRY_LIMIT: u32 = 3;
/// Forwarding history poll cadence.
const FORWARD_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Forwarding history page size.
const FORWARD_PAGE_LIMIT: u32 = 1000;

/// Everything a subscription task needs, cheap to clone per task.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub node: Arc<dyn LightningNode>,
    pub store: Arc<dyn LedgerStore>,
    pub node_id: i32,
    pub bus: EventBus,
    pub cancel: CancellationToken,
    pub peer_updates: CacheUpdateSender,
    pub point_updates: CacheUpdateSender,
    pub caches: Caches,
}

/// Resolve the next stream item, mapping exhaustion to a disconnect fault.
fn next_item<T>(name: &'static str, item: Option<Result<T, NodeError>>) -> Result<T, TaskError> {
    match item {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(TaskError::new(name, e)),
        None => Err(TaskError::new(name, NodeError::Disconnected)),
    }
}

/// Exponential backoff with a little jitter so reconnects do not align.
fn retry_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << attempt.min(5));
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    base + jitter
}

async fn notify_cache(sender: &CacheUpdateSender, update: CacheUpdate) {
    if sender.send(update).await.is_err() {
        warn!("cache monitor is gone, dropping update");
    }
}

// ---------------------------------------------------------------------------
// Streams that fail fast on disconnect
// ---------------------------------------------------------------------------

pub(crate) async fn transactions(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "transactions";
    let mut stream = ctx
        .node
        .subscribe_transactions()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                ctx.store
                    .upsert_transaction(TransactionUpsert {
                        node_id: ctx.node_id,
                        txid: update.txid.clone(),
                        amount_sat: update.amount_sat,
                        block_height: update.block_height,
                        total_fees_sat: update.total_fees_sat,
                        timestamp: update.timestamp,
                        dest_addresses: update.dest_addresses,
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;
                ctx.bus.publish(EventEnvelope::Transaction(TransactionEvent {
                    node_id: ctx.node_id,
                    txid: update.txid,
                    amount_sat: update.amount_sat,
                    block_height: update.block_height,
                }));
            }
        }
    }
}

pub(crate) async fn htlc_events(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "htlc-events";
    let mut stream = ctx
        .node
        .subscribe_htlc_events()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let event = next_item(NAME, item)?;
                ctx.store
                    .insert_htlc_event(HtlcEventRecord {
                        node_id: ctx.node_id,
                        time_ns: event.time_ns,
                        event_type: htlc_event_type(event.event_type),
                        incoming_channel_id: event.incoming_channel_id,
                        outgoing_channel_id: event.outgoing_channel_id,
                        incoming_htlc_id: event.incoming_htlc_id,
                        outgoing_htlc_id: event.outgoing_htlc_id,
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;
            }
        }
    }
}

fn htlc_event_type(kind: HtlcEventKind) -> HtlcEventType {
    match kind {
        HtlcEventKind::Forward => HtlcEventType::Forward,
        HtlcEventKind::ForwardFail => HtlcEventType::ForwardFail,
        HtlcEventKind::Settle => HtlcEventType::Settle,
        HtlcEventKind::LinkFail => HtlcEventType::LinkFail,
    }
}

pub(crate) async fn channel_events(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "channel-events";
    let mut stream = ctx
        .node
        .subscribe_channel_events()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                let channel_point = update.channel_point.clone();

                // Opened and closed transitions change the channel record
                // and the cache membership; active/inactive only log.
                match update.kind {
                    ChannelLifecycle::Opened => {
                        let (txid, output_index) = funding_outpoint(&update);
                        ctx.store
                            .upsert_channel(ChannelUpsert {
                                node_id: ctx.node_id,
                                channel_point: channel_point.clone(),
                                remote_pubkey: update.remote_pubkey.clone().unwrap_or_default(),
                                capacity_sat: update.capacity_sat.unwrap_or(0),
                                funding_txid: txid,
                                funding_output_index: output_index,
                                private: update.private,
                                status: ChannelStatus::Open,
                            })
                            .await
                            .map_err(|e| TaskError::new(NAME, e))?;
                        notify_cache(&ctx.point_updates, CacheUpdate::Add {
                            node_id: ctx.node_id,
                            value: channel_point.clone(),
                        })
                        .await;
                        if let Some(pubkey) = &update.remote_pubkey {
                            notify_cache(&ctx.peer_updates, CacheUpdate::Add {
                                node_id: ctx.node_id,
                                value: pubkey.clone(),
                            })
                            .await;
                        }
                    }
                    ChannelLifecycle::Closed | ChannelLifecycle::FullyResolved => {
                        let status = match update.close_type.as_deref() {
                            Some("local_force") | Some("remote_force") | Some("breach") => {
                                ChannelStatus::ForceClosed
                            }
                            _ => ChannelStatus::Closed,
                        };
                        let (txid, output_index) = funding_outpoint(&update);
                        ctx.store
                            .upsert_channel(ChannelUpsert {
                                node_id: ctx.node_id,
                                channel_point: channel_point.clone(),
                                remote_pubkey: update.remote_pubkey.clone().unwrap_or_default(),
                                capacity_sat: update.capacity_sat.unwrap_or(0),
                                funding_txid: txid,
                                funding_output_index: output_index,
                                private: update.private,
                                status,
                            })
                            .await
                            .map_err(|e| TaskError::new(NAME, e))?;
                        notify_cache(&ctx.point_updates, CacheUpdate::Remove {
                            node_id: ctx.node_id,
                            value: channel_point.clone(),
                        })
                        .await;
                    }
                    ChannelLifecycle::Active | ChannelLifecycle::Inactive => {}
                }

                ctx.store
                    .record_channel_event(ChannelEventRecord {
                        node_id: ctx.node_id,
                        channel_point: channel_point.clone(),
                        event_type: update.kind.into(),
                        remote_pubkey: update.remote_pubkey.clone(),
                        capacity_sat: update.capacity_sat,
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;

                ctx.bus.publish(EventEnvelope::ChannelState(ChannelStateEvent {
                    node_id: ctx.node_id,
                    channel_point,
                    remote_pubkey: update.remote_pubkey,
                    state: update.kind,
                    capacity_sat: update.capacity_sat,
                }));
            }
        }
    }
}

/// Funding outpoint from the update, falling back to parsing the channel
/// point (`<txid>:<index>`).
fn funding_outpoint(update: &crate::node::ChannelEventUpdate) -> (String, i32) {
    if let Some(txid) = &update.funding_txid {
        return (txid.clone(), update.funding_output_index.unwrap_or(0));
    }
    match update.channel_point.rsplit_once(':') {
        Some((txid, index)) => (txid.to_string(), index.parse().unwrap_or(0)),
        None => (update.channel_point.clone(), 0),
    }
}

pub(crate) async fn invoices(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "invoices";
    let mut stream = ctx
        .node
        .subscribe_invoices()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                ctx.store
                    .upsert_invoice(InvoiceUpsert {
                        node_id: ctx.node_id,
                        payment_hash: update.payment_hash.clone(),
                        payment_request: update.payment_request,
                        value_msat: update.value_msat,
                        state: update.state.into(),
                        amt_paid_msat: update.amt_paid_msat,
                        settled_at: update.settled_at,
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;
                ctx.bus.publish(EventEnvelope::Invoice(InvoiceEvent {
                    node_id: ctx.node_id,
                    payment_hash: update.payment_hash,
                    state: update.state,
                    value_msat: update.value_msat,
                    amt_paid_msat: update.amt_paid_msat,
                }));
            }
        }
    }
}

pub(crate) async fn payments(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "payments";
    let mut stream = ctx
        .node
        .subscribe_payments()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                ctx.store
                    .upsert_payment(PaymentUpsert {
                        node_id: ctx.node_id,
                        payment_hash: update.payment_hash,
                        status: update.status.into(),
                        value_msat: update.value_msat,
                        fee_msat: update.fee_msat,
                        preimage: update.preimage,
                        failure_reason: update.failure_reason,
                        created_at_unix: update.created_at.unwrap_or(0),
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;
            }
        }
    }
}

pub(crate) async fn payment_updates(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "payment-updates";
    let mut stream = ctx
        .node
        .track_payments()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                ctx.store
                    .update_payment_state(PaymentStateUpdate {
                        node_id: ctx.node_id,
                        payment_hash: update.payment_hash,
                        status: update.status.into(),
                        fee_msat: update.fee_msat,
                        preimage: update.preimage,
                        failure_reason: update.failure_reason,
                    })
                    .await
                    .map_err(|e| TaskError::new(NAME, e))?;
            }
        }
    }
}

pub(crate) async fn peer_events(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "peer-events";
    let mut stream = ctx
        .node
        .subscribe_peer_events()
        .await
        .map_err(|e| TaskError::new(NAME, e))?;
    info!(task = NAME, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                let update = next_item(NAME, item)?;
                ctx.bus.publish(EventEnvelope::Peer(PeerEvent {
                    node_id: ctx.node_id,
                    pubkey: update.pubkey,
                    kind: update.kind,
                }));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Streams with bounded internal retry
// ---------------------------------------------------------------------------

pub(crate) async fn channel_graph(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "channel-graph";
    let mut attempts = 0u32;
    loop {
        match run_graph_stream(NAME, &ctx).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempts += 1;
                if attempts > STREAM_RETRY_LIMIT {
                    return Err(err);
                }
                let delay = retry_delay(attempts);
                warn!(task = NAME, error = %err, attempt = attempts, ?delay,
                    "graph stream failed, retrying");
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_graph_stream(name: &'static str, ctx: &TaskContext) -> Result<(), TaskError> {
    let mut stream = ctx
        .node
        .subscribe_channel_graph()
        .await
        .map_err(|e| TaskError::new(name, e))?;
    info!(task = name, "subscription started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = name, "cancelled");
                return Ok(());
            }

            item = stream.next() => {
                match next_item(name, item)? {
                    // Gossip covers the whole network; keep only updates
                    // about our peers and our channel points.
                    GraphUpdate::Node(node) => {
                        if !ctx.caches.peer_keys.contains(ctx.node_id, &node.pubkey) {
                            debug!(pubkey = %node.pubkey, "ignoring unrelated node update");
                            continue;
                        }
                        ctx.store
                            .upsert_node(crate::entities::node_record::NodeUpsert {
                                pubkey: node.pubkey,
                                alias: node.alias,
                                color: node.color,
                                last_update: node.last_update,
                            })
                            .await
                            .map_err(|e| TaskError::new(name, e))?;
                    }
                    GraphUpdate::Channel(policy) => {
                        if !ctx
                            .caches
                            .channel_points
                            .contains(ctx.node_id, &policy.channel_point)
                        {
                            debug!(channel_point = %policy.channel_point,
                                "ignoring unrelated channel update");
                            continue;
                        }
                        ctx.store
                            .upsert_routing_policy(RoutingPolicyUpsert {
                                channel_point: policy.channel_point,
                                advertising_pubkey: policy.advertising_pubkey,
                                fee_base_msat: policy.fee_base_msat,
                                fee_rate_ppm: policy.fee_rate_ppm,
                                min_htlc_msat: policy.min_htlc_msat,
                                max_htlc_msat: policy.max_htlc_msat,
                                time_lock_delta: policy.time_lock_delta,
                                disabled: policy.disabled,
                                last_update: policy.last_update,
                            })
                            .await
                            .map_err(|e| TaskError::new(name, e))?;
                    }
                }
            }
        }
    }
}

pub(crate) async fn forwards(ctx: TaskContext) -> Result<(), TaskError> {
    const NAME: &str = "forwards";
    info!(task = NAME, "poller started");
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                info!(task = NAME, "cancelled");
                return Ok(());
            }

            _ = tokio::time::sleep(FORWARD_POLL_INTERVAL) => {
                match poll_forwards_once(NAME, &ctx).await {
                    Ok(inserted) => {
                        failures = 0;
                        if inserted > 0 {
                            debug!(task = NAME, inserted, "stored new forwards");
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        if failures > STREAM_RETRY_LIMIT {
                            return Err(err);
                        }
                        warn!(task = NAME, error = %err, consecutive = failures,
                            "forward poll failed");
                    }
                }
            }
        }
    }
}

/// Fetch forward pages after the newest stored offset until a short page.
async fn poll_forwards_once(name: &'static str, ctx: &TaskContext) -> Result<u64, TaskError> {
    let mut total = 0u64;
    loop {
        let since = ctx
            .store
            .latest_forward_time_ns(ctx.node_id)
            .await
            .map_err(|e| TaskError::new(name, e))?
            .unwrap_or(0);
        let page = ctx
            .node
            .forwarding_history(since, FORWARD_PAGE_LIMIT)
            .await
            .map_err(|e| TaskError::new(name, e))?;
        let full_page = page.len() as u32 == FORWARD_PAGE_LIMIT;

        let forwards: Vec<ForwardInsert> = page
            .into_iter()
            .map(|f| ForwardInsert {
                time_ns: f.time_ns,
                incoming_channel_id: f.incoming_channel_id,
                outgoing_channel_id: f.outgoing_channel_id,
                amt_in_msat: f.amt_in_msat,
                amt_out_msat: f.amt_out_msat,
                fee_msat: f.fee_msat,
            })
            .collect();
        if forwards.is_empty() {
            break;
        }
        total += ctx
            .store
            .insert_forwards(ctx.node_id, forwards)
            .await
            .map_err(|e| TaskError::new(name, e))?;
        if !full_page {
            break;
        }
    }
    Ok(total)
}
