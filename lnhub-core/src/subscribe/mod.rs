//! The subscription supervisor.
//!
//! [`start`] owns the whole ingestion lifecycle: it launches the two cache
//! monitors, performs the initial cache loads and the snapshot import, then
//! runs the fixed set of long-lived subscription tasks until the caller
//! cancels the scope or one task fails. One task failing is treated as
//! systemic: the shared scope is cancelled, every sibling drains, and the
//! first failure becomes the aggregate result. Partial-failure isolation is
//! deliberately not attempted because downstream consumers assume all
//! streams are live.

mod tasks;

use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{Caches, run_monitor};
use crate::db::{LedgerStore, StoreError};
use crate::events::EventBus;
use crate::events::channels::cache_update_channel;
use crate::import::{ImportError, run_snapshot_import};
use crate::node::{LightningNode, NodeError};
use tasks::TaskContext;

/// What brought a subscription task down.
#[derive(Debug, Error)]
pub enum StreamFault {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("task panicked: {0}")]
    Panic(String),
}

/// A named subscription task failure.
#[derive(Debug, Error)]
#[error("{name} task failed: {source}")]
pub struct TaskError {
    pub name: &'static str,
    #[source]
    pub source: StreamFault,
}

impl TaskError {
    pub(crate) fn new(name: &'static str, fault: impl Into<StreamFault>) -> Self {
        Self {
            name,
            source: fault.into(),
        }
    }
}

/// Errors returned by [`start`].
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Initial cache load failed; nothing was started.
    #[error("cache initialization failed: {0}")]
    CacheInit(#[source] StoreError),

    /// Snapshot import failed; no subscription was started.
    #[error("snapshot import failed: {0}")]
    Import(#[from] ImportError),

    /// A subscription task failed after startup (first failure wins).
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// The cache monitors' scope plus their join handles.
struct MonitorHandles {
    cancel: CancellationToken,
    peer: JoinHandle<()>,
    point: JoinHandle<()>,
}

impl MonitorHandles {
    /// Tear the monitors down and wait until both loops have exited.
    async fn release(self) {
        self.cancel.cancel();
        let _ = self.peer.await;
        let _ = self.point.await;
    }
}

async fn init_caches(
    store: &dyn LedgerStore,
    node_id: i32,
    caches: &Caches,
) -> Result<(), StoreError> {
    let peer_keys = store.list_channel_peer_keys(node_id).await?;
    caches.peer_keys.init(node_id, peer_keys);
    let channel_points = store.list_open_channel_points(node_id).await?;
    caches.channel_points.init(node_id, channel_points);
    Ok(())
}

/// Run the ingestion subsystem until cancellation or first failure.
///
/// Returns only after every subscription task has terminated; the cache
/// monitors are released before returning regardless of outcome. The
/// aggregate result is the first task failure, or `Ok(())` when all tasks
/// exited due to cancellation.
pub async fn start(
    cancel: CancellationToken,
    node: Arc<dyn LightningNode>,
    store: Arc<dyn LedgerStore>,
    node_id: i32,
    bus: EventBus,
    caches: Caches,
) -> Result<(), SubscribeError> {
    // The monitors get their own scope: they must outlive the subscription
    // tasks (which feed them updates) and are only released at the end.
    let monitor_cancel = CancellationToken::new();
    let (peer_tx, peer_rx) = cache_update_channel();
    let (point_tx, point_rx) = cache_update_channel();
    let monitors = MonitorHandles {
        peer: tokio::spawn(run_monitor(
            caches.peer_keys.clone(),
            monitor_cancel.clone(),
            peer_rx,
        )),
        point: tokio::spawn(run_monitor(
            caches.channel_points.clone(),
            monitor_cancel.clone(),
            point_rx,
        )),
        cancel: monitor_cancel,
    };

    if let Err(e) = init_caches(store.as_ref(), node_id, &caches).await {
        monitors.release().await;
        return Err(SubscribeError::CacheInit(e));
    }

    if let Err(e) = run_snapshot_import(node.as_ref(), store.as_ref(), node_id).await {
        monitors.release().await;
        return Err(e.into());
    }

    let task_cancel = cancel.child_token();
    let ctx = TaskContext {
        node,
        store,
        node_id,
        bus,
        cancel: task_cancel.clone(),
        peer_updates: peer_tx,
        point_updates: point_tx,
        caches,
    };

    let mut set: JoinSet<Result<(), TaskError>> = JoinSet::new();
    set.spawn(tasks::transactions(ctx.clone()));
    set.spawn(tasks::htlc_events(ctx.clone()));
    set.spawn(tasks::channel_events(ctx.clone()));
    set.spawn(tasks::channel_graph(ctx.clone()));
    set.spawn(tasks::forwards(ctx.clone()));
    set.spawn(tasks::invoices(ctx.clone()));
    set.spawn(tasks::payments(ctx.clone()));
    set.spawn(tasks::payment_updates(ctx.clone()));
    set.spawn(tasks::peer_events(ctx));
    info!(node_id, "all subscription tasks started");

    // First failure wins: cancel the shared scope so every sibling observes
    // it, keep draining until the set is empty.
    let mut first_failure: Option<TaskError> = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|join_error| {
            Err(TaskError {
                name: "subscription",
                source: StreamFault::Panic(join_error.to_string()),
            })
        });
        if let Err(task_error) = result {
            error!(error = %task_error, "subscription task failed");
            if first_failure.is_none() {
                task_cancel.cancel();
                first_failure = Some(task_error);
            }
        }
    }

    // Nothing writes to the caches anymore.
    monitors.release().await;

    match first_failure {
        Some(task_error) => Err(task_error.into()),
        None => {
            info!(node_id, "subscription supervisor drained cleanly");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lnhub_sdk::objects::{
        CloseChannelRequest, NewAddressRequest, NewPaymentRequest, OpenChannelRequest,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::entities::channel::{ChannelEventRecord, ChannelUpsert};
    use crate::entities::forward::ForwardInsert;
    use crate::entities::htlc::HtlcEventRecord;
    use crate::entities::invoice::InvoiceUpsert;
    use crate::entities::node_record::NodeUpsert;
    use crate::entities::payment::{PaymentStateUpdate, PaymentUpsert};
    use crate::entities::routing_policy::RoutingPolicyUpsert;
    use crate::entities::transaction::TransactionUpsert;
    use crate::node::{
        ChannelCloseUpdate, ChannelEventUpdate, ChannelOpenUpdate, ChannelSnapshot,
        ClosedChannelSnapshot, EventStream, ForwardEntry, GraphUpdate, HtlcEvent, InvoiceUpdate,
        NodeInfo, PaymentUpdate, PeerEventUpdate, RemoteNodeInfo, RoutingPolicySnapshot,
        TransactionUpdate,
    };

    fn pending_stream<T: Send + 'static>() -> EventStream<T> {
        Box::pin(futures_util::stream::pending())
    }

    fn failing_stream<T: Send + 'static>(message: &str) -> EventStream<T> {
        let message = message.to_string();
        Box::pin(futures_util::stream::once(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(NodeError::Api { message })
        }))
    }

    #[derive(Default)]
    struct FakeNode {
        fail_invoices: bool,
        subscribe_calls: AtomicUsize,
    }

    impl FakeNode {
        fn count(&self) -> usize {
            self.subscribe_calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LightningNode for FakeNode {
        async fn get_info(&self) -> Result<NodeInfo, NodeError> {
            Ok(NodeInfo {
                identity_pubkey: "03self".into(),
                alias: Some("fake".into()),
                block_height: 1,
            })
        }

        async fn list_channels(&self) -> Result<Vec<ChannelSnapshot>, NodeError> {
            Ok(vec![ChannelSnapshot {
                channel_point: "aa:0".into(),
                remote_pubkey: "02peer".into(),
                capacity_sat: 100_000,
                funding_txid: "aa".into(),
                funding_output_index: 0,
                private: false,
                active: true,
            }])
        }

        async fn closed_channels(&self) -> Result<Vec<ClosedChannelSnapshot>, NodeError> {
            Ok(Vec::new())
        }

        async fn get_node_info(&self, pubkey: &str) -> Result<RemoteNodeInfo, NodeError> {
            Ok(RemoteNodeInfo {
                pubkey: pubkey.to_string(),
                alias: None,
                color: None,
                last_update: None,
            })
        }

        async fn routing_policies(&self) -> Result<Vec<RoutingPolicySnapshot>, NodeError> {
            Ok(Vec::new())
        }

        async fn forwarding_history(
            &self,
            _since_time_ns: i64,
            _limit: u32,
        ) -> Result<Vec<ForwardEntry>, NodeError> {
            Ok(Vec::new())
        }

        async fn subscribe_transactions(
            &self,
        ) -> Result<EventStream<TransactionUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn subscribe_htlc_events(&self) -> Result<EventStream<HtlcEvent>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn subscribe_channel_events(
            &self,
        ) -> Result<EventStream<ChannelEventUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn subscribe_channel_graph(&self) -> Result<EventStream<GraphUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn subscribe_invoices(&self) -> Result<EventStream<InvoiceUpdate>, NodeError> {
            self.tick();
            if self.fail_invoices {
                Ok(failing_stream("invoice stream broke"))
            } else {
                Ok(pending_stream())
            }
        }

        async fn subscribe_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn track_payments(&self) -> Result<EventStream<PaymentUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn subscribe_peer_events(&self) -> Result<EventStream<PeerEventUpdate>, NodeError> {
            self.tick();
            Ok(pending_stream())
        }

        async fn send_payment(
            &self,
            _request: &NewPaymentRequest,
        ) -> Result<EventStream<PaymentUpdate>, NodeError> {
            Ok(pending_stream())
        }

        async fn new_address(&self, _request: &NewAddressRequest) -> Result<String, NodeError> {
            Ok("bc1qfake".into())
        }

        async fn open_channel(
            &self,
            _request: &OpenChannelRequest,
        ) -> Result<EventStream<ChannelOpenUpdate>, NodeError> {
            Ok(pending_stream())
        }

        async fn close_channel(
            &self,
            _request: &CloseChannelRequest,
        ) -> Result<EventStream<ChannelCloseUpdate>, NodeError> {
            Ok(pending_stream())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        fail_channel_upserts: bool,
        peer_keys: Vec<String>,
        channel_points: Vec<String>,
        channel_upserts: AtomicUsize,
    }

    #[async_trait]
    impl LedgerStore for MemoryStore {
        async fn upsert_channel(&self, _channel: ChannelUpsert) -> Result<(), StoreError> {
            if self.fail_channel_upserts {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.channel_upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn record_channel_event(&self, _event: ChannelEventRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_node(&self, _node: NodeUpsert) -> Result<(), StoreError> {
            Ok(())
        }

        async fn unknown_node_pubkeys(
            &self,
            _pubkeys: Vec<String>,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn upsert_routing_policy(
            &self,
            _policy: RoutingPolicyUpsert,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_invoice(&self, _invoice: InvoiceUpsert) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_payment(&self, _payment: PaymentUpsert) -> Result<(), StoreError> {
            Ok(())
        }

        async fn update_payment_state(
            &self,
            _update: PaymentStateUpdate,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert_forwards(
            &self,
            _node_id: i32,
            forwards: Vec<ForwardInsert>,
        ) -> Result<u64, StoreError> {
            Ok(forwards.len() as u64)
        }

        async fn latest_forward_time_ns(&self, _node_id: i32) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }

        async fn upsert_transaction(
            &self,
            _transaction: TransactionUpsert,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert_htlc_event(&self, _event: HtlcEventRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_channel_peer_keys(&self, _node_id: i32) -> Result<Vec<String>, StoreError> {
            Ok(self.peer_keys.clone())
        }

        async fn list_open_channel_points(&self, _node_id: i32) -> Result<Vec<String>, StoreError> {
            Ok(self.channel_points.clone())
        }
    }

    #[tokio::test]
    async fn first_failure_cancels_siblings_and_propagates() {
        let node = Arc::new(FakeNode {
            fail_invoices: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            start(
                cancel,
                node.clone(),
                store,
                1,
                EventBus::default(),
                Caches::new(),
            ),
        )
        .await
        .expect("siblings must observe cancellation within the timeout");

        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("invoices"),
            "aggregate error should name the failed task: {err}"
        );
        // All nine streams were opened before the failure took everything down.
        assert_eq!(node.count(), 8);
    }

    #[tokio::test]
    async fn external_cancellation_drains_cleanly() {
        let node = Arc::new(FakeNode::default());
        let store = Arc::new(MemoryStore {
            peer_keys: vec!["02aa".into()],
            channel_points: vec!["cp:0".into()],
            ..Default::default()
        });
        let caches = Caches::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(start(
            cancel.clone(),
            node,
            store,
            1,
            EventBus::default(),
            caches.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Initial cache load happened before any stream went live.
        assert!(caches.peer_keys.contains(1, "02aa"));
        assert!(caches.channel_points.contains(1, "cp:0"));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor must drain after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn import_failure_aborts_before_any_subscription() {
        let node = Arc::new(FakeNode::default());
        let store = Arc::new(MemoryStore {
            fail_channel_upserts: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let result = start(
            cancel,
            node.clone(),
            store,
            1,
            EventBus::default(),
            Caches::new(),
        )
        .await;

        assert!(matches!(result, Err(SubscribeError::Import(_))));
        assert_eq!(node.count(), 0, "no stream may start when the import fails");
    }
}
