//! Database access and the persistence collaborator boundary.
//!
//! Entity modules define kanau `Processor` commands/queries against
//! [`DatabaseProcessor`]; the ingestion side only ever talks to the narrower
//! [`LedgerStore`] trait so it can be exercised against an in-memory store
//! in tests.

use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use thiserror::Error;

use crate::entities::channel::{
    ChannelEventRecord, ChannelUpsert, ListChannelPeerKeys, ListOpenChannelPoints,
    RecordChannelEvent, UpsertChannel,
};
use crate::entities::forward::{ForwardInsert, GetLatestForwardTimeNs, InsertManyForwards};
use crate::entities::htlc::{HtlcEventRecord, InsertHtlcEvent};
use crate::entities::invoice::{InvoiceUpsert, UpsertInvoice};
use crate::entities::node_record::{FilterUnknownNodePubkeys, NodeUpsert, UpsertNode};
use crate::entities::payment::{
    PaymentStateUpdate, PaymentUpsert, UpdatePaymentState, UpsertPayment,
};
use crate::entities::routing_policy::{RoutingPolicyUpsert, UpsertRoutingPolicy};
use crate::entities::transaction::{TransactionUpsert, UpsertTransaction};

/// Errors surfaced by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Host for the kanau processors that run directly against the pool.
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

/// Persistence boundary consumed by the importer and the subscription tasks.
///
/// Every write is an idempotent upsert (or an append to an insert-only log)
/// and is safe to call concurrently from different tasks for different
/// record kinds.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn upsert_channel(&self, channel: ChannelUpsert) -> Result<(), StoreError>;
    async fn record_channel_event(&self, event: ChannelEventRecord) -> Result<(), StoreError>;
    async fn upsert_node(&self, node: NodeUpsert) -> Result<(), StoreError>;
    /// Of `pubkeys`, return the ones without a stored node record.
    async fn unknown_node_pubkeys(&self, pubkeys: Vec<String>) -> Result<Vec<String>, StoreError>;
    async fn upsert_routing_policy(&self, policy: RoutingPolicyUpsert) -> Result<(), StoreError>;
    async fn upsert_invoice(&self, invoice: InvoiceUpsert) -> Result<(), StoreError>;
    async fn upsert_payment(&self, payment: PaymentUpsert) -> Result<(), StoreError>;
    async fn update_payment_state(&self, update: PaymentStateUpdate) -> Result<(), StoreError>;
    /// Returns the number of rows actually inserted (duplicates excluded).
    async fn insert_forwards(
        &self,
        node_id: i32,
        forwards: Vec<ForwardInsert>,
    ) -> Result<u64, StoreError>;
    async fn latest_forward_time_ns(&self, node_id: i32) -> Result<Option<i64>, StoreError>;
    async fn upsert_transaction(&self, transaction: TransactionUpsert) -> Result<(), StoreError>;
    async fn insert_htlc_event(&self, event: HtlcEventRecord) -> Result<(), StoreError>;
    /// Distinct pubkeys of peers with an open channel, for the peer key cache.
    async fn list_channel_peer_keys(&self, node_id: i32) -> Result<Vec<String>, StoreError>;
    /// Channel points of open channels, for the channel point cache.
    async fn list_open_channel_points(&self, node_id: i32) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl LedgerStore for DatabaseProcessor {
    async fn upsert_channel(&self, channel: ChannelUpsert) -> Result<(), StoreError> {
        self.process(UpsertChannel { channel }).await?;
        Ok(())
    }

    async fn record_channel_event(&self, event: ChannelEventRecord) -> Result<(), StoreError> {
        self.process(RecordChannelEvent { event }).await?;
        Ok(())
    }

    async fn upsert_node(&self, node: NodeUpsert) -> Result<(), StoreError> {
        self.process(UpsertNode { node }).await?;
        Ok(())
    }

    async fn unknown_node_pubkeys(&self, pubkeys: Vec<String>) -> Result<Vec<String>, StoreError> {
        Ok(self.process(FilterUnknownNodePubkeys { pubkeys }).await?)
    }

    async fn upsert_routing_policy(&self, policy: RoutingPolicyUpsert) -> Result<(), StoreError> {
        self.process(UpsertRoutingPolicy { policy }).await?;
        Ok(())
    }

    async fn upsert_invoice(&self, invoice: InvoiceUpsert) -> Result<(), StoreError> {
        self.process(UpsertInvoice { invoice }).await?;
        Ok(())
    }

    async fn upsert_payment(&self, payment: PaymentUpsert) -> Result<(), StoreError> {
        self.process(UpsertPayment { payment }).await?;
        Ok(())
    }

    async fn update_payment_state(&self, update: PaymentStateUpdate) -> Result<(), StoreError> {
        self.process(UpdatePaymentState { update }).await?;
        Ok(())
    }

    async fn insert_forwards(
        &self,
        node_id: i32,
        forwards: Vec<ForwardInsert>,
    ) -> Result<u64, StoreError> {
        Ok(self.process(InsertManyForwards { node_id, forwards }).await?)
    }

    async fn latest_forward_time_ns(&self, node_id: i32) -> Result<Option<i64>, StoreError> {
        Ok(self.process(GetLatestForwardTimeNs { node_id }).await?)
    }

    async fn upsert_transaction(&self, transaction: TransactionUpsert) -> Result<(), StoreError> {
        self.process(UpsertTransaction { transaction }).await?;
        Ok(())
    }

    async fn insert_htlc_event(&self, event: HtlcEventRecord) -> Result<(), StoreError> {
        self.process(InsertHtlcEvent { event }).await?;
        Ok(())
    }

    async fn list_channel_peer_keys(&self, node_id: i32) -> Result<Vec<String>, StoreError> {
        Ok(self.process(ListChannelPeerKeys { node_id }).await?)
    }

    async fn list_open_channel_points(&self, node_id: i32) -> Result<Vec<String>, StoreError> {
        Ok(self.process(ListOpenChannelPoints { node_id }).await?)
    }
}
