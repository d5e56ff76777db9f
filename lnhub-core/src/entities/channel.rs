use crate::db::DatabaseProcessor;
use crate::entities::{ChannelEventType, ChannelStatus};
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Channel {
    pub id: i64,
    pub node_id: i32,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
    pub funding_txid: String,
    pub funding_output_index: i32,
    pub private: bool,
    pub status: ChannelStatus,
    pub created_at: time::PrimitiveDateTime,
}

/// Data for upserting a channel record.
#[derive(Debug, Clone)]
pub struct ChannelUpsert {
    pub node_id: i32,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
    pub funding_txid: String,
    pub funding_output_index: i32,
    pub private: bool,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on the channel point.
///
/// Re-importing a known channel refreshes its mutable columns without
/// creating a duplicate row.
pub struct UpsertChannel {
    pub channel: ChannelUpsert,
}

impl Processor<UpsertChannel> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertChannel")]
    async fn process(&self, cmd: UpsertChannel) -> Result<(), sqlx::Error> {
        let c = cmd.channel;
        sqlx::query(
            r#"
            INSERT INTO channels
                (node_id, channel_point, remote_pubkey, capacity_sat,
                 funding_txid, funding_output_index, private, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (channel_point) DO UPDATE SET
                remote_pubkey = EXCLUDED.remote_pubkey,
                capacity_sat = EXCLUDED.capacity_sat,
                private = EXCLUDED.private,
                status = EXCLUDED.status
            "#,
        )
        .bind(c.node_id)
        .bind(&c.channel_point)
        .bind(&c.remote_pubkey)
        .bind(c.capacity_sat)
        .bind(&c.funding_txid)
        .bind(c.funding_output_index)
        .bind(c.private)
        .bind(c.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Data for appending to the channel event log.
#[derive(Debug, Clone)]
pub struct ChannelEventRecord {
    pub node_id: i32,
    pub channel_point: String,
    pub event_type: ChannelEventType,
    pub remote_pubkey: Option<String>,
    pub capacity_sat: Option<i64>,
}

#[derive(Debug, Clone)]
/// Append one channel lifecycle event. The log is insert-only.
pub struct RecordChannelEvent {
    pub event: ChannelEventRecord,
}

impl Processor<RecordChannelEvent> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordChannelEvent")]
    async fn process(&self, cmd: RecordChannelEvent) -> Result<(), sqlx::Error> {
        let e = cmd.event;
        sqlx::query(
            r#"
            INSERT INTO channel_events
                (node_id, channel_point, event_type, remote_pubkey, capacity_sat)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(e.node_id)
        .bind(&e.channel_point)
        .bind(e.event_type)
        .bind(&e.remote_pubkey)
        .bind(e.capacity_sat)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Channel points of all channels currently open for a node.
///
/// Used to seed the channel point cache before streaming starts.
pub struct ListOpenChannelPoints {
    pub node_id: i32,
}

impl Processor<ListOpenChannelPoints> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOpenChannelPoints")]
    async fn process(&self, query: ListOpenChannelPoints) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT channel_point
            FROM channels
            WHERE node_id = $1 AND status = 'open'
            "#,
        )
        .bind(query.node_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Distinct public keys of peers we share an open channel with.
///
/// Used to seed the peer key cache before streaming starts.
pub struct ListChannelPeerKeys {
    pub node_id: i32,
}

impl Processor<ListChannelPeerKeys> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListChannelPeerKeys")]
    async fn process(&self, query: ListChannelPeerKeys) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT DISTINCT remote_pubkey
            FROM channels
            WHERE node_id = $1 AND status = 'open'
            "#,
        )
        .bind(query.node_id)
        .fetch_all(&self.pool)
        .await
    }
}
