use crate::db::DatabaseProcessor;
use crate::entities::HtlcEventType;
use kanau::processor::Processor;

/// One HTLC resolution event from the router stream.
#[derive(Debug, Clone)]
pub struct HtlcEventRecord {
    pub node_id: i32,
    pub time_ns: i64,
    pub event_type: HtlcEventType,
    pub incoming_channel_id: Option<i64>,
    pub outgoing_channel_id: Option<i64>,
    pub incoming_htlc_id: Option<i64>,
    pub outgoing_htlc_id: Option<i64>,
}

#[derive(Debug, Clone)]
/// Append one HTLC event. The log is insert-only.
pub struct InsertHtlcEvent {
    pub event: HtlcEventRecord,
}

impl Processor<InsertHtlcEvent> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertHtlcEvent")]
    async fn process(&self, cmd: InsertHtlcEvent) -> Result<(), sqlx::Error> {
        let e = cmd.event;
        sqlx::query(
            r#"
            INSERT INTO htlc_events
                (node_id, time_ns, event_type, incoming_channel_id,
                 outgoing_channel_id, incoming_htlc_id, outgoing_htlc_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(e.node_id)
        .bind(e.time_ns)
        .bind(e.event_type)
        .bind(e.incoming_channel_id)
        .bind(e.outgoing_channel_id)
        .bind(e.incoming_htlc_id)
        .bind(e.outgoing_htlc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
