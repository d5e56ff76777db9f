use crate::db::DatabaseProcessor;
use kanau::processor::Processor;
use sqlx::types::Json;

/// Data for upserting an on-chain wallet transaction.
#[derive(Debug, Clone)]
pub struct TransactionUpsert {
    pub node_id: i32,
    pub txid: String,
    pub amount_sat: i64,
    pub block_height: Option<i32>,
    pub total_fees_sat: Option<i64>,
    pub timestamp: i64,
    pub dest_addresses: Vec<String>,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on (node_id, txid).
///
/// The same transaction is streamed again when it confirms, refreshing
/// block height and fees.
pub struct UpsertTransaction {
    pub transaction: TransactionUpsert,
}

impl Processor<UpsertTransaction> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertTransaction")]
    async fn process(&self, cmd: UpsertTransaction) -> Result<(), sqlx::Error> {
        let t = cmd.transaction;
        sqlx::query(
            r#"
            INSERT INTO transactions
                (node_id, txid, amount_sat, block_height, total_fees_sat,
                 timestamp_unix, dest_addresses)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (node_id, txid) DO UPDATE SET
                block_height = EXCLUDED.block_height,
                total_fees_sat = EXCLUDED.total_fees_sat
            "#,
        )
        .bind(t.node_id)
        .bind(&t.txid)
        .bind(t.amount_sat)
        .bind(t.block_height)
        .bind(t.total_fees_sat)
        .bind(t.timestamp)
        .bind(Json(&t.dest_addresses))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
