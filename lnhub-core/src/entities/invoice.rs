use crate::db::DatabaseProcessor;
use crate::entities::InvoiceState;
use kanau::processor::Processor;

/// Data for upserting an invoice record.
#[derive(Debug, Clone)]
pub struct InvoiceUpsert {
    pub node_id: i32,
    pub payment_hash: String,
    pub payment_request: Option<String>,
    pub value_msat: i64,
    pub state: InvoiceState,
    pub amt_paid_msat: Option<i64>,
    pub settled_at: Option<i64>,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on (node_id, payment_hash).
///
/// The invoice stream replays the current state on reconnect, so repeated
/// upserts of the same state are expected and harmless.
pub struct UpsertInvoice {
    pub invoice: InvoiceUpsert,
}

impl Processor<UpsertInvoice> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertInvoice")]
    async fn process(&self, cmd: UpsertInvoice) -> Result<(), sqlx::Error> {
        let i = cmd.invoice;
        sqlx::query(
            r#"
            INSERT INTO invoices
                (node_id, payment_hash, payment_request, value_msat,
                 state, amt_paid_msat, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (node_id, payment_hash) DO UPDATE SET
                state = EXCLUDED.state,
                amt_paid_msat = EXCLUDED.amt_paid_msat,
                settled_at = EXCLUDED.settled_at
            "#,
        )
        .bind(i.node_id)
        .bind(&i.payment_hash)
        .bind(&i.payment_request)
        .bind(i.value_msat)
        .bind(i.state)
        .bind(i.amt_paid_msat)
        .bind(i.settled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
