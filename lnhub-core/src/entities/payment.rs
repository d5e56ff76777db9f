use crate::db::DatabaseProcessor;
use crate::entities::PaymentState;
use kanau::processor::Processor;

/// Data for upserting a payment record.
#[derive(Debug, Clone)]
pub struct PaymentUpsert {
    pub node_id: i32,
    pub payment_hash: String,
    pub status: PaymentState,
    pub value_msat: i64,
    pub fee_msat: Option<i64>,
    pub preimage: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at_unix: i64,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on (node_id, payment_hash).
pub struct UpsertPayment {
    pub payment: PaymentUpsert,
}

impl Processor<UpsertPayment> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertPayment")]
    async fn process(&self, cmd: UpsertPayment) -> Result<(), sqlx::Error> {
        let p = cmd.payment;
        sqlx::query(
            r#"
            INSERT INTO payments
                (node_id, payment_hash, status, value_msat, fee_msat,
                 preimage, failure_reason, created_at_unix)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (node_id, payment_hash) DO UPDATE SET
                status = EXCLUDED.status,
                fee_msat = EXCLUDED.fee_msat,
                preimage = EXCLUDED.preimage,
                failure_reason = EXCLUDED.failure_reason
            "#,
        )
        .bind(p.node_id)
        .bind(&p.payment_hash)
        .bind(p.status)
        .bind(p.value_msat)
        .bind(p.fee_msat)
        .bind(&p.preimage)
        .bind(&p.failure_reason)
        .bind(p.created_at_unix)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// State transition for a payment that is already recorded.
#[derive(Debug, Clone)]
pub struct PaymentStateUpdate {
    pub node_id: i32,
    pub payment_hash: String,
    pub status: PaymentState,
    pub fee_msat: Option<i64>,
    pub preimage: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
/// Apply an in-flight payment's state transition.
///
/// Updating an unknown payment hash affects zero rows and is not an error;
/// the payments stream will upsert the full record eventually.
pub struct UpdatePaymentState {
    pub update: PaymentStateUpdate,
}

impl Processor<UpdatePaymentState> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdatePaymentState")]
    async fn process(&self, cmd: UpdatePaymentState) -> Result<u64, sqlx::Error> {
        let u = cmd.update;
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $3,
                fee_msat = COALESCE($4, fee_msat),
                preimage = COALESCE($5, preimage),
                failure_reason = COALESCE($6, failure_reason)
            WHERE node_id = $1 AND payment_hash = $2
            "#,
        )
        .bind(u.node_id)
        .bind(&u.payment_hash)
        .bind(u.status)
        .bind(u.fee_msat)
        .bind(&u.preimage)
        .bind(&u.failure_reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
