use crate::db::DatabaseProcessor;
use kanau::processor::Processor;

/// Data for upserting one direction of a channel's routing policy.
///
/// A channel has up to two policies, one per advertising node.
#[derive(Debug, Clone)]
pub struct RoutingPolicyUpsert {
    pub channel_point: String,
    pub advertising_pubkey: String,
    pub fee_base_msat: i64,
    pub fee_rate_ppm: i64,
    pub min_htlc_msat: i64,
    pub max_htlc_msat: i64,
    pub time_lock_delta: i32,
    pub disabled: bool,
    pub last_update: i64,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on (channel_point, advertising_pubkey).
///
/// Older updates never overwrite newer ones.
pub struct UpsertRoutingPolicy {
    pub policy: RoutingPolicyUpsert,
}

impl Processor<UpsertRoutingPolicy> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertRoutingPolicy")]
    async fn process(&self, cmd: UpsertRoutingPolicy) -> Result<(), sqlx::Error> {
        let p = cmd.policy;
        sqlx::query(
            r#"
            INSERT INTO routing_policies
                (channel_point, advertising_pubkey, fee_base_msat, fee_rate_ppm,
                 min_htlc_msat, max_htlc_msat, time_lock_delta, disabled, last_update)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (channel_point, advertising_pubkey) DO UPDATE SET
                fee_base_msat = EXCLUDED.fee_base_msat,
                fee_rate_ppm = EXCLUDED.fee_rate_ppm,
                min_htlc_msat = EXCLUDED.min_htlc_msat,
                max_htlc_msat = EXCLUDED.max_htlc_msat,
                time_lock_delta = EXCLUDED.time_lock_delta,
                disabled = EXCLUDED.disabled,
                last_update = EXCLUDED.last_update
            WHERE routing_policies.last_update <= EXCLUDED.last_update
            "#,
        )
        .bind(&p.channel_point)
        .bind(&p.advertising_pubkey)
        .bind(p.fee_base_msat)
        .bind(p.fee_rate_ppm)
        .bind(p.min_htlc_msat)
        .bind(p.max_htlc_msat)
        .bind(p.time_lock_delta)
        .bind(p.disabled)
        .bind(p.last_update)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
