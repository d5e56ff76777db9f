use crate::db::DatabaseProcessor;
use kanau::processor::Processor;

/// One settled forward as reported by the external node.
#[derive(Debug, Clone)]
pub struct ForwardInsert {
    pub time_ns: i64,
    pub incoming_channel_id: i64,
    pub outgoing_channel_id: i64,
    pub amt_in_msat: i64,
    pub amt_out_msat: i64,
    pub fee_msat: i64,
}

#[derive(Debug, Clone)]
/// Insert a page of forwards in a single query.
///
/// Uses QueryBuilder with ON CONFLICT DO NOTHING so re-polling an
/// overlapping window never duplicates rows. Returns the number of rows
/// actually inserted.
pub struct InsertManyForwards {
    pub node_id: i32,
    pub forwards: Vec<ForwardInsert>,
}

impl Processor<InsertManyForwards> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertManyForwards")]
    async fn process(&self, insert: InsertManyForwards) -> Result<u64, sqlx::Error> {
        if insert.forwards.is_empty() {
            return Ok(0);
        }

        let node_id = insert.node_id;
        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO forwards \
            (node_id, time_ns, incoming_channel_id, outgoing_channel_id, \
             amt_in_msat, amt_out_msat, fee_msat) ",
        );

        query_builder.push_values(insert.forwards, |mut b, forward| {
            b.push_bind(node_id)
                .push_bind(forward.time_ns)
                .push_bind(forward.incoming_channel_id)
                .push_bind(forward.outgoing_channel_id)
                .push_bind(forward.amt_in_msat)
                .push_bind(forward.amt_out_msat)
                .push_bind(forward.fee_msat);
        });

        query_builder.push(" ON CONFLICT (node_id, time_ns) DO NOTHING");

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Timestamp of the newest stored forward, used as the poll offset.
pub struct GetLatestForwardTimeNs {
    pub node_id: i32,
}

impl Processor<GetLatestForwardTimeNs> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLatestForwardTimeNs")]
    async fn process(&self, query: GetLatestForwardTimeNs) -> Result<Option<i64>, sqlx::Error> {
        let latest: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT MAX(time_ns) FROM forwards WHERE node_id = $1
            "#,
        )
        .bind(query.node_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(latest.flatten())
    }
}
