use crate::db::DatabaseProcessor;
use kanau::processor::Processor;

/// A remote graph node we have learned about.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct NodeRecord {
    pub pubkey: String,
    pub alias: Option<String>,
    pub color: Option<String>,
    pub last_update: Option<i64>,
    pub created_at: time::PrimitiveDateTime,
}

/// Data for upserting a remote node record.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub pubkey: String,
    pub alias: Option<String>,
    pub color: Option<String>,
    pub last_update: Option<i64>,
}

#[derive(Debug, Clone)]
/// Idempotent insert-or-update keyed on the node public key.
pub struct UpsertNode {
    pub node: NodeUpsert,
}

impl Processor<UpsertNode> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertNode")]
    async fn process(&self, cmd: UpsertNode) -> Result<(), sqlx::Error> {
        let n = cmd.node;
        sqlx::query(
            r#"
            INSERT INTO nodes (pubkey, alias, color, last_update)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pubkey) DO UPDATE SET
                alias = COALESCE(EXCLUDED.alias, nodes.alias),
                color = COALESCE(EXCLUDED.color, nodes.color),
                last_update = COALESCE(EXCLUDED.last_update, nodes.last_update)
            "#,
        )
        .bind(&n.pubkey)
        .bind(&n.alias)
        .bind(&n.color)
        .bind(n.last_update)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Of the given pubkeys, return the ones without a node record yet.
///
/// The snapshot importer uses this to fetch only genuinely missing nodes
/// from the external node.
pub struct FilterUnknownNodePubkeys {
    pub pubkeys: Vec<String>,
}

impl Processor<FilterUnknownNodePubkeys> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FilterUnknownNodePubkeys")]
    async fn process(&self, query: FilterUnknownNodePubkeys) -> Result<Vec<String>, sqlx::Error> {
        if query.pubkeys.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar(
            r#"
            SELECT p FROM UNNEST($1::text[]) AS p
            EXCEPT
            SELECT pubkey FROM nodes
            "#,
        )
        .bind(&query.pubkeys)
        .fetch_all(&self.pool)
        .await
    }
}
