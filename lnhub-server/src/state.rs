//! Application state shared across all request handlers.

use lnhub_core::cache::Caches;
use lnhub_core::events::EventBus;
use lnhub_core::node::LightningNode;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc or
/// is an Arc-backed handle already).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Broadcast bus carrying live event envelopes.
    pub bus: EventBus,
    /// External node collaborator.
    pub node: Arc<dyn LightningNode>,
    /// Peer key and channel point caches (read-only here).
    pub caches: Caches,
    /// Local node id all gateway operations are scoped to.
    pub node_id: i32,
}
