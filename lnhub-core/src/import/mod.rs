//! One-shot snapshot imports establishing baseline state.
//!
//! Runs to completion before any incremental subscription starts so there is
//! no window between "current state" and "first streamed update". Every
//! import is an idempotent upsert and tolerates re-running. Any failure is
//! fatal to startup and propagated to the supervisor.

use thiserror::Error;
use tracing::{info, warn};

use crate::db::{LedgerStore, StoreError};
use crate::entities::ChannelStatus;
use crate::entities::channel::ChannelUpsert;
use crate::entities::node_record::NodeUpsert;
use crate::entities::routing_policy::RoutingPolicyUpsert;
use crate::node::{ClosedChannelSnapshot, LightningNode, NodeError};

/// Errors that can occur during snapshot import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Node API error
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// Database error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Run all snapshot imports in order.
pub async fn run_snapshot_import(
    node: &dyn LightningNode,
    store: &dyn LedgerStore,
    node_id: i32,
) -> Result<(), ImportError> {
    let info = node.get_info().await?;
    info!(
        identity = %info.identity_pubkey,
        block_height = info.block_height,
        "starting snapshot import"
    );
    import_open_channels(node, store, node_id).await?;
    import_closed_channels(node, store, node_id).await?;
    import_missing_nodes(node, store, node_id).await?;
    import_routing_policies(node, store).await?;
    Ok(())
}

/// Import every currently open channel.
pub async fn import_open_channels(
    node: &dyn LightningNode,
    store: &dyn LedgerStore,
    node_id: i32,
) -> Result<(), ImportError> {
    let channels = node.list_channels().await?;
    let count = channels.len();
    for channel in channels {
        store
            .upsert_channel(ChannelUpsert {
                node_id,
                channel_point: channel.channel_point,
                remote_pubkey: channel.remote_pubkey,
                capacity_sat: channel.capacity_sat,
                funding_txid: channel.funding_txid,
                funding_output_index: channel.funding_output_index,
                private: channel.private,
                status: ChannelStatus::Open,
            })
            .await?;
    }
    info!(count, "imported open channels");
    Ok(())
}

/// Import historical (closed) channels.
pub async fn import_closed_channels(
    node: &dyn LightningNode,
    store: &dyn LedgerStore,
    node_id: i32,
) -> Result<(), ImportError> {
    let channels = node.closed_channels().await?;
    let count = channels.len();
    for channel in channels {
        let status = closed_status(&channel);
        store
            .upsert_channel(ChannelUpsert {
                node_id,
                channel_point: channel.channel_point,
                remote_pubkey: channel.remote_pubkey,
                capacity_sat: channel.capacity_sat,
                funding_txid: channel.funding_txid,
                funding_output_index: channel.funding_output_index,
                private: false,
                status,
            })
            .await?;
    }
    info!(count, "imported closed channels");
    Ok(())
}

fn closed_status(channel: &ClosedChannelSnapshot) -> ChannelStatus {
    match channel.close_type.as_deref() {
        Some("local_force") | Some("remote_force") | Some("breach") => ChannelStatus::ForceClosed,
        _ => ChannelStatus::Closed,
    }
}

/// Fetch and store node records for channel counterparties we have no
/// record of yet.
///
/// A counterparty the node's graph no longer knows (pruned, never gossiped)
/// is skipped with a warning; that is not a startup failure.
pub async fn import_missing_nodes(
    node: &dyn LightningNode,
    store: &dyn LedgerStore,
    node_id: i32,
) -> Result<(), ImportError> {
    let mut pubkeys: Vec<String> = node
        .list_channels()
        .await?
        .into_iter()
        .map(|c| c.remote_pubkey)
        .collect();
    pubkeys.extend(
        node.closed_channels()
            .await?
            .into_iter()
            .map(|c| c.remote_pubkey),
    );
    pubkeys.sort();
    pubkeys.dedup();

    let missing = store.unknown_node_pubkeys(pubkeys).await?;
    let mut imported = 0usize;
    for pubkey in missing {
        match node.get_node_info(&pubkey).await {
            Ok(info) => {
                store
                    .upsert_node(NodeUpsert {
                        pubkey: info.pubkey,
                        alias: info.alias,
                        color: info.color,
                        last_update: info.last_update,
                    })
                    .await?;
                imported += 1;
            }
            Err(NodeError::Api { message }) => {
                warn!(%pubkey, %message, "node not found in graph, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(imported, node_id, "imported missing node records");
    Ok(())
}

/// Import the advertised routing policies of our open channels.
pub async fn import_routing_policies(
    node: &dyn LightningNode,
    store: &dyn LedgerStore,
) -> Result<(), ImportError> {
    let policies = node.routing_policies().await?;
    let count = policies.len();
    for policy in policies {
        store
            .upsert_routing_policy(RoutingPolicyUpsert {
                channel_point: policy.channel_point,
                advertising_pubkey: policy.advertising_pubkey,
                fee_base_msat: policy.fee_base_msat,
                fee_rate_ppm: policy.fee_rate_ppm,
                min_htlc_msat: policy.min_htlc_msat,
                max_htlc_msat: policy.max_htlc_msat,
                time_lock_delta: policy.time_lock_delta,
                disabled: policy.disabled,
                last_update: policy.last_update,
            })
            .await?;
    }
    info!(count, "imported routing policies");
    Ok(())
}
