//! Channel factories for cache update notifications.

use crate::cache::CacheUpdate;
use tokio::sync::mpsc;

/// Default buffer size for notification channels.
///
/// Enough to absorb bursts (a flurry of channel events on reconnect) while
/// keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for cache update notifications.
pub type CacheUpdateSender = mpsc::Sender<CacheUpdate>;
/// Receiver handle for cache update notifications.
pub type CacheUpdateReceiver = mpsc::Receiver<CacheUpdate>;

/// Create a new cache update channel.
///
/// Each cache monitor owns one receiver; the subscription tasks that learn
/// about membership changes hold clones of the sender.
pub fn cache_update_channel() -> (CacheUpdateSender, CacheUpdateReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
