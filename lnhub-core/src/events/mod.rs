//! Event distribution for the ingestion-and-fan-out pipeline.
//!
//! Subscription tasks and command handlers publish [`EventEnvelope`]s onto
//! the [`EventBus`]; every gateway session holds its own [`BusSubscription`]
//! and relays the envelope kinds its client is interested in. Cache update
//! notifications travel on separate mpsc channels created here.

pub mod bus;
pub mod channels;
pub mod envelope;

pub use bus::{BusSubscription, DEFAULT_BUS_CAPACITY, EventBus};
pub use channels::{CacheUpdateReceiver, CacheUpdateSender, DEFAULT_CHANNEL_BUFFER,
    cache_update_channel};
pub use envelope::{EventEnvelope, EventKind};
