//! Domain operations triggered by gateway clients.
//!
//! Each operation validates its request, calls the external node, and
//! publishes progress/result envelopes on the bus. The first error is
//! returned to the caller so the gateway can relay it to the requesting
//! client; asynchronous confirmation arrives as bus events.

pub mod address;
pub mod channels;
pub mod payments;

use thiserror::Error;

use crate::node::NodeError;

/// Errors returned directly to the requesting client.
#[derive(Debug, Error)]
pub enum OpError {
    /// The request payload is unusable.
    #[error("{0}")]
    Invalid(String),

    /// The external node rejected or failed the operation.
    #[error("node error: {0}")]
    Node(#[from] NodeError),
}

pub use address::new_address;
pub use channels::{close_channel, open_channel};
pub use payments::send_new_payment;
