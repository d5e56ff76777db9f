//! Wire-level types shared between the lnhub server and its clients.
//!
//! Everything in this crate is a plain serde DTO: operation request
//! payloads, client-visible event payloads, and the websocket session
//! protocol messages.

pub mod objects;
