//! WebSocket support for the realtime gateway.
//!
//! Devices hold one connection each and exchange JSON envelopes with the
//! server: keep-alive pings and delta sync requests.

mod manager;
mod protocol;

pub use manager::{Connection, ConnectionManager, MessageSender};
pub use protocol::*;
