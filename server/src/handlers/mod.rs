//! Sync core services and the realtime message handler.

pub mod connectivity;
pub mod delta;
pub mod offline;
mod websocket;

pub use connectivity::{
    ConnectivityMonitor, ConnectivityStatus, HttpProbe, MonitorOptions, ReachabilityProbe,
    StaticProbe,
};
pub use delta::{Delta, DeltaOptions, DeltaSync, ReplayOutcome};
pub use offline::{OfflineQueue, QueueOptions, ReplayReport};
pub use websocket::{handle_websocket_connection, process_message, Reply, Session};
