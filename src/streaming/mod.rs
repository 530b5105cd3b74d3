//! rtl_tcp streaming server components

pub mod broadcast;
pub mod dispatcher;
pub mod mux;
pub mod protocol;

pub use broadcast::{BroadcastStats, Broadcaster};
pub use dispatcher::{CommandDispatcher, Dispatch};
pub use mux::{ClientId, ConnectionMux, Inbound, Readiness};
pub use protocol::{Command, DongleInfo, encode_handshake, encode_samples};
