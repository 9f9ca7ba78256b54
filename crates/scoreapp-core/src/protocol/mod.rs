//! Live feed protocol: frame decoding and dispatch

pub mod frame;
pub mod router;

pub use frame::InboundFrame;
pub use router::{MessageRouter, RouteSummary};
