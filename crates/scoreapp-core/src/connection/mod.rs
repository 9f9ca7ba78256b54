//! Live connection lifecycle
//!
//! [`ConnectionState`] is the observable snapshot; [`ConnectionStateMachine`]
//! owns the transitions and asks its driver for side effects.

pub mod machine;
pub mod state;

pub use machine::{
    CloseInfo, ConnectionStateMachine, Effect, Generation, TransportEvent, TransportOutcome,
    ABNORMAL_CLOSE_CODE, INTENTIONAL_CLOSE_REASON, NORMAL_CLOSE_CODE,
};
pub use state::{ConnectionState, ConnectionStateName};
