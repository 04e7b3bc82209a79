//! Controller states, the run request/session model and the transition table.

pub mod transitions;
pub mod types;

pub use transitions::{StateTransition, TransitionError};
pub use types::{
    ControlState, ControllerEvent, RunRequest, RunSession, RunState, Stage, UnknownStage,
};
