mod abort;
mod io_pump;
pub mod log;
mod supervisor;
#[cfg(test)]
pub(crate) mod testing;
mod traits;
pub mod types;

pub use log::{LogLine, LogPoll, LogStream, LogSubscription, SessionLog};
pub use supervisor::{ProcessSupervisor, SessionHandle};
pub use traits::{RunnerPlugin, RunnerSession};
pub use types::{
    CancelReason, ExitOutcome, RunOutcome, RunSummary, RunnerStartArgs, Signal, SupervisorEvent,
    SupervisorSettings,
};
