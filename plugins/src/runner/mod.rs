pub mod process;

pub use recon_core::runner::{RunOutcome, RunnerPlugin, RunnerSession, RunnerStartArgs, Signal};
