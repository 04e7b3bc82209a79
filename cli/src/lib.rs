//! recon-panel library: modules exposed for unit tests.

pub mod app;
pub mod commands;
pub mod tui;
