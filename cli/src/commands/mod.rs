pub mod artifacts;
pub mod check;
pub mod cli;
pub mod run;
pub mod settings;
