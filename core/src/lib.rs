pub mod api;
pub mod artifacts;
pub mod config;
pub mod controller;
pub mod env_check;
pub mod error;
pub mod runner;
pub mod settings;
pub mod state;
