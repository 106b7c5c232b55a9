pub mod api;
pub mod app;
pub mod cli;
pub mod conversion;
pub mod file;
pub mod notify;
pub mod persistence;
pub mod registry;
pub mod resolve;
pub mod util;

pub use app::{Config, Orchestrator};
