// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod config;
pub mod deck;
pub mod error;
pub mod game;
pub mod keys;
pub mod pack;
pub mod progress;
pub mod queue;
pub mod runtime;
pub mod scoring;
pub mod srs;
pub mod timer;

pub use error::{Error, Result};
