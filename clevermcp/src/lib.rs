pub mod api;
pub mod clever;
pub mod config;
pub mod devices;
pub mod error;
pub mod mcp;
pub mod metrics;

pub use config::Config;
pub use error::{Error, Result};
