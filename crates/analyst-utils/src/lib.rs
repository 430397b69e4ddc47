//! Shared utilities for market-analyst
//!
//! Logging setup and typed environment lookups used by every other crate
//! in the workspace.

pub mod env;
pub mod logging;

pub use env::{EnvError, env_duration_secs, env_list, env_parse, env_string};
pub use logging::{init_tracing, init_tracing_json};
