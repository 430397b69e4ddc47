//! Restricted execution of untrusted computation snippets
//!
//! A snippet is a short [Rhai](https://rhai.rs) script that reads OHLCV
//! columns and writes named values into a `result` map:
//!
//! ```text
//! let r = rsi(close, 14);
//! result.rsi = round(last(r), 2);
//! result.sma_20 = last(sma(close, 20));
//! ```
//!
//! Snippets are checked twice. A static scan rejects disallowed tokens
//! (module loading, dynamic evaluation, process and clock access) before
//! anything runs. At runtime the interpreter exposes only an allow-list of
//! pure functions, the read-only columns `open`, `high`, `low`, `close`,
//! `volume` and the mutable `result` binding; any reach outside that fails
//! with [`SandboxError::CapabilityViolation`].
//!
//! Each execution runs on its own OS thread under a wall-clock deadline.
//! When the deadline passes the caller gets [`SandboxError::Timeout`] at
//! once and the worker is cancelled from inside the interpreter loop, so it
//! exits instead of spinning in the background.
//!
//! This is a capability-restricted interpreter, not an OS jail. Run it in a
//! disposable process when stronger isolation is needed.

pub mod dataset;
pub mod error;
pub mod executor;
pub mod functions;
pub mod guard;
pub mod indicators;
pub mod value;

pub use dataset::Ohlcv;
pub use error::{SandboxError, SandboxResult};
pub use executor::{SandboxConfig, SandboxExecutionRequest, SandboxExecutor, SandboxOutput};
pub use value::MetricValue;
