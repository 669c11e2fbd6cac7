//! Logger setup.
//!
//! The engine only emits through the `log` facade; applications call
//! [`init_logging`] once to route it to `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig};
