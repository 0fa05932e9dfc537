//! Logger setup for code that lives inside a host application's process.
//!
//! Only the `log` facade is used at call sites; this module wires up the
//! backend once, defaults to a quiet filter, and yields gracefully if the
//! host already installed a logger of its own.

mod init;

pub use init::{init_logging, LoggingConfig};
