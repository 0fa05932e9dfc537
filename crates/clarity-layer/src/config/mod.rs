//! Effect configuration.
//!
//! This module is responsible for:
//! - the strongly-typed per-session `EffectConfig`
//! - resolving option values with env -> per-user file -> per-install file
//!   -> default precedence
//! - creating/migrating the documented per-user config file

mod effect;
mod resolver;

pub use effect::{EffectConfig, FakeHdrConfig, LevelsConfig};
pub use resolver::{ensure_default_config, resolve, ConfigSources};
