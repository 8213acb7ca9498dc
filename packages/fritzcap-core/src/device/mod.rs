//! Device endpoint module.
//!
//! Resolves which device the agent talks to, from the environment, a config
//! file or built-in defaults.

pub mod config;

pub use config::{ConfigSource, DeviceConfig, load_device_config};
