//! Core infrastructure: configuration.

pub mod config;

pub use config::{load_config, load_config_or_default, Config, LoadConfig};
