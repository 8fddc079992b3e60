//! HTTP implementation of the remote fetch contract.

pub mod client;
pub mod config;
pub mod convert;

pub use client::HttpSource;
pub use config::{explorer_defaults, load_config, load_config_file, ClientConfig};
