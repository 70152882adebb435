//! Client configuration for ragchat.
//!
//! Kubeconfig-style configuration with named contexts, each pointing at a
//! ragchat server with optional per-context overrides. See [`client`] for
//! the file format.

pub mod client;
pub mod error;
pub mod paths;

pub use client::{
    ClientConfig, ClientDefaults, Context, DEFAULT_SERVER_URL, ResolvedContext,
    client_config_path, load_client_config, load_client_config_from, save_client_config,
    save_client_config_to,
};
pub use error::{ConfigError, Result};
pub use paths::{CONFIG_DIR_ENV, log_dir, xdg_config_dir};
