//! Well-known client directories.
//!
//! # Environment Variables
//!
//! - `RAGCHAT_CONFIG_DIR` - Override the configuration directory

use std::path::PathBuf;

/// Application directory name under the platform config dir.
const APP_NAME: &str = "ragchat";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "RAGCHAT_CONFIG_DIR";

/// Log directory name inside the config directory.
const LOG_DIR: &str = "logs";

/// The ragchat configuration directory.
///
/// `$RAGCHAT_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/ragchat` (or the
/// platform equivalent).
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(LOG_DIR))
}
