//! Application settings configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_HOST;

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The name of the default profile to use.
    pub default_profile: Option<String>,
    /// The Lighthouse host; accounts live at `https://<account>.<host>`.
    pub host: String,
    /// Directory for daily-rotated log files. Unset logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_profile: None,
            host: DEFAULT_HOST.to_string(),
            log_dir: None,
        }
    }
}
