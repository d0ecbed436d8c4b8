use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::ConfigError;

/// Librarian settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Name the MIDI client registers with the host.
    pub client_name: String,
    pub discovery_timeout_ms: u64,
    /// Gap between two program dump requests.
    pub request_interval_ms: u64,
    /// Give up on a bank dump that has not reached slot 63 after this long. 0 disables it.
    pub dump_timeout_ms: u64,
    /// How long a client waits for the service to answer.
    pub receive_timeout_ms: u64,
    pub log_spec: String,
    pub export_dir: PathBuf,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            client_name: String::from("volca fm librarian"),
            discovery_timeout_ms: 2000,
            request_interval_ms: 200,
            dump_timeout_ms: 20_000,
            receive_timeout_ms: 2000,
            log_spec: String::from("info"),
            export_dir: PathBuf::from("."),
        }
    }
}

impl LibrarianConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn dump_timeout(&self) -> Option<Duration> {
        (self.dump_timeout_ms > 0).then(|| Duration::from_millis(self.dump_timeout_ms))
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}
