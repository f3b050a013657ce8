use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ScanError, ScanResult};
use crate::services::DEFAULT_SERVICES_PATH;

/// Scan defaults, optionally read from a JSON file. Command-line flags
/// override whatever is set here; see [`Config::merge_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub services_path: PathBuf,
    pub start_port: u16,
    pub end_port: u16,
    pub max_workers: usize,
    pub timeout_ms: u64,
    pub color_enabled: bool,
}

/// Values given on the command line. `None` keeps the config value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub start_port: Option<u16>,
    pub end_port: Option<u16>,
    pub max_workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub services_path: Option<PathBuf>,
    pub no_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services_path: PathBuf::from(DEFAULT_SERVICES_PATH),
            start_port: 1,
            end_port: 1024,
            max_workers: 1,
            timeout_ms: 1000,
            color_enabled: true,
        }
    }
}

impl Config {
    /// Load a config file. Missing keys fall back to [`Config::default`].
    ///
    /// Not validated here: a file may leave a field for the command line to
    /// fill in, so validation happens once after the merge.
    pub fn load(path: impl AsRef<Path>) -> ScanResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            ScanError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Apply command-line values on top of this config and validate the
    /// result. A single-port range is rejected here, as the command line
    /// requires the end port to be greater than the start port.
    pub fn merge_overrides(mut self, overrides: &ConfigOverrides) -> ScanResult<Self> {
        if let Some(p) = overrides.start_port {
            self.start_port = p;
        }
        if let Some(p) = overrides.end_port {
            self.end_port = p;
        }
        if let Some(w) = overrides.max_workers {
            self.max_workers = w;
        }
        if let Some(t) = overrides.timeout_ms {
            self.timeout_ms = t;
        }
        if let Some(path) = &overrides.services_path {
            self.services_path = path.clone();
        }
        if overrides.no_color {
            self.color_enabled = false;
        }
        self.validate()?;
        if self.start_port == self.end_port {
            return Err(ScanError::InvalidConfig(
                "end port must be greater than start port".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.timeout_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ScanError::InvalidConfig(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.start_port == 0 || self.end_port == 0 {
            return Err(ScanError::InvalidConfig(
                "ports must be within 1-65535".to_string(),
            ));
        }
        if self.start_port > self.end_port {
            return Err(ScanError::InvalidConfig(
                "start_port must not exceed end_port".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
