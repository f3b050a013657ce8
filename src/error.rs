use std::path::PathBuf;

/// Errors that abort a scan before any worker is spawned.
///
/// Per-port failures (resolution, refused, timeout) never surface here: the
/// probe classifies them as closed and the scan carries on.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error("service definitions unavailable at {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ScanResult<T> = Result<T, ScanError>;
