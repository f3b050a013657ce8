//! Library crate for portscan-rs: a concurrent TCP connect scanner for one
//! host and one port range, annotated with well-known service names.
pub mod config;
pub mod display;
pub mod error;
pub mod partition;
pub mod probe;
pub mod scanner;
pub mod services;
pub mod types;

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "portscan_rs=debug" } else { "portscan_rs=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
