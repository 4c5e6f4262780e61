//! Installs the process-wide log subscriber for the binaries.
//!
//! Library code only emits `tracing` events; nothing below is called from the library itself.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatting subscriber on standard error, filtered by `RUST_LOG`.
///
/// `verbose` lowers the default filter to `debug`. Calling this more than once is harmless; only
/// the first call installs a subscriber.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
