//! Logging init: structured `tracing` output on stderr, filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,segdl=info";
const VERBOSE_FILTER: &str = "info,segdl=debug";

/// Installs the global subscriber. `RUST_LOG` wins over `verbose` when set.
/// Returns false if a subscriber was already installed.
pub fn init_logging(verbose: bool) -> bool {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
