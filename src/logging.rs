use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "RENEWAL_LOG";
const DEFAULT_FILTER: &str = "renewal=info";

static INIT: Once = Once::new();

/// Installs the global subscriber. Filter directives come from `RENEWAL_LOG`
/// (e.g. `RENEWAL_LOG=renewal=debug`), falling back to `renewal=info`.
/// Output goes to stderr so CSV or JSON written to stdout stays clean.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    });
}
