// Logger initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "litreview=info";

/// Install the global tracing subscriber.
///
/// Logs go to stderr so the report printed on stdout can be piped cleanly.
/// `RUST_LOG` overrides the default filter.
pub fn init_logger(verbose: bool) {
    let fallback = if verbose { "litreview=debug" } else { DEFAULT_FILTER };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
