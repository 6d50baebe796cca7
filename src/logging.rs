//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays parseable. `RUST_LOG` overrides the default `info` level.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (e.g. from tests) keeps the first subscriber.
    let result = if json {
        builder.json().with_target(false).try_init()
    } else {
        builder.with_target(false).try_init()
    };

    if result.is_ok() {
        tracing::debug!(json, "logging initialized");
    }
}
