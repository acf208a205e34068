use std::io::IsTerminal;

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn verbosity_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

/// Picks the filter directives: `RUST_LOG`, then the configured
/// `log_filter`, then the level implied by `-v`/`-q` counts. Blank values
/// count as unset.
pub fn resolve_filter(
    rust_log: Option<&str>,
    configured: Option<&str>,
    verbose: u8,
    quiet: u8,
) -> String {
    [rust_log, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directives| !directives.is_empty())
        .unwrap_or_else(|| verbosity_level(verbose, quiet))
        .to_string()
}

/// Unparseable directives degrade to the verbosity level; the parse error
/// is handed back so it can be logged once a subscriber exists.
fn build_filter(directives: &str, verbose: u8, quiet: u8) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(directives) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::new(verbosity_level(verbose, quiet)),
            Some(format!("{directives:?}: {err}")),
        ),
    }
}

/// Installs the fmt subscriber on stderr. A subscriber that is already
/// installed is left in place.
pub fn init_tracing(verbose: u8, quiet: u8, configured: Option<&str>) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = resolve_filter(rust_log.as_deref(), configured, verbose, quiet);
    let (filter, rejected) = build_filter(&directives, verbose, quiet);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();

    match installed {
        Ok(()) => debug!(%directives, "logging initialized"),
        Err(err) => debug!(error = %err, "tracing subscriber already set, continuing"),
    }
    if let Some(rejected) = rejected {
        warn!(filter = %rejected, "invalid log filter; using verbosity level");
    }
    Ok(())
}
