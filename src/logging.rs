use tracing_subscriber::EnvFilter;

/// Environment variable overriding the `-v`/`-q` verbosity with a full
/// filter directive, e.g. `BIDSORT_LOG=bidsort_library=debug`.
pub const LOG_ENV: &str = "BIDSORT_LOG";

/// Default filter for a verbosity level: `-q` is -1, each `-v` adds one.
fn default_directive(verbosity: i8) -> &'static str {
    match verbosity {
        i8::MIN..=-1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber, logging to stderr.
pub fn init(verbosity: i8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 0)
        .with_writer(std::io::stderr)
        .init();
}
