use tracing_subscriber::EnvFilter;

/// Initialise logging for embedding hosts. The default level is `info`;
/// passing `debug = true` raises it to `debug` and lets `RUST_LOG` override
/// the filter. When debug logging is off the level is forced to `info`
/// regardless of the environment, to avoid accidental verbose output.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
