use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber on stderr so stdout stays with the operator.
/// `RUST_LOG` wins over the level picked by `trace`.
pub fn init(trace: bool) {
    let level = if trace { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
