use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for binaries.
///
/// `RUST_LOG` overrides the default `info` filter. Calling it twice is
/// harmless; the second install is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
