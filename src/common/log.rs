use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Filtering is controlled by
/// `TRELLIS_LOG` (e.g. `TRELLIS_LOG=trellis_wm=debug`), defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
