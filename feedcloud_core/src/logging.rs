use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Initialize the process-wide tracing subscriber. Noisy transport crates
/// are capped at warn unless overridden through `RUST_LOG`.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap())
        .add_directive("lapin=warn".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}
