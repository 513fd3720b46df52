use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// Install the global fmt subscriber. Logs go to stderr so `status` output on
/// stdout stays machine-readable. `verbose` lowers the crate's own level to debug.
pub fn init_tracing(verbose: bool) -> Result<(), anyhow::Error> {
    let fallback = if verbose {
        format!("{DEFAULT_FILTER},rating_porter=debug")
    } else {
        DEFAULT_FILTER.to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
