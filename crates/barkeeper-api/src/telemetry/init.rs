use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "barkeeper=debug,tower_http=debug";

/// Initialize console tracing.
///
/// The filter comes from `RUST_LOG` when set. Calling this more than once
/// (as integration tests do) keeps the first subscriber.
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    let console_fmt = tracing_subscriber::fmt::layer().event_format(
        Format::default()
            .compact()
            .with_target(false)
            .without_time(),
    );

    let initialized = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(console_fmt)
        .try_init();

    if initialized.is_ok() {
        tracing::info!("Tracing initialized");
    }

    Ok(())
}
