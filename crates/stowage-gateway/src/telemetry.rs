use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install the console subscriber. Call once, from `main`.
///
/// The filter comes from `RUST_LOG`, defaulting to `stowage=info`.
pub fn init_telemetry(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "stowage=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
        return;
    }

    let console_fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(
            Format::default()
                .compact()
                .with_target(false)
                .without_time(),
        );
    tracing_subscriber::registry()
        .with(filter)
        .with(console_fmt)
        .init();
}
