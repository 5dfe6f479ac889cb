use tracing_subscriber::{
    Layer,
    filter::{EnvFilter, LevelFilter},
    layer::SubscriberExt as _,
    registry,
};

fn filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into())
}

/// Installs a global stderr subscriber and a panic hook that records the
/// backtrace. Call once at startup. Hosts that already own a subscriber
/// configure their own layers instead.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr).with_filter(filter());
    tracing::subscriber::set_global_default(registry().with(fmt_layer)).expect("failed to set global subscriber");
    tracing::info!("logging initialized");
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(message_id = "pT5kRw9B", "{panic_info}\n{:#}", std::backtrace::Backtrace::force_capture());
    }));
}
