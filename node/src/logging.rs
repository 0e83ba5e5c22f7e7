//! Console logging for the node binary. The node runs on constrained
//! hardware with no durable log storage of its own, so unlike the hub it
//! only sets up a console layer; the env filter convention matches the
//! hub's logging module.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer().with_ansi(true).with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
}
