use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info,server=debug,services=debug,preview=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global subscriber: fmt output filtered by `RUST_LOG`, plus
/// the Sentry layer when Sentry was initialised first.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(crate::sentry::is_enabled().then(crate::sentry::sentry_layer))
        .try_init();
    if let Err(e) = result {
        eprintln!("tracing already initialised: {e}");
    }
}
