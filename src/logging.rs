// 📜 Logging setup for the binaries
//
// Library code only emits `tracing` events; installing a subscriber is left
// to whoever owns main().

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RUST_LOG wins; otherwise `default_level` (e.g. "info" or "erp_core=debug")
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Safe to call twice; the second call is a no-op.
pub fn init(default_level: &str) {
    let installed = tracing_subscriber::registry()
        .with(filter(default_level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("debug");
        init("info");
        tracing::info!("still logging");
    }

    #[test]
    fn test_bad_level_falls_back() {
        // an unparseable directive must not panic
        let _ = filter("erp_core=[[[");
    }
}
