//! Logger initialization with a hot-swappable level.
//!
//! The level is the one piece of cross-cutting state: it is mutated only
//! through `init` and `apply_level`, the latter driven by config reloads.

use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, Registry};

static RELOAD_HANDLE: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Parse a config-file log level. Returns `None` for unknown levels.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "debug" => Some(LevelFilter::DEBUG),
        "" | "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init(level: &str) {
    let filter = parse_level(level).unwrap_or(LevelFilter::INFO);
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();
    let _ = RELOAD_HANDLE.set(handle);
    tracing::info!(level = %filter, "logger initialized");
}

/// Re-apply the configured level after a config reload.
pub fn apply_level(level: &str) {
    let Some(filter) = parse_level(level) else {
        return;
    };
    if let Some(handle) = RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| *f = filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("INFO"), Some(LevelFilter::INFO));
        assert_eq!(parse_level(" warn "), Some(LevelFilter::WARN));
        assert_eq!(parse_level("warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("error"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level(""), Some(LevelFilter::INFO));
        assert_eq!(parse_level("verbose"), None);
    }
}
