use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default path of the dashboard document
pub const CONFIG_FILE: &str = "data/dashboard.json";

/// Default interval between health monitor cycles, in seconds
pub const DEFAULT_MONITOR_INTERVAL_SECS: i64 = 60;

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Fixed external repository the icon cache pulls SVGs from
pub const DEFAULT_ICON_SOURCE: &str = "https://cdn.jsdelivr.net/gh/walkxcode/dashboard-icons/svg";

/// Forecast endpoint used by the weather widget
pub const DEFAULT_WEATHER_API: &str = "https://api.open-meteo.com/v1/forecast";

/// Process-level settings for the Iron Dash server
///
/// Everything here comes from the environment (optionally overridden by the
/// positional command line arguments in `main`). The dashboard document itself
/// is managed by [`crate::store::DocumentStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Port the HTTP server binds to
    pub port: u16,
    /// Path of the persisted dashboard document
    pub data_file: PathBuf,
    /// Directory the icon cache writes SVG files into
    pub icon_dir: PathBuf,
    /// Directory of static frontend assets
    pub static_dir: PathBuf,
    /// Ping interval used when the document does not specify one
    pub ping_interval_secs: i64,
    /// Freshness window for parsed RSS/Atom feeds
    pub feed_ttl: Duration,
    /// Freshness window for parsed iCal calendars
    pub ical_ttl: Duration,
    /// Freshness window for weather reports
    pub weather_ttl: Duration,
    /// Base URL icons are fetched from
    pub icon_source: String,
    /// Forecast API base URL
    pub weather_api: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_file: PathBuf::from(CONFIG_FILE),
            icon_dir: PathBuf::from("data/icons"),
            static_dir: PathBuf::from("static"),
            ping_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            feed_ttl: Duration::from_secs(10 * 60),
            ical_ttl: Duration::from_secs(15 * 60),
            weather_ttl: Duration::from_secs(30 * 60),
            icon_source: DEFAULT_ICON_SOURCE.to_string(),
            weather_api: DEFAULT_WEATHER_API.to_string(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Values that are present but cannot be parsed are logged and replaced by
    /// their defaults, so a typo in one variable never prevents startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            parse_or(&lookup, key, fallback.as_secs()).map_or(fallback, Duration::from_secs)
        };

        Self {
            port: parse_or(&lookup, "PORT", defaults.port).unwrap_or(defaults.port),
            data_file: lookup("DATA_FILE").map_or(defaults.data_file, PathBuf::from),
            icon_dir: lookup("ICON_CACHE_DIR").map_or(defaults.icon_dir, PathBuf::from),
            static_dir: lookup("STATIC_DIR").map_or(defaults.static_dir, PathBuf::from),
            ping_interval_secs: parse_or(&lookup, "PING_INTERVAL", defaults.ping_interval_secs)
                .unwrap_or(defaults.ping_interval_secs),
            feed_ttl: secs("RSS_CACHE_TTL", defaults.feed_ttl),
            ical_ttl: secs("ICAL_CACHE_TTL", defaults.ical_ttl),
            weather_ttl: secs("WEATHER_CACHE_TTL", defaults.weather_ttl),
            icon_source: lookup("ICON_SOURCE_URL").unwrap_or(defaults.icon_source),
            weather_api: lookup("WEATHER_API_URL").unwrap_or(defaults.weather_api),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, fallback: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Some(fallback),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid value {raw:?} for {key}; using default");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.ping_interval_secs, DEFAULT_MONITOR_INTERVAL_SECS);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("DATA_FILE", "/srv/dash/config.json"),
            ("PING_INTERVAL", "15"),
            ("RSS_CACHE_TTL", "30"),
            ("ICON_SOURCE_URL", "http://127.0.0.1:9000/icons"),
        ]));

        assert_eq!(config.port, 8080);
        assert_eq!(config.data_file, PathBuf::from("/srv/dash/config.json"));
        assert_eq!(config.ping_interval_secs, 15);
        assert_eq!(config.feed_ttl, Duration::from_secs(30));
        assert_eq!(config.ical_ttl, AppConfig::default().ical_ttl);
        assert_eq!(config.icon_source, "http://127.0.0.1:9000/icons");
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("WEATHER_CACHE_TTL", "-5"),
        ]));

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.weather_ttl, AppConfig::default().weather_ttl);
    }
}
