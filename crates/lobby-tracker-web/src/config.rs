//! Configuration resolution for the server and command line.
//!
//! Precedence everywhere: command-line flag, then environment variable, then
//! built-in default.

use chrono::NaiveDate;
use lobby_tracker::config::Endpoints;
use lobby_tracker::registry::{self, JurisdictionId};
use lobby_tracker::TrackerConfig;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable that points every source at one mirror base URL.
pub const UPSTREAM_ENV: &str = "LOBBY_TRACKER_UPSTREAM";

/// Resolve the listen host.
pub fn resolve_host(explicit: Option<&str>) -> String {
    if let Some(host) = explicit {
        return host.to_string();
    }
    match std::env::var("HOST") {
        Ok(host) if !host.trim().is_empty() => host.trim().to_string(),
        _ => DEFAULT_HOST.to_string(),
    }
}

/// Resolve the listen port. An unparsable `PORT` is ignored with a warning.
pub fn resolve_port(explicit: Option<u16>) -> u16 {
    if let Some(port) = explicit {
        return port;
    }
    match std::env::var("PORT") {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "ignoring invalid PORT");
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}

/// Resolve the optional mirror base URL.
pub fn resolve_upstream(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(String::from)
        .or_else(|| std::env::var(UPSTREAM_ENV).ok())
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
}

/// Jurisdictions pre-selected in the search form: registry defaults, plus
/// `enable`, minus `disable`. Registry order is kept.
pub fn default_selection(enable: &[JurisdictionId], disable: &[JurisdictionId]) -> Vec<JurisdictionId> {
    let mut ids = registry::default_selection();
    ids.extend_from_slice(enable);
    ids.retain(|id| !disable.contains(id));
    ids.sort();
    ids.dedup();
    ids
}

/// Overrides applied on top of [`TrackerConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct TrackerOverrides {
    /// Per-connector deadline in seconds.
    pub timeout_secs: Option<u64>,
    /// Earliest GOV.UK publication date.
    pub uk_since: Option<NaiveDate>,
    /// Base URL replacing every source host.
    pub upstream: Option<String>,
}

pub fn tracker_config(overrides: &TrackerOverrides) -> TrackerConfig {
    let mut config = TrackerConfig::default();
    if let Some(secs) = overrides.timeout_secs {
        config.connector_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(since) = overrides.uk_since {
        config.uk.since = since;
    }
    if let Some(base) = overrides.upstream.as_deref() {
        config.endpoints = Endpoints::rooted_at(base);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_values_win() {
        assert_eq!(resolve_host(Some("0.0.0.0")), "0.0.0.0");
        assert_eq!(resolve_port(Some(9000)), 9000);
        assert_eq!(
            resolve_upstream(Some(" http://mirror.local ")).as_deref(),
            Some("http://mirror.local")
        );
    }

    #[test]
    fn test_default_selection_overrides() {
        let ids = default_selection(&[JurisdictionId::Uk], &[JurisdictionId::Finland]);
        assert!(ids.contains(&JurisdictionId::Uk));
        assert!(!ids.contains(&JurisdictionId::Finland));
        assert!(!ids.contains(&JurisdictionId::UkOfficials));
        assert_eq!(ids[0], JurisdictionId::Eu);
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn test_tracker_config_overrides() {
        let config = tracker_config(&TrackerOverrides {
            timeout_secs: Some(30),
            uk_since: NaiveDate::from_ymd_opt(2020, 1, 1),
            upstream: Some("http://127.0.0.1:1".into()),
        });
        assert_eq!(config.connector_timeout, Duration::from_secs(30));
        assert_eq!(config.uk.since.to_string(), "2020-01-01");
        assert_eq!(config.endpoints.gov_uk, "http://127.0.0.1:1");

        let untouched = tracker_config(&TrackerOverrides::default());
        assert_eq!(untouched.connector_timeout, Duration::from_secs(120));
    }
}
