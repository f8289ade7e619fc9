//! Feature flags, fetched once at process start
//!
//! Flags live in a Flagsmith environment. A missing key or a failed fetch
//! falls back to defaults: test mode off, every list empty.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

pub const FLAG_TEST_MODE: &str = "test-mode";
pub const FLAG_ALLOWED_IDS: &str = "allowed-reservation-ids";
pub const FLAG_BLOCKED_IDS: &str = "not-allowed-reservation-ids";
pub const FLAG_HUMAN_RESOLVED_IDS: &str = "human-resolved-complaint-ids";

/// Snapshot of the flags that steer the sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSet {
    pub test_mode: bool,
    pub allowed_ids: HashSet<i64>,
    pub blocked_ids: HashSet<i64>,
    pub human_resolved_ids: HashSet<i64>,
}

/// Why a reservation is left out of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Blocked,
    NotAllowlisted,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exclusion::Blocked => write!(f, "blocked"),
            Exclusion::NotAllowlisted => write!(f, "not_in_test_allowlist"),
        }
    }
}

impl FlagSet {
    /// Blocklist always wins; in test mode only allow-listed ids pass
    pub fn exclusion(&self, reservation_id: i64) -> Option<Exclusion> {
        if self.blocked_ids.contains(&reservation_id) {
            return Some(Exclusion::Blocked);
        }
        if self.test_mode && !self.allowed_ids.contains(&reservation_id) {
            return Some(Exclusion::NotAllowlisted);
        }
        None
    }

    /// Fetch from Flagsmith, falling back to defaults on any failure
    pub fn load(config: &Config) -> Self {
        let Some(env_key) = config.flagsmith_env_key.as_deref() else {
            info!("FLAGSMITH_ENV_KEY not set, using default flags");
            return Self::default();
        };

        match fetch(config, env_key) {
            Ok(flags) => {
                info!(
                    test_mode = flags.test_mode,
                    allowed = flags.allowed_ids.len(),
                    blocked = flags.blocked_ids.len(),
                    human_resolved = flags.human_resolved_ids.len(),
                    "Loaded feature flags"
                );
                flags
            }
            Err(e) => {
                warn!(error = %e, "Feature flag fetch failed, using defaults");
                Self::default()
            }
        }
    }

    /// Build from the environment flag listing returned by Flagsmith
    pub fn from_flagsmith(body: &str) -> Result<Self> {
        let states: Vec<FlagState> =
            serde_json::from_str(body).map_err(|e| Error::Decode(format!("flags: {}", e)))?;

        let mut flags = Self::default();
        for state in states {
            match state.feature.name.as_str() {
                FLAG_TEST_MODE => flags.test_mode = state.enabled,
                FLAG_ALLOWED_IDS => flags.allowed_ids = parse_id_list(&state.feature_state_value)?,
                FLAG_BLOCKED_IDS => flags.blocked_ids = parse_id_list(&state.feature_state_value)?,
                FLAG_HUMAN_RESOLVED_IDS => {
                    flags.human_resolved_ids = parse_id_list(&state.feature_state_value)?
                }
                _ => {}
            }
        }
        Ok(flags)
    }
}

#[derive(Debug, Deserialize)]
struct FlagState {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    feature_state_value: serde_json::Value,
    feature: Feature,
}

#[derive(Debug, Deserialize)]
struct Feature {
    name: String,
}

/// Flag values hold a JSON array of ids, either as a string or inline
fn parse_id_list(value: &serde_json::Value) -> Result<HashSet<i64>> {
    let ids: Vec<i64> = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(raw) if raw.trim().is_empty() => Vec::new(),
        serde_json::Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::Decode(format!("id list '{}': {}", raw, e)))?,
        other => serde_json::from_value(other.clone())
            .map_err(|e| Error::Decode(format!("id list {}: {}", other, e)))?,
    };
    Ok(ids.into_iter().collect())
}

fn fetch(config: &Config, env_key: &str) -> Result<FlagSet> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let url = format!("{}/flags/", config.flagsmith_api_url.trim_end_matches('/'));
    let response = http.get(&url).header("X-Environment-Key", env_key).send()?;

    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(Error::Transport(format!("GET {} status={}", url, status)));
    }

    FlagSet::from_flagsmith(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAGS_BODY: &str = r#"[
        {"enabled": true, "feature_state_value": null, "feature": {"name": "test-mode"}},
        {"enabled": true, "feature_state_value": "[98806978, 101]", "feature": {"name": "allowed-reservation-ids"}},
        {"enabled": true, "feature_state_value": "[7]", "feature": {"name": "not-allowed-reservation-ids"}},
        {"enabled": true, "feature_state_value": "", "feature": {"name": "human-resolved-complaint-ids"}},
        {"enabled": false, "feature_state_value": "x", "feature": {"name": "unrelated"}}
    ]"#;

    #[test]
    fn test_parse_flagsmith_listing() {
        let flags = FlagSet::from_flagsmith(FLAGS_BODY).unwrap();
        assert!(flags.test_mode);
        assert!(flags.allowed_ids.contains(&98806978));
        assert!(flags.blocked_ids.contains(&7));
        assert!(flags.human_resolved_ids.is_empty());
    }

    #[test]
    fn test_inline_array_value() {
        let body = r#"[{"enabled": true, "feature_state_value": [5, 6], "feature": {"name": "human-resolved-complaint-ids"}}]"#;
        let flags = FlagSet::from_flagsmith(body).unwrap();
        assert!(flags.human_resolved_ids.contains(&5));
        assert!(!flags.human_resolved_ids.contains(&7));
    }

    #[test]
    fn test_bad_listing_is_decode_error() {
        assert!(matches!(FlagSet::from_flagsmith("{"), Err(Error::Decode(_))));
        let body = r#"[{"enabled": true, "feature_state_value": "[oops]", "feature": {"name": "allowed-reservation-ids"}}]"#;
        assert!(matches!(FlagSet::from_flagsmith(body), Err(Error::Decode(_))));
    }

    #[test]
    fn test_exclusion_rules() {
        let mut flags = FlagSet::default();
        assert_eq!(flags.exclusion(1), None);

        flags.blocked_ids.insert(1);
        assert_eq!(flags.exclusion(1), Some(Exclusion::Blocked));

        flags.test_mode = true;
        flags.allowed_ids.insert(1);
        flags.allowed_ids.insert(2);
        assert_eq!(flags.exclusion(1), Some(Exclusion::Blocked));
        assert_eq!(flags.exclusion(2), None);
        assert_eq!(flags.exclusion(3), Some(Exclusion::NotAllowlisted));
    }

    #[test]
    fn test_load_without_key_is_default() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        assert_eq!(FlagSet::load(&config), FlagSet::default());
    }

    #[test]
    fn test_exclusion_display() {
        assert_eq!(Exclusion::Blocked.to_string(), "blocked");
        assert_eq!(Exclusion::NotAllowlisted.to_string(), "not_in_test_allowlist");
    }
}
