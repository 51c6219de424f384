//! Controller configuration.
//!
//! Loaded from environment variables:
//!
//! | Variable               | Default  |
//! |------------------------|----------|
//! | `WATCH_NAMESPACE`      | all      |
//! | `LABEL_SELECTOR`       | none     |
//! | `FIELD_SELECTOR`       | none     |
//! | `MAX_CLAIMS`           | `200Gi`  |
//! | `RESYNC_INTERVAL_SECS` | `3`      |
//! | `SYNC_TIMEOUT_SECS`    | `0` (off)|

use crate::error::ControllerError;
use claim_source::{ClaimSelector, Quantity};
use std::env;
use std::time::Duration;

const DEFAULT_MAX_CLAIMS: &str = "200Gi";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 3;

/// Validated controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Which claims to list and watch
    pub selector: ClaimSelector,

    /// Aggregate ceiling; always non-zero
    pub ceiling: Quantity,

    /// Period of store resync replays (`None` = disabled)
    pub resync_interval: Option<Duration>,

    /// Upper bound on the initial listing (`None` = wait indefinitely)
    pub sync_timeout: Option<Duration>,
}

impl Config {
    /// Build a config with the given ceiling and defaults for everything else
    #[cfg(test)]
    #[must_use]
    pub fn with_ceiling(ceiling: Quantity) -> Self {
        Self {
            selector: ClaimSelector::all(),
            ceiling,
            resync_interval: None,
            sync_timeout: None,
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut selector = ClaimSelector::all();
        selector.namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        if let Some(labels) = lookup("LABEL_SELECTOR") {
            selector = selector.with_labels(labels);
        }
        if let Some(fields) = lookup("FIELD_SELECTOR") {
            selector = selector.with_fields(fields);
        }

        let max_claims = lookup("MAX_CLAIMS").unwrap_or_else(|| DEFAULT_MAX_CLAIMS.to_string());
        let ceiling = max_claims.parse::<Quantity>().map_err(|e| {
            ControllerError::InvalidConfig(format!("MAX_CLAIMS: {e}"))
        })?;
        if ceiling.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "MAX_CLAIMS must be greater than zero".to_string(),
            ));
        }

        let resync_interval = parse_seconds(&lookup, "RESYNC_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS);
        let sync_timeout = parse_seconds(&lookup, "SYNC_TIMEOUT_SECS")?.unwrap_or(0);

        Ok(Self {
            selector,
            ceiling,
            resync_interval: non_zero(resync_interval),
            sync_timeout: non_zero(sync_timeout),
        })
    }
}

fn parse_seconds<F>(lookup: &F, key: &str) -> Result<Option<u64>, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))
            })
        })
        .transpose()
}

fn non_zero(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.selector, ClaimSelector::all());
        assert_eq!(config.ceiling, Quantity::from_bytes(200 * 1024 * 1024 * 1024));
        assert_eq!(config.resync_interval, Some(Duration::from_secs(3)));
        assert_eq!(config.sync_timeout, None);
    }

    #[test]
    fn test_all_options() {
        let config = load(&[
            ("WATCH_NAMESPACE", "storage"),
            ("LABEL_SELECTOR", "tier=db"),
            ("FIELD_SELECTOR", "status.phase=Bound"),
            ("MAX_CLAIMS", "10Mi"),
            ("RESYNC_INTERVAL_SECS", "0"),
            ("SYNC_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.selector.namespace.as_deref(), Some("storage"));
        assert_eq!(config.selector.label_selector.as_deref(), Some("tier=db"));
        assert_eq!(
            config.selector.field_selector.as_deref(),
            Some("status.phase=Bound")
        );
        assert_eq!(config.ceiling.bytes(), 10 * 1024 * 1024);
        assert_eq!(config.resync_interval, None);
        assert_eq!(config.sync_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = load(&[("WATCH_NAMESPACE", "")]).unwrap();
        assert_eq!(config.selector.namespace, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("MAX_CLAIMS", "lots")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("MAX_CLAIMS", "0Gi")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("RESYNC_INTERVAL_SECS", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
