use std::time::Duration;

use karaoke_core::eligibility::EligibilityMode;
use karaoke_core::error::CoreError;
use karaoke_db::DEFAULT_MAX_CONNECTIONS;
use karaoke_events::bus::DEFAULT_CAPACITY;

/// Default lifetime of a proposed reorder plan.
pub const DEFAULT_PLAN_TTL_SECS: u64 = 600;

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development and tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Postgres connection string. `None` means the caller supplies a store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Eligibility mode used when an autoplay call does not name one.
    pub autoplay_mode: EligibilityMode,
    /// Skip re-publishing a `Held` event when the entry was already held
    /// for the same reason.
    pub suppress_unchanged_holds: bool,
    /// How long a previewed plan stays applicable.
    pub plan_ttl: Duration,
    pub event_bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            autoplay_mode: EligibilityMode::Strict,
            suppress_unchanged_holds: true,
            plan_ttl: Duration::from_secs(DEFAULT_PLAN_TTL_SECS),
            event_bus_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if present) and then read the environment.
    pub fn load() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default  |
    /// |----------------------------|----------|
    /// | `DATABASE_URL`             | none     |
    /// | `DB_MAX_CONNECTIONS`       | `20`     |
    /// | `AUTOPLAY_MODE`            | `strict` |
    /// | `SUPPRESS_UNCHANGED_HOLDS` | `true`   |
    /// | `REORDER_PLAN_TTL_SECS`    | `600`    |
    /// | `EVENT_BUS_CAPACITY`       | `1024`   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());

        let db_max_connections =
            parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?;
        if db_max_connections == 0 {
            return Err(CoreError::Validation(
                "DB_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        let autoplay_mode = match lookup("AUTOPLAY_MODE") {
            Some(raw) => EligibilityMode::from_str_value(&raw)?,
            None => defaults.autoplay_mode,
        };

        let suppress_unchanged_holds = match lookup("SUPPRESS_UNCHANGED_HOLDS") {
            Some(raw) => parse_bool("SUPPRESS_UNCHANGED_HOLDS", &raw)?,
            None => defaults.suppress_unchanged_holds,
        };

        let plan_ttl = Duration::from_secs(parse_or(
            &lookup,
            "REORDER_PLAN_TTL_SECS",
            DEFAULT_PLAN_TTL_SECS,
        )?);

        let event_bus_capacity =
            parse_or(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity)?;
        if event_bus_capacity == 0 {
            return Err(CoreError::Validation(
                "EVENT_BUS_CAPACITY must be at least 1".into(),
            ));
        }

        Ok(Self {
            database_url,
            db_max_connections,
            autoplay_mode,
            suppress_unchanged_holds,
            plan_ttl,
            event_bus_capacity,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} has invalid value '{raw}', expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<EngineConfig, CoreError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.autoplay_mode, EligibilityMode::Strict);
        assert!(config.suppress_unchanged_holds);
        assert_eq!(config.plan_ttl, Duration::from_secs(600));
        assert_eq!(config.event_bus_capacity, 1024);
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/karaoke"),
            ("AUTOPLAY_MODE", "Simplified"),
            ("SUPPRESS_UNCHANGED_HOLDS", "off"),
            ("REORDER_PLAN_TTL_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/karaoke")
        );
        assert_eq!(config.autoplay_mode, EligibilityMode::Simplified);
        assert!(!config.suppress_unchanged_holds);
        assert_eq!(config.plan_ttl, Duration::from_secs(30));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(from_pairs(&[("AUTOPLAY_MODE", "lenient")]).is_err());
        assert!(from_pairs(&[("DB_MAX_CONNECTIONS", "many")]).is_err());
        assert!(from_pairs(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(from_pairs(&[("SUPPRESS_UNCHANGED_HOLDS", "maybe")]).is_err());
    }
}
