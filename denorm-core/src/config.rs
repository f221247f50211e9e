//! Configuration types

use crate::{ConfigError, DenormError, DenormResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do when a relationship leads back to an entity that is still
/// being expanded in the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Emit a back-reference placeholder carrying the descriptor.
    #[default]
    BackReference,
    /// Fail the call with `CycleDetected`.
    Error,
}

impl FromStr for CyclePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back_reference" | "backreference" | "placeholder" => Ok(Self::BackReference),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::InvalidValue {
                field: "cycle_policy".to_string(),
                value: other.to_string(),
                reason: "expected back_reference or error".to_string(),
            }),
        }
    }
}

/// Denormalizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DenormConfig {
    pub cycle_policy: CyclePolicy,
    /// Omit collection members that are absent from storage and uncached
    /// instead of failing the whole collection.
    pub skip_missing_members: bool,
}

impl DenormConfig {
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn with_skip_missing_members(mut self, skip: bool) -> Self {
        self.skip_missing_members = skip;
        self
    }

    /// Parse a TOML document, e.g.
    ///
    /// ```toml
    /// cycle_policy = "error"
    /// skip_missing_members = true
    /// ```
    pub fn from_toml_str(source: &str) -> DenormResult<Self> {
        toml::from_str(source).map_err(|e| {
            DenormError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `DENORM_CYCLE_POLICY`: `back_reference` or `error` (default: back_reference)
    /// - `DENORM_SKIP_MISSING_MEMBERS`: `true` or `false` (default: false)
    pub fn from_env() -> DenormResult<Self> {
        let defaults = Self::default();

        let cycle_policy = match std::env::var("DENORM_CYCLE_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.cycle_policy,
        };

        let skip_missing_members = match std::env::var("DENORM_SKIP_MISSING_MEMBERS") {
            Ok(value) => value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                field: "skip_missing_members".to_string(),
                value,
                reason: "expected true or false".to_string(),
            })?,
            Err(_) => defaults.skip_missing_members,
        };

        Ok(Self {
            cycle_policy,
            skip_missing_members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DenormConfig::default();
        assert_eq!(config.cycle_policy, CyclePolicy::BackReference);
        assert!(!config.skip_missing_members);
    }

    #[test]
    fn test_from_toml_str() {
        let config = DenormConfig::from_toml_str(
            "cycle_policy = \"error\"\nskip_missing_members = true\n",
        )
        .unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::Error);
        assert!(config.skip_missing_members);
    }

    #[test]
    fn test_from_toml_str_partial_uses_defaults() {
        let config = DenormConfig::from_toml_str("skip_missing_members = true").unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::BackReference);
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_policy() {
        let err = DenormConfig::from_toml_str("cycle_policy = \"loop\"").unwrap_err();
        assert!(matches!(err, DenormError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_cycle_policy_from_str() {
        assert_eq!("error".parse::<CyclePolicy>().unwrap(), CyclePolicy::Error);
        assert_eq!(
            "Back_Reference".parse::<CyclePolicy>().unwrap(),
            CyclePolicy::BackReference
        );
        assert!("panic".parse::<CyclePolicy>().is_err());
    }

    #[test]
    fn test_builder() {
        let config = DenormConfig::default()
            .with_cycle_policy(CyclePolicy::Error)
            .with_skip_missing_members(true);
        assert_eq!(config.cycle_policy, CyclePolicy::Error);
        assert!(config.skip_missing_members);
    }
}
