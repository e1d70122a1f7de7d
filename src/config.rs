//! Engine configuration
//!
//! Target allocation and rebalancing thresholds, loaded from a TOML file:
//!
//! ```toml
//! [targets]
//! stock = 60
//! fii = 20
//!
//! [policy]
//! dead_band = 0.02
//! ```
//!
//! Asset classes are validated here so the math never sees an unknown one.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{ConfigError, Result};
use crate::ledger::{AssetType, EPSILON};
use crate::portfolio::RebalancePolicy;

/// Validated target allocation: asset class -> percentage (0 to 100)
///
/// The percentages are not required to add up to 100; see [`AllocationTarget::warnings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationTarget {
    targets: BTreeMap<AssetType, Decimal>,
}

impl AllocationTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `(asset class, percentage)` pairs
    pub fn from_pairs<I, K>(pairs: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: AsRef<str>,
    {
        let mut target = Self::new();
        for (name, percent) in pairs {
            let name = name.as_ref();
            let asset_type = AssetType::from_str(name)
                .map_err(|_| ConfigError::UnknownAssetClass(name.to_string()))?;
            target.set(asset_type, percent)?;
        }
        Ok(target)
    }

    pub fn set(&mut self, asset_type: AssetType, percent: Decimal) -> std::result::Result<(), ConfigError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(ConfigError::TargetOutOfRange {
                asset_type,
                value: percent,
            });
        }
        self.targets.insert(asset_type, percent);
        Ok(())
    }

    pub fn get(&self, asset_type: AssetType) -> Option<Decimal> {
        self.targets.get(&asset_type).copied()
    }

    /// Targets in asset-class enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (AssetType, Decimal)> + '_ {
        self.targets.iter().map(|(k, v)| (*k, *v))
    }

    pub fn total(&self) -> Decimal {
        self.targets.values().copied().sum()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Non-fatal problems worth showing next to rebalancing results
    pub fn warnings(&self) -> Vec<ConfigurationWarning> {
        let sum = self.total();
        if !self.is_empty() && (sum - Decimal::ONE_HUNDRED).abs() > EPSILON {
            vec![ConfigurationWarning::TargetSumMismatch { sum }]
        } else {
            Vec::new()
        }
    }
}

/// Configuration issue that does not stop computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationWarning {
    TargetSumMismatch { sum: Decimal },
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationWarning::TargetSumMismatch { sum } => {
                write!(f, "target allocation adds up to {}%, not 100%", sum.normalize())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    targets: BTreeMap<String, Decimal>,
    #[serde(default)]
    policy: RawPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicy {
    dead_band: Option<Decimal>,
    high_priority: Option<Decimal>,
    medium_priority: Option<Decimal>,
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub targets: AllocationTarget,
    pub policy: RebalancePolicy,
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let targets = AllocationTarget::from_pairs(raw.targets)?;

        let defaults = RebalancePolicy::default();
        let policy = RebalancePolicy {
            dead_band: raw.policy.dead_band.unwrap_or(defaults.dead_band),
            high_priority: raw.policy.high_priority.unwrap_or(defaults.high_priority),
            medium_priority: raw.policy.medium_priority.unwrap_or(defaults.medium_priority),
        };
        policy.validate()?;

        Ok(Self { targets, policy })
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {:?}", path))?;

        for warning in config.targets.warnings() {
            warn!("{}", warning);
        }
        info!(
            "Loaded {} allocation target(s) from {:?}",
            config.targets.len(),
            path
        );
        Ok(config)
    }

    /// Default config location (<config_home>/carteira/config.toml)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dir_spec::config_home()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("carteira").join("config.toml"))
    }

    /// Load the default config file, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}
