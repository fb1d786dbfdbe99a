#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use claimguard_kernel_contracts::claim::{ClaimType, WorldId};
use claimguard_kernel_contracts::flag::FlagCatalog;
use claimguard_kernel_contracts::ContractViolation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Session defaults per claim type, `flag = bool`. Subdivisions read `basic`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultFlagsConfig {
    pub wilderness: BTreeMap<String, bool>,
    pub admin: BTreeMap<String, bool>,
    pub basic: BTreeMap<String, bool>,
}

impl DefaultFlagsConfig {
    pub fn for_claim_type(&self, claim_type: ClaimType) -> &BTreeMap<String, bool> {
        match claim_type {
            ClaimType::Wilderness => &self.wilderness,
            ClaimType::Admin => &self.admin,
            ClaimType::Basic | ClaimType::Subdivision => &self.basic,
        }
    }

    fn entries(&self) -> impl Iterator<Item = (ClaimType, &String)> {
        self.wilderness
            .keys()
            .map(|k| (ClaimType::Wilderness, k))
            .chain(self.admin.keys().map(|k| (ClaimType::Admin, k)))
            .chain(self.basic.keys().map(|k| (ClaimType::Basic, k)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimGuardConfig {
    #[serde(default = "default_flag_catalog")]
    pub flag_catalog: Vec<String>,
    #[serde(default)]
    pub default_flags: DefaultFlagsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Worlds registered (and seeded with defaults) at start.
    #[serde(default)]
    pub worlds: Vec<String>,
}

fn default_flag_catalog() -> Vec<String> {
    FlagCatalog::mvp_v1().names().map(str::to_string).collect()
}

impl ClaimGuardConfig {
    pub fn mvp_v1() -> Self {
        let protected = |allow: bool| -> BTreeMap<String, bool> {
            ["block-break", "block-place", "interact-inventory", "pvp"]
                .into_iter()
                .map(|flag| (flag.to_string(), allow))
                .collect()
        };
        Self {
            flag_catalog: default_flag_catalog(),
            default_flags: DefaultFlagsConfig {
                wilderness: protected(true),
                admin: protected(false),
                basic: protected(false),
            },
            logging: LoggingConfig::default(),
            worlds: vec!["overworld".to_string()],
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn flag_catalog(&self) -> Result<FlagCatalog, ConfigError> {
        Ok(FlagCatalog::from_names(self.flag_catalog.iter().cloned())?)
    }

    pub fn world_ids(&self) -> Result<Vec<WorldId>, ConfigError> {
        self.worlds
            .iter()
            .map(|w| WorldId::new(w.clone()).map_err(ConfigError::from))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let catalog = self.flag_catalog()?;
        for (claim_type, flag) in self.default_flags.entries() {
            if !catalog.contains(flag) {
                return Err(ConfigError::Validation(format!(
                    "default_flags.{claim_type} names '{flag}', which is not in flag_catalog"
                )));
            }
        }
        self.world_ids()?;
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClaimGuardConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}
