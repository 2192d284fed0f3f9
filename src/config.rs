use crate::error::{PodupError, Result};
use crate::index::{DiskListingStore, ListingStore, MemoryListingStore, TransportSettings};
use crate::resolver::{IgnoredVersions, ResolverOptions, UnlockMode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILE: &str = "podup.toml";
pub const GITHUB_TOKEN_ENV: &str = "PODUP_GITHUB_TOKEN";

/// Settings read from `podup.toml`. Command line flags are applied on top by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PodupConfig {
    pub cache_dir: Option<PathBuf>,
    pub cache_max_age_secs: u64,
    pub allow_prerelease: bool,
    pub unlock: UnlockMode,
    pub ignored_versions: Vec<String>,
    pub jobs: Option<usize>,
    pub github_token: Option<String>,
    pub timeout_secs: u64,
    /// Registry name to URL, for `source` names that are not URLs.
    pub registries: BTreeMap<String, String>,
}

impl Default for PodupConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_max_age_secs: 300,
            allow_prerelease: false,
            unlock: UnlockMode::Own,
            ignored_versions: Vec::new(),
            jobs: None,
            github_token: None,
            timeout_secs: 30,
            registries: BTreeMap::new(),
        }
    }
}

impl PodupConfig {
    /// Loads `explicit` if given (it must exist), otherwise `podup.toml` in the
    /// project directory if present, otherwise defaults.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(PodupError::Config(format!(
                        "Config file '{}' not found",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => Some(project_dir.join(CONFIG_FILE)).filter(|p| p.is_file()),
        };

        let mut config = match path {
            Some(path) => {
                tracing::debug!("Reading configuration from {}", path.display());
                Self::from_toml(&fs::read_to_string(&path)?)?
            }
            None => Self::default(),
        };

        if config.github_token.is_none() {
            config.github_token = std::env::var(GITHUB_TOKEN_ENV)
                .ok()
                .filter(|token| !token.trim().is_empty());
        }

        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.jobs == Some(0) {
            return Err(PodupError::Config("jobs must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn resolver_options(&self) -> Result<ResolverOptions> {
        let ignored_versions = self
            .ignored_versions
            .iter()
            .map(|entry| entry.parse::<IgnoredVersions>())
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolverOptions {
            unlock: self.unlock,
            allow_prerelease: self.allow_prerelease,
            ignored_versions,
        })
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            github_token: self.github_token.clone(),
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn listing_store(&self, no_cache: bool) -> Arc<dyn ListingStore> {
        if no_cache {
            return Arc::new(MemoryListingStore::new());
        }
        let root = self
            .cache_dir
            .clone()
            .unwrap_or_else(DiskListingStore::default_location);
        Arc::new(DiskListingStore::new(root))
    }
}
