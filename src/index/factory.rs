use crate::error::{PodupError, Result};
use crate::index::SpecsTransport;
use crate::index::cdn::CdnTransport;
use crate::index::github::GitHubSpecsTransport;
use crate::index::local::LocalSpecsTransport;
use crate::model::{DEFAULT_REGISTRY, Source};
use reqwest::blocking::Client;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CDN_URL: &str = "https://cdn.cocoapods.org";

/// URLs that historically name the public registry.
const TRUNK_ALIASES: &[&str] = &[
    "https://github.com/CocoaPods/Specs",
    "https://github.com/cocoapods/specs",
    "https://cdn.cocoapods.org",
];

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub github_token: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            github_token: None,
        }
    }
}

/// Maps dependency sources to registry transports.
///
/// Transports are built once per registry and shared by every check that
/// runs against this factory.
#[derive(Default)]
pub struct RegistryFactory {
    aliases: BTreeMap<String, String>,
    settings: TransportSettings,
    transports: Mutex<HashMap<String, Arc<dyn SpecsTransport>>>,
}

impl RegistryFactory {
    pub fn new(aliases: BTreeMap<String, String>, settings: TransportSettings) -> Self {
        Self {
            aliases,
            settings,
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// Makes `transport` answer for its registry instead of a network client.
    pub fn register(&self, transport: Arc<dyn SpecsTransport>) {
        let key = canonical_registry_url(transport.registry());
        if let Ok(mut transports) = self.transports.lock() {
            transports.insert(key, transport);
        }
    }

    /// Canonical URL of the registry a source points at.
    pub fn registry_url(&self, source: &Source) -> Result<String> {
        let raw = match source {
            Source::Registry { url: Some(url), .. } => url.clone(),
            Source::Registry { name, url: None } if name == DEFAULT_REGISTRY => {
                DEFAULT_CDN_URL.to_string()
            }
            Source::Registry { name, url: None } => self
                .aliases
                .get(name)
                .cloned()
                .ok_or_else(|| PodupError::UnknownRegistry(name.clone()))?,
            other => {
                return Err(PodupError::Config(format!(
                    "{other} is not a registry source"
                )));
            }
        };

        let canonical = canonical_registry_url(&raw);
        if TRUNK_ALIASES
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(&canonical))
        {
            return Ok(DEFAULT_CDN_URL.to_string());
        }
        Ok(canonical)
    }

    pub fn transport_for(&self, source: &Source) -> Result<Arc<dyn SpecsTransport>> {
        let url = self.registry_url(source)?;

        let mut transports = self
            .transports
            .lock()
            .map_err(|_| PodupError::Config("registry table lock poisoned".to_string()))?;
        if let Some(existing) = transports.get(&url) {
            return Ok(Arc::clone(existing));
        }

        let transport = self.build_transport(&url)?;
        transports.insert(url, Arc::clone(&transport));
        Ok(transport)
    }

    /// Transports in the order they are searched: one for a registry, every
    /// listed registry for a [`Source::RegistrySearch`].
    pub fn transports_for(&self, source: &Source) -> Result<Vec<Arc<dyn SpecsTransport>>> {
        match source {
            Source::RegistrySearch { registries } if registries.is_empty() => Err(
                PodupError::Config("registry search without any registry".to_string()),
            ),
            Source::RegistrySearch { registries } => registries
                .iter()
                .map(|registry| self.transport_for(registry))
                .collect(),
            other => Ok(vec![self.transport_for(other)?]),
        }
    }

    fn build_transport(&self, url: &str) -> Result<Arc<dyn SpecsTransport>> {
        match Url::parse(url) {
            Ok(parsed) => {
                validate_registry_url(&parsed, url)?;
                if parsed.scheme() == "file" {
                    let path = parsed.to_file_path().map_err(|_| {
                        PodupError::Config(format!("Invalid file registry URL: {url}"))
                    })?;
                    return Ok(Arc::new(LocalSpecsTransport::new(path, url)));
                }

                let client = build_client(&self.settings)?;
                if parsed.host_str() == Some("github.com") {
                    tracing::debug!("Using GitHub spec repo transport for {}", url);
                    return Ok(Arc::new(GitHubSpecsTransport::new(
                        client,
                        &parsed,
                        self.settings.github_token.clone(),
                    )?));
                }

                tracing::debug!("Using CDN transport for {}", url);
                Ok(Arc::new(CdnTransport::new(client, url)))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Arc::new(LocalSpecsTransport::new(PathBuf::from(url), url)))
            }
            Err(_) => Err(PodupError::Config(format!("Invalid registry URL: {url}"))),
        }
    }
}

/// Trailing slashes and a `.git` suffix do not distinguish registries.
pub fn canonical_registry_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn validate_registry_url(parsed: &Url, raw: &str) -> Result<()> {
    match parsed.scheme() {
        "https" | "http" | "file" => Ok(()),
        scheme => Err(PodupError::Config(format!(
            "Unsupported registry scheme '{scheme}' in {raw}"
        ))),
    }
}

fn build_client(settings: &TransportSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.timeout)
        .user_agent(concat!("podup/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PodupError::Config(format!("Failed to build HTTP client: {e}")))
}
