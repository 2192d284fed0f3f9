use crate::error::{PodupError, Result};
use crate::model::{DEFAULT_REGISTRY, DeclaredConstraint, LockedGraph, LockedPod, Source, root_name};
use crate::specs::Version;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `Name (requirement)` as written throughout the lockfile.
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^\s(]+)\s*(?:\((.*)\))?\s*$").expect("entry pattern is valid")
});

#[derive(Debug, Deserialize)]
struct RawLockfile {
    #[serde(rename = "PODS", default)]
    pods: Vec<RawPod>,
    #[serde(rename = "DEPENDENCIES", default)]
    dependencies: Vec<String>,
    #[serde(rename = "SPEC REPOS", default)]
    spec_repos: BTreeMap<String, Vec<String>>,
    #[serde(rename = "EXTERNAL SOURCES", default)]
    external_sources: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
    #[serde(rename = "CHECKOUT OPTIONS", default)]
    checkout_options: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
    #[serde(rename = "COCOAPODS", default)]
    cocoapods: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPod {
    Plain(String),
    WithDependencies(BTreeMap<String, Vec<String>>),
}

/// Pinning options of a pod that does not come from a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalSource {
    pub git: Option<String>,
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub path: Option<String>,
    pub podspec: Option<String>,
}

impl ExternalSource {
    fn from_options(options: &BTreeMap<String, serde_yaml::Value>) -> Self {
        let get = |key: &str| {
            options
                .get(&format!(":{key}"))
                .or_else(|| options.get(key))
                .and_then(scalar)
        };
        Self {
            git: get("git"),
            tag: get("tag"),
            branch: get("branch"),
            commit: get("commit"),
            path: get("path"),
            podspec: get("podspec"),
        }
    }

    /// Later values (checkout options) pin more precisely than earlier ones.
    fn merge(&mut self, other: ExternalSource) {
        self.git = other.git.or(self.git.take());
        self.tag = other.tag.or(self.tag.take());
        self.branch = other.branch.or(self.branch.take());
        self.commit = other.commit.or(self.commit.take());
        self.path = other.path.or(self.path.take());
        self.podspec = other.podspec.or(self.podspec.take());
    }

    pub fn to_source(&self) -> Option<Source> {
        if let Some(url) = &self.git {
            let revision = self
                .commit
                .clone()
                .or_else(|| self.tag.clone())
                .or_else(|| self.branch.clone());
            return Some(Source::SourceControl {
                url: url.clone(),
                revision,
            });
        }
        self.path
            .as_ref()
            .or(self.podspec.as_ref())
            .map(|path| Source::LocalPath { path: path.clone() })
    }
}

/// Parsed `Podfile.lock`.
#[derive(Debug, Clone, Default)]
pub struct Lockfile {
    pub graph: LockedGraph,
    /// Top-level declarations recorded when the lockfile was written.
    pub dependencies: Vec<DeclaredConstraint>,
    /// Root pod name to the registry it was resolved from.
    pub spec_repos: BTreeMap<String, String>,
    pub external_sources: BTreeMap<String, ExternalSource>,
    pub cocoapods_version: Option<String>,
}

impl Lockfile {
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawLockfile = serde_yaml::from_str(content)
            .map_err(|e| PodupError::LockfileParsing(e.to_string()))?;

        let mut spec_repos = BTreeMap::new();
        for (repo, pods) in raw.spec_repos {
            for pod in pods {
                spec_repos.insert(root_name(&pod).to_string(), repo.clone());
            }
        }

        let mut external_sources: BTreeMap<String, ExternalSource> = BTreeMap::new();
        for (pod, options) in raw.external_sources.iter().chain(raw.checkout_options.iter()) {
            external_sources
                .entry(root_name(pod).to_string())
                .or_default()
                .merge(ExternalSource::from_options(options));
        }

        let mut lockfile = Lockfile {
            graph: LockedGraph::new(),
            dependencies: Vec::new(),
            spec_repos,
            external_sources,
            cocoapods_version: raw.cocoapods.as_ref().and_then(scalar),
        };

        for pod in &raw.pods {
            let (entry, declared) = match pod {
                RawPod::Plain(entry) => (entry.as_str(), &[][..]),
                RawPod::WithDependencies(map) => match map.iter().next() {
                    Some((entry, declared)) if map.len() == 1 => (entry.as_str(), declared.as_slice()),
                    _ => {
                        return Err(PodupError::LockfileParsing(
                            "PODS entries must map one pod to its dependencies".to_string(),
                        ));
                    }
                },
            };

            let (name, version) = parse_entry(entry)?;
            let version = version.ok_or_else(|| {
                PodupError::LockfileParsing(format!("'{name}' has no locked version"))
            })?;
            let version = Version::parse(&version)?;

            let dependencies = declared
                .iter()
                .map(|d| parse_entry(d).map(|(n, r)| DeclaredConstraint::new(n, r.as_deref())))
                .collect::<Result<Vec<_>>>()?;

            let source = lockfile.source_of(&name);
            lockfile.graph.insert(
                &name,
                LockedPod {
                    version,
                    source,
                    dependencies,
                },
            );
        }

        for entry in &raw.dependencies {
            let (name, requirement) = parse_entry(entry)?;
            // `(from `...`)` marks an external source, not a requirement
            let requirement = requirement.filter(|r| !r.trim_start().starts_with("from "));
            lockfile
                .dependencies
                .push(DeclaredConstraint::new(name, requirement.as_deref()));
        }

        Ok(lockfile)
    }

    /// Where the lockfile says `name` was resolved from; `None` when it
    /// records nothing about it.
    pub fn recorded_source(&self, name: &str) -> Option<Source> {
        let root = root_name(name);
        if let Some(source) = self
            .external_sources
            .get(root)
            .and_then(ExternalSource::to_source)
        {
            return Some(source);
        }
        self.spec_repos.get(root).map(|repo| registry_source(repo))
    }

    fn source_of(&self, name: &str) -> Source {
        self.recorded_source(name)
            .unwrap_or_else(Source::default_registry)
    }
}

/// A `SPEC REPOS` key or Podfile `source` as a registry source.
pub fn registry_source(repo: &str) -> Source {
    if repo == DEFAULT_REGISTRY {
        Source::default_registry()
    } else if repo.contains("://") || repo.starts_with('/') || repo.starts_with('.') {
        Source::Registry {
            name: repo.to_string(),
            url: Some(repo.to_string()),
        }
    } else {
        Source::Registry {
            name: repo.to_string(),
            url: None,
        }
    }
}

fn parse_entry(entry: &str) -> Result<(String, Option<String>)> {
    let caps = ENTRY_RE
        .captures(entry)
        .ok_or_else(|| PodupError::LockfileParsing(format!("Unreadable entry '{entry}'")))?;
    let requirement = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty());
    Ok((caps[1].to_string(), requirement))
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKFILE: &str = r#"
PODS:
  - Alamofire (3.0.1)
  - AlamofireImage (2.5.0):
    - Alamofire (~> 3.1)
  - Firebase/Core (4.0.0):
    - Firebase/Database
  - Firebase/Database (4.0.0)
  - Nimble (7.0.0)
  - Local (0.1.0)

DEPENDENCIES:
  - Alamofire (~> 3.0.0)
  - AlamofireImage
  - Firebase/Core
  - "Local (from `../Local`)"
  - Nimble (from `https://github.com/Quick/Nimble.git`, tag `v7.0.0`)

SPEC REPOS:
  https://github.com/cocoapods/specs.git:
    - Alamofire
    - AlamofireImage
  trunk:
    - Firebase

EXTERNAL SOURCES:
  Local:
    :path: "../Local"
  Nimble:
    :git: https://github.com/Quick/Nimble.git
    :tag: v7.0.0

CHECKOUT OPTIONS:
  Nimble:
    :git: https://github.com/Quick/Nimble.git
    :commit: 5c5b5b4e9ad5cb5e0aa7d7b4f2d3d0e4f0d1c6ab

PODFILE CHECKSUM: 5b5a8f3b2d0b0b6a6e2f1e0f7f3d5c6c6a1a2b3c

COCOAPODS: 1.2.1
"#;

    #[test]
    fn builds_the_locked_graph() {
        let lockfile = Lockfile::parse(LOCKFILE).unwrap();
        let graph = &lockfile.graph;

        assert_eq!(graph.len(), 5);
        assert_eq!(graph.version_of("Alamofire").unwrap().as_str(), "3.0.1");
        assert_eq!(
            graph.get("AlamofireImage").unwrap().dependencies,
            vec![DeclaredConstraint::new("Alamofire", Some("~> 3.1"))]
        );
        assert_eq!(graph.version_of("Firebase/Analytics").unwrap().as_str(), "4.0.0");
        assert_eq!(lockfile.cocoapods_version.as_deref(), Some("1.2.1"));
    }

    #[test]
    fn records_where_pods_came_from() {
        let lockfile = Lockfile::parse(LOCKFILE).unwrap();

        assert_eq!(
            lockfile.recorded_source("Alamofire"),
            Some(Source::Registry {
                name: "https://github.com/cocoapods/specs.git".into(),
                url: Some("https://github.com/cocoapods/specs.git".into()),
            })
        );
        assert_eq!(
            lockfile.recorded_source("Firebase/Core"),
            Some(Source::default_registry())
        );
        assert_eq!(
            lockfile.recorded_source("Nimble"),
            Some(Source::SourceControl {
                url: "https://github.com/Quick/Nimble.git".into(),
                revision: Some("5c5b5b4e9ad5cb5e0aa7d7b4f2d3d0e4f0d1c6ab".into()),
            })
        );
        assert_eq!(
            lockfile.recorded_source("Local"),
            Some(Source::LocalPath {
                path: "../Local".into()
            })
        );
        assert_eq!(lockfile.recorded_source("Unheard"), None);
    }

    #[test]
    fn external_declarations_carry_no_requirement() {
        let lockfile = Lockfile::parse(LOCKFILE).unwrap();
        let nimble = lockfile
            .dependencies
            .iter()
            .find(|d| d.name == "Nimble")
            .unwrap();
        assert_eq!(nimble.requirement, None);
        assert_eq!(
            lockfile.dependencies[0],
            DeclaredConstraint::new("Alamofire", Some("~> 3.0.0"))
        );
    }

    #[test]
    fn unlocked_pod_is_an_error() {
        let err = Lockfile::parse("PODS:\n  - Alamofire\n").unwrap_err();
        assert!(matches!(err, PodupError::LockfileParsing(_)));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(Lockfile::parse("PODS: [[[").is_err());
    }
}
