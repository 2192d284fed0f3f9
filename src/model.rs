use crate::specs::Version;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of the default public registry.
pub const DEFAULT_REGISTRY: &str = "trunk";

pub const PODFILE: &str = "Podfile";
pub const PODFILE_LOCK: &str = "Podfile.lock";

/// Subspecs (`Firebase/Core`) are versioned together with their root pod.
pub fn root_name(name: &str) -> &str {
    name.split('/').next().unwrap_or(name).trim()
}

/// Where a pod comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    /// A spec registry. `url` is set for inline and URL-addressed registries;
    /// a bare name refers to the default registry or a configured alias.
    Registry { name: String, url: Option<String> },
    /// Pinned to a source-control revision, tag or branch.
    SourceControl { url: String, revision: Option<String> },
    LocalPath { path: String },
    /// Several registries searched in order, as a Podfile with more than one
    /// `source` line does. The first registry that lists the pod answers.
    RegistrySearch { registries: Vec<Source> },
}

impl Source {
    pub fn default_registry() -> Self {
        Source::Registry {
            name: DEFAULT_REGISTRY.to_string(),
            url: None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Registry { name, url: None } => write!(f, "registry {}", name),
            Source::Registry {
                name,
                url: Some(url),
            } => write!(f, "registry {} ({})", name, url),
            Source::SourceControl {
                url,
                revision: Some(revision),
            } => write!(f, "git {} @ {}", url, revision),
            Source::SourceControl { url, revision: None } => write!(f, "git {}", url),
            Source::LocalPath { path } => write!(f, "path {}", path),
            Source::RegistrySearch { registries } => {
                let names: Vec<String> = registries.iter().map(Source::to_string).collect();
                write!(f, "first of [{}]", names.join(", "))
            }
        }
    }
}

/// One declaration of a pod in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    /// Raw constraint text such as `~> 3.0.0`; `None` when unconstrained.
    pub requirement: Option<String>,
    /// Manifest file that declared it.
    pub file: String,
    pub groups: BTreeSet<String>,
}

impl Requirement {
    pub fn new(requirement: Option<&str>, file: impl Into<String>) -> Self {
        Self {
            requirement: requirement
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            file: file.into(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// A pod declared in the manifest, as seen at the time of the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    /// Locked version; absent when there is no lockfile entry.
    pub version: Option<Version>,
    pub requirements: Vec<Requirement>,
    pub source: Source,
}

/// A constraint that one pod places on another (`AFNetworking/Core (= 3.1.0)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredConstraint {
    pub name: String,
    pub requirement: Option<String>,
}

impl DeclaredConstraint {
    pub fn new(name: impl Into<String>, requirement: Option<&str>) -> Self {
        Self {
            name: name.into(),
            requirement: requirement
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPod {
    pub version: Version,
    pub source: Source,
    /// Constraints the locked version declares on other pods.
    pub dependencies: Vec<DeclaredConstraint>,
}

/// Resolved versions recorded by the lockfile, keyed by root pod name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedGraph {
    pods: BTreeMap<String, LockedPod>,
}

impl LockedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pod. Subspec entries merge into their root: the root keeps
    /// the first version seen and accumulates declared constraints.
    pub fn insert(&mut self, name: &str, pod: LockedPod) {
        let root = root_name(name).to_string();
        match self.pods.get_mut(&root) {
            Some(existing) => {
                for constraint in pod.dependencies {
                    if !existing.dependencies.contains(&constraint) {
                        existing.dependencies.push(constraint);
                    }
                }
            }
            None => {
                self.pods.insert(root, pod);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&LockedPod> {
        self.pods.get(root_name(name))
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.get(name).map(|pod| &pod.version)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pods.contains_key(root_name(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LockedPod)> {
        self.pods.iter()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

/// Raw manifest or lockfile text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFile {
    pub name: String,
    pub content: String,
}

impl DependencyFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}
