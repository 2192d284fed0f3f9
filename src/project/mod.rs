pub mod lockfile;
pub mod podfile;

pub use lockfile::{ExternalSource, Lockfile, registry_source};
pub use podfile::{PodDeclaration, PodOptions, Podfile, PodfileParser};

use crate::error::{PodupError, Result};
use crate::model::{
    DeclaredConstraint, Dependency, DependencyFile, LockedGraph, PODFILE, PODFILE_LOCK,
    Requirement, Source, root_name,
};
use crate::specs::VersionRequirement;
use crate::utils::PathValidator;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A CocoaPods project: the Podfile, the optional lockfile, and the
/// dependencies derived from both.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: Option<PathBuf>,
    pub podfile: Podfile,
    pub lockfile: Option<Lockfile>,
    dependencies: Vec<Dependency>,
    graph: LockedGraph,
}

impl Project {
    /// Reads `Podfile` and, when present, `Podfile.lock` from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = PathValidator::validate_project_path(path)?;

        let podfile_path = PathValidator::project_file(&root, PODFILE)?.ok_or_else(|| {
            PodupError::ProjectValidation(format!("No {} found in '{}'", PODFILE, root.display()))
        })?;
        let podfile = DependencyFile::new(PODFILE, fs::read_to_string(&podfile_path)?);

        let lockfile = match PathValidator::project_file(&root, PODFILE_LOCK)? {
            Some(path) => Some(DependencyFile::new(PODFILE_LOCK, fs::read_to_string(path)?)),
            None => {
                tracing::info!("No {} in {}", PODFILE_LOCK, root.display());
                None
            }
        };

        let mut project = Self::from_files(&podfile, lockfile.as_ref())?;
        project.root = Some(root);
        Ok(project)
    }

    pub fn from_files(podfile: &DependencyFile, lockfile: Option<&DependencyFile>) -> Result<Self> {
        let podfile = PodfileParser::parse(&podfile.content)?;
        let lockfile = lockfile.map(|file| Lockfile::parse(&file.content)).transpose()?;
        let graph = lockfile
            .as_ref()
            .map(|lockfile| lockfile.graph.clone())
            .unwrap_or_default();

        let dependencies = collect_dependencies(&podfile, lockfile.as_ref(), &graph);
        tracing::debug!(
            "Project declares {} pod(s), {} locked",
            dependencies.len(),
            graph.len()
        );

        Ok(Self {
            root: None,
            podfile,
            lockfile,
            dependencies,
            graph,
        })
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        let root = root_name(name);
        self.dependencies.iter().find(|d| d.name == root)
    }

    /// Locked graph; empty without a lockfile.
    pub fn graph(&self) -> &LockedGraph {
        &self.graph
    }

    pub fn has_lockfile(&self) -> bool {
        self.lockfile.is_some()
    }
}

impl From<&PodOptions> for ExternalSource {
    fn from(options: &PodOptions) -> Self {
        ExternalSource {
            git: options.git.clone(),
            tag: options.tag.clone(),
            branch: options.branch.clone(),
            commit: options.commit.clone(),
            path: options.path.clone(),
            podspec: options.podspec.clone(),
        }
    }
}

/// Merges declarations by root pod, first declaration first.
fn collect_dependencies(
    podfile: &Podfile,
    lockfile: Option<&Lockfile>,
    graph: &LockedGraph,
) -> Vec<Dependency> {
    let mut order: Vec<String> = Vec::new();
    let mut declarations: HashMap<String, Vec<&PodDeclaration>> = HashMap::new();
    for declaration in &podfile.pods {
        let root = root_name(&declaration.name).to_string();
        if !declarations.contains_key(&root) {
            order.push(root.clone());
        }
        declarations.entry(root).or_default().push(declaration);
    }

    order
        .into_iter()
        .map(|name| {
            let declared = declarations.remove(&name).unwrap_or_default();
            let requirements = declared
                .iter()
                .map(|d| {
                    Requirement::new(d.requirement.as_deref(), PODFILE)
                        .with_groups(d.groups.iter().cloned())
                })
                .collect();

            let version = graph.version_of(&name).cloned();
            if let Some(lockfile) = lockfile {
                if version.is_none() {
                    tracing::warn!("{} is not in {}; run `pod install`", name, PODFILE_LOCK);
                }
                for declaration in &declared {
                    if let Some(recorded) = recorded_differently(declaration, lockfile) {
                        tracing::warn!(
                            "{} line {} asks for {} '{}' but {} recorded '{}'; run `pod install`",
                            PODFILE,
                            declaration.line,
                            declaration.name,
                            declaration.requirement.as_deref().unwrap_or("any version"),
                            PODFILE_LOCK,
                            recorded.requirement.as_deref().unwrap_or("any version")
                        );
                    }
                }
            }

            Dependency {
                source: resolve_source(&name, &declared, lockfile, &podfile.sources),
                name,
                version,
                requirements,
            }
        })
        .collect()
}

/// The lockfile `DEPENDENCIES` entry for a declaration whose requirement
/// changed since the lockfile was written. Spelling differences such as
/// `3.0` against `= 3.0.0` do not count.
fn recorded_differently<'l>(
    declaration: &PodDeclaration,
    lockfile: &'l Lockfile,
) -> Option<&'l DeclaredConstraint> {
    let recorded = lockfile
        .dependencies
        .iter()
        .find(|dependency| dependency.name == declaration.name)?;

    let normalised = |text: Option<&str>| {
        VersionRequirement::parse_optional(text).ok().map(|requirement| {
            requirement
                .constraints()
                .iter()
                .map(|c| (c.operator, c.version.clone()))
                .collect::<Vec<_>>()
        })
    };
    match (
        normalised(declaration.requirement.as_deref()),
        normalised(recorded.requirement.as_deref()),
    ) {
        (Some(declared), Some(locked)) if declared != locked => Some(recorded),
        _ => None,
    }
}

/// External pins win, then an inline `:source`, then the lockfile's spec
/// repo, then the Podfile `source` lines (searched in order when there are
/// several), then the default registry.
fn resolve_source(
    name: &str,
    declared: &[&PodDeclaration],
    lockfile: Option<&Lockfile>,
    podfile_sources: &[String],
) -> Source {
    if let Some(source) = lockfile
        .and_then(|lockfile| lockfile.external_sources.get(name))
        .and_then(ExternalSource::to_source)
    {
        return source;
    }

    if let Some(source) = declared
        .iter()
        .find_map(|d| ExternalSource::from(&d.options).to_source())
    {
        return source;
    }

    if let Some(url) = declared.iter().find_map(|d| d.options.source.as_deref()) {
        return registry_source(url);
    }

    if let Some(repo) = lockfile.and_then(|lockfile| lockfile.spec_repos.get(name)) {
        return registry_source(repo);
    }

    match podfile_sources {
        [] => Source::default_registry(),
        [only] => registry_source(only),
        several => Source::RegistrySearch {
            registries: several.iter().map(|url| registry_source(url)).collect(),
        },
    }
}
