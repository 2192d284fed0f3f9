use crate::error::{PodupError, Result};
use crate::index::VersionIndex;
use crate::model::{Dependency, LockedGraph, Requirement, Source, root_name};
use crate::resolver::classifier::{Resolvability, classify};
use crate::resolver::requirements::update_requirements;
use crate::resolver::simulator::{ResolutionSimulator, UnlockMode};
use crate::specs::{Version, VersionComparator, VersionRequirement};
use serde::Serialize;
use std::str::FromStr;

/// Versions of one pod that must never be proposed, e.g. `Alamofire: >= 5.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredVersions {
    pub pod: String,
    pub requirement: VersionRequirement,
}

impl IgnoredVersions {
    pub fn matches(&self, pod: &str, version: &Version) -> bool {
        root_name(&self.pod) == root_name(pod) && self.requirement.satisfied_by(version)
    }
}

impl FromStr for IgnoredVersions {
    type Err = PodupError;

    fn from_str(entry: &str) -> Result<Self> {
        let (pod, requirement) = entry.split_once(':').ok_or_else(|| {
            PodupError::Config(format!(
                "Ignored versions entry '{entry}' must look like '<pod>: <requirement>'"
            ))
        })?;
        let pod = pod.trim();
        if pod.is_empty() {
            return Err(PodupError::Config(format!(
                "Ignored versions entry '{entry}' has no pod name"
            )));
        }

        let requirement = VersionRequirement::parse(requirement)?;
        if requirement.is_unconstrained() {
            return Err(PodupError::Config(format!(
                "Ignored versions entry '{entry}' has no requirement"
            )));
        }

        Ok(Self {
            pod: pod.to_string(),
            requirement,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    pub unlock: UnlockMode,
    pub allow_prerelease: bool,
    pub ignored_versions: Vec<IgnoredVersions>,
}

/// Outcome of checking one dependency, as printed by `podup check`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub name: String,
    pub source: Source,
    pub current: Option<Version>,
    pub latest: Option<Version>,
    pub latest_resolvable: Option<Version>,
    pub can_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_requirements: Option<Vec<Requirement>>,
}

/// Answers update questions for a single dependency.
///
/// Each checker owns its [`VersionIndex`], so listings and specs are fetched
/// at most once per check. Answers are memoized.
pub struct UpdateChecker<'a> {
    dependency: &'a Dependency,
    manifest: &'a [Dependency],
    graph: &'a LockedGraph,
    options: &'a ResolverOptions,
    index: VersionIndex,
    latest: Option<Option<Version>>,
    latest_resolvable: Option<Option<Version>>,
}

impl<'a> UpdateChecker<'a> {
    pub fn new(
        dependency: &'a Dependency,
        manifest: &'a [Dependency],
        graph: &'a LockedGraph,
        options: &'a ResolverOptions,
        index: VersionIndex,
    ) -> Self {
        Self {
            dependency,
            manifest,
            graph,
            options,
            index,
            latest: None,
            latest_resolvable: None,
        }
    }

    pub fn dependency(&self) -> &Dependency {
        self.dependency
    }

    fn current(&self) -> Option<&'a Version> {
        self.dependency.version.as_ref()
    }

    fn is_resolvable(&self) -> bool {
        classify(&self.dependency.source) == Resolvability::Resolvable
    }

    fn acceptable(&self, candidate: &Version) -> bool {
        let prereleases_allowed = self.options.allow_prerelease
            || self.current().is_some_and(Version::is_prerelease);
        if candidate.is_prerelease() && !prereleases_allowed {
            return false;
        }

        !self
            .options
            .ignored_versions
            .iter()
            .any(|ignored| ignored.matches(&self.dependency.name, candidate))
    }

    /// Acceptable published versions, newest first.
    fn candidates(&mut self) -> Result<Vec<Version>> {
        let listed = self
            .index
            .versions_for(&self.dependency.name, &self.dependency.source)?;
        Ok(listed.into_iter().filter(|v| self.acceptable(v)).collect())
    }

    /// Newest acceptable version in the dependency's registry.
    pub fn latest_version(&mut self) -> Result<Option<Version>> {
        if let Some(cached) = &self.latest {
            return Ok(cached.clone());
        }

        let latest = if self.is_resolvable() {
            self.candidates()?.into_iter().next()
        } else {
            None
        };

        self.latest = Some(latest.clone());
        Ok(latest)
    }

    /// Newest version the dependency can move to while every other locked
    /// pod stays where it is.
    pub fn latest_resolvable_version(&mut self) -> Result<Option<Version>> {
        if let Some(cached) = &self.latest_resolvable {
            return Ok(cached.clone());
        }

        if !self.is_resolvable() {
            tracing::debug!(
                "{} comes from {}; not looking for updates",
                self.dependency.name,
                self.dependency.source
            );
            self.latest_resolvable = Some(None);
            return Ok(None);
        }

        let resolved = self.find_latest_resolvable()?;
        self.latest_resolvable = Some(resolved.clone());
        Ok(resolved)
    }

    fn find_latest_resolvable(&mut self) -> Result<Option<Version>> {
        let latest = self.latest_version()?;
        let Some(latest) = latest else {
            return Ok(None);
        };

        let current = self.current();
        let candidates: Vec<Version> = self
            .candidates()?
            .into_iter()
            .filter(|candidate| current.is_none_or(|current| candidate >= current))
            .collect();

        let simulator = ResolutionSimulator::new(self.graph, self.manifest, self.options.unlock);
        for candidate in candidates {
            if simulator.resolves(&mut self.index, self.dependency, &candidate)? {
                tracing::debug!("{} resolves at {}", self.dependency.name, candidate);
                return Ok(Some(candidate));
            }
        }

        // nothing newer fits: stay put, but never report above the newest listed
        Ok(current.filter(|current| *current <= &latest).cloned())
    }

    /// Manifest requirements rewritten to admit the resolvable version.
    pub fn updated_requirements(&mut self) -> Result<Vec<Requirement>> {
        let Some(existing) = self.current() else {
            return Err(PodupError::missing_lockfile(&self.dependency.name));
        };

        let latest = self.latest_version()?;
        let latest_resolvable = self.latest_resolvable_version()?;
        update_requirements(
            &self.dependency.name,
            &self.dependency.requirements,
            Some(existing),
            latest.as_ref(),
            latest_resolvable.as_ref(),
        )
    }

    pub fn can_update(&mut self) -> Result<bool> {
        let resolvable = self.latest_resolvable_version()?;
        Ok(match (resolvable, self.current()) {
            (Some(resolvable), Some(current)) => VersionComparator::is_newer(&resolvable, current),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Runs every question once and collects the answers.
    pub fn report(&mut self) -> Result<UpdateReport> {
        let latest = self.latest_version()?;
        let latest_resolvable = self.latest_resolvable_version()?;
        let can_update = self.can_update()?;
        let updated_requirements = if can_update && self.current().is_some() {
            Some(self.updated_requirements()?)
        } else {
            None
        };

        Ok(UpdateReport {
            name: self.dependency.name.clone(),
            source: self.dependency.source.clone(),
            current: self.current().cloned(),
            latest,
            latest_resolvable,
            can_update,
            updated_requirements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::factory::DEFAULT_CDN_URL;
    use crate::index::testing::StaticTransport;
    use crate::index::{MemoryListingStore, RegistryFactory};
    use crate::model::{DeclaredConstraint, LockedPod, PODFILE};
    use std::sync::Arc;

    const PRIVATE: &str = "https://github.com/dependabot/Specs";

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    fn index(transports: Vec<Arc<StaticTransport>>) -> VersionIndex {
        let factory = RegistryFactory::default();
        for transport in transports {
            factory.register(transport);
        }
        VersionIndex::new(Arc::new(factory), Arc::new(MemoryListingStore::new()))
    }

    fn dependency(name: &str, version: Option<&str>, requirement: Option<&str>, source: Source) -> Dependency {
        Dependency {
            name: name.to_string(),
            version: version.map(v),
            requirements: vec![Requirement::new(requirement, PODFILE)],
            source,
        }
    }

    fn locked(version: &str, deps: &[(&str, &str)]) -> LockedPod {
        LockedPod {
            version: v(version),
            source: Source::default_registry(),
            dependencies: deps
                .iter()
                .map(|(name, req)| DeclaredConstraint::new(*name, Some(*req)))
                .collect(),
        }
    }

    fn alamofire_trunk() -> StaticTransport {
        StaticTransport::new(DEFAULT_CDN_URL)
            .pod("Alamofire", "2.0.0", &[])
            .pod("Alamofire", "3.0.0", &[])
            .pod("Alamofire", "3.0.1", &[])
            .pod("Alamofire", "3.5.1", &[])
            .pod("Alamofire", "4.0.0", &[])
            .pod("Alamofire", "4.4.0", &[])
            .pod("Alamofire", "5.0.0-beta.1", &[])
    }

    fn single_pod_graph(name: &str, version: &str) -> LockedGraph {
        let mut graph = LockedGraph::new();
        graph.insert(name, locked(version, &[]));
        graph
    }

    #[test]
    fn picks_highest_satisfiable_version() {
        let trunk = Arc::new(alamofire_trunk());
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency(
            "Alamofire",
            Some("3.0.0"),
            Some("~> 3.0.0"),
            Source::default_registry(),
        )];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_version().unwrap(), Some(v("4.4.0")));
        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("4.4.0")));
        assert!(checker.can_update().unwrap());
        assert_eq!(
            checker.updated_requirements().unwrap()[0].requirement.as_deref(),
            Some("~> 4.4.0")
        );
    }

    #[test]
    fn sibling_conflict_holds_the_update_back() {
        let trunk = Arc::new(alamofire_trunk().pod("AlamofireImage", "2.5.0", &[("Alamofire", "~> 3.0")]));
        let mut graph = LockedGraph::new();
        graph.insert("Alamofire", locked("3.0.0", &[]));
        graph.insert("AlamofireImage", locked("2.5.0", &[("Alamofire", "~> 3.0")]));
        let manifest = vec![
            dependency("Alamofire", Some("3.0.0"), Some("~> 3.0"), Source::default_registry()),
            dependency("AlamofireImage", Some("2.5.0"), Some("~> 2.5"), Source::default_registry()),
        ];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("3.5.1")));
        assert!(checker.latest_version().unwrap().unwrap() >= v("4.4.0"));
        assert_eq!(
            checker.updated_requirements().unwrap()[0].requirement.as_deref(),
            Some("~> 3.5")
        );
    }

    #[test]
    fn private_registry_is_consulted_alone() {
        let trunk = Arc::new(alamofire_trunk());
        let private = Arc::new(
            StaticTransport::new(PRIVATE)
                .pod("Alamofire", "3.0.0", &[])
                .pod("Alamofire", "4.3.0", &[]),
        );
        let source = Source::Registry {
            name: "dependabot".into(),
            url: Some(format!("{PRIVATE}.git")),
        };
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency("Alamofire", Some("3.0.0"), Some("~> 3.0"), source)];
        let options = ResolverOptions::default();
        let mut checker = UpdateChecker::new(
            &manifest[0],
            &manifest,
            &graph,
            &options,
            index(vec![trunk.clone(), private]),
        );

        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("4.3.0")));
        assert_eq!(checker.latest_version().unwrap(), Some(v("4.3.0")));
        assert_eq!(trunk.queries(), 0);
    }

    #[test]
    fn pinned_sources_never_touch_the_network() {
        let trunk = Arc::new(alamofire_trunk());
        let pinned = [
            Source::SourceControl {
                url: "https://github.com/Alamofire/Alamofire.git".into(),
                revision: Some("4.3.0".into()),
            },
            Source::LocalPath {
                path: "../Alamofire".into(),
            },
        ];

        for source in pinned {
            let graph = single_pod_graph("Alamofire", "4.3.0");
            let manifest = vec![dependency("Alamofire", Some("4.3.0"), None, source)];
            let options = ResolverOptions::default();
            let mut checker = UpdateChecker::new(
                &manifest[0],
                &manifest,
                &graph,
                &options,
                index(vec![trunk.clone()]),
            );

            assert_eq!(checker.latest_version().unwrap(), None);
            assert_eq!(checker.latest_resolvable_version().unwrap(), None);
            assert!(!checker.can_update().unwrap());
        }
        assert_eq!(trunk.queries(), 0);
    }

    #[test]
    fn missing_lockfile_is_reported() {
        let trunk = Arc::new(alamofire_trunk());
        let graph = LockedGraph::new();
        let manifest = vec![dependency("Alamofire", None, Some("~> 3.0"), Source::default_registry())];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        let err = checker.updated_requirements().unwrap_err();
        assert!(matches!(err, PodupError::MissingLockfile { .. }));
        assert!(err.to_string().contains("Podfile.lock"));
    }

    #[test]
    fn resolvable_never_exceeds_latest() {
        let trunk = Arc::new(alamofire_trunk().pod("Alamofire", "9.9.9", &[("Result", "~> 9.0")]));
        let mut graph = single_pod_graph("Alamofire", "3.0.0");
        graph.insert("Result", locked("3.0.0", &[]));
        let manifest = vec![dependency("Alamofire", Some("3.0.0"), None, Source::default_registry())];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        let latest = checker.latest_version().unwrap().unwrap();
        let resolvable = checker.latest_resolvable_version().unwrap().unwrap();
        assert_eq!(latest, v("9.9.9"));
        assert_eq!(resolvable, v("4.4.0"));
        assert!(resolvable <= latest);
    }

    #[test]
    fn falls_back_to_the_current_version() {
        let trunk = Arc::new(alamofire_trunk());
        let mut graph = single_pod_graph("Alamofire", "4.4.0");
        graph.insert("AlamofireImage", locked("3.0.0", &[("Alamofire", "= 4.0.0")]));
        let manifest = vec![dependency("Alamofire", Some("4.4.0"), None, Source::default_registry())];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("4.4.0")));
        assert!(!checker.can_update().unwrap());
    }

    #[test]
    fn empty_listing_means_no_update() {
        let trunk = Arc::new(StaticTransport::new(DEFAULT_CDN_URL));
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency("Alamofire", Some("3.0.0"), None, Source::default_registry())];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_version().unwrap(), None);
        assert_eq!(checker.latest_resolvable_version().unwrap(), None);
    }

    #[test]
    fn prereleases_and_ignored_versions_are_skipped() {
        let trunk = Arc::new(alamofire_trunk());
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency("Alamofire", Some("3.0.0"), None, Source::default_registry())];

        let options = ResolverOptions {
            ignored_versions: vec!["Alamofire: >= 4.4".parse().unwrap()],
            ..ResolverOptions::default()
        };
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk.clone()]));
        assert_eq!(checker.latest_version().unwrap(), Some(v("4.0.0")));
        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("4.0.0")));

        let options = ResolverOptions {
            allow_prerelease: true,
            ..ResolverOptions::default()
        };
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));
        assert_eq!(checker.latest_version().unwrap(), Some(v("5.0.0-beta.1")));
    }

    #[test]
    fn locked_own_requirement_holds_with_no_unlock() {
        let trunk = Arc::new(alamofire_trunk());
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency(
            "Alamofire",
            Some("3.0.0"),
            Some("~> 3.0.0"),
            Source::default_registry(),
        )];
        let options = ResolverOptions {
            unlock: UnlockMode::None,
            ..ResolverOptions::default()
        };
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("3.0.1")));
    }

    #[test]
    fn excluded_versions_are_never_recommended() {
        let trunk = Arc::new(
            StaticTransport::new(DEFAULT_CDN_URL)
                .pod("Alamofire", "3.0.0", &[])
                .pod("Alamofire", "3.5.1", &[]),
        );
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency(
            "Alamofire",
            Some("3.0.0"),
            Some("~> 3.0, != 3.5.1"),
            Source::default_registry(),
        )];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));

        assert_eq!(checker.latest_resolvable_version().unwrap(), Some(v("3.0.0")));
        assert!(!checker.can_update().unwrap());
        assert_eq!(
            checker.updated_requirements().unwrap()[0].requirement.as_deref(),
            Some("~> 3.0, != 3.5.1")
        );

        let trunk = Arc::new(alamofire_trunk());
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk]));
        let resolvable = checker.latest_resolvable_version().unwrap().unwrap();
        let rewritten = checker.updated_requirements().unwrap()[0].requirement.clone().unwrap();

        assert_eq!(resolvable, v("4.4.0"));
        assert_eq!(rewritten, "~> 4.4, != 3.5.1");
        assert!(VersionRequirement::parse(&rewritten).unwrap().satisfied_by(&resolvable));
    }

    #[test]
    fn answers_are_memoized() {
        let trunk = Arc::new(alamofire_trunk());
        let graph = single_pod_graph("Alamofire", "3.0.0");
        let manifest = vec![dependency("Alamofire", Some("3.0.0"), None, Source::default_registry())];
        let options = ResolverOptions::default();
        let mut checker =
            UpdateChecker::new(&manifest[0], &manifest, &graph, &options, index(vec![trunk.clone()]));

        let report = checker.report().unwrap();
        checker.latest_resolvable_version().unwrap();
        checker.updated_requirements().unwrap();

        assert!(report.can_update);
        assert_eq!(trunk.queries(), 2);
    }

    #[test]
    fn ignored_entries_need_a_pod_and_requirement() {
        let parsed: IgnoredVersions = "Alamofire/Core: >= 5.0, < 6".parse().unwrap();
        assert!(parsed.matches("Alamofire", &v("5.1")));
        assert!(!parsed.matches("Alamofire", &v("6.0")));
        assert!(!parsed.matches("Moya", &v("5.1")));

        assert!("Alamofire".parse::<IgnoredVersions>().is_err());
        assert!(": >= 5".parse::<IgnoredVersions>().is_err());
        assert!("Alamofire:".parse::<IgnoredVersions>().is_err());
    }
}
