use crate::error::{PodupError, Result};
use crate::model::{DeclaredConstraint, Source, root_name};
use crate::specs::{Version, VersionComparator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod cdn;
pub mod factory;
pub mod github;
pub mod local;
pub mod podspec;
pub mod store;

pub use factory::{RegistryFactory, TransportSettings};
pub use store::{DiskListingStore, ListingStore, MemoryListingStore, StoredListing};

/// Answer of a conditional listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    /// The registry confirmed the listing behind the supplied token is current.
    Unchanged,
    Changed {
        versions: Vec<String>,
        token: Option<String>,
    },
    /// The registry was reached but does not know the pod.
    Unknown,
}

/// Transport to a single spec registry.
pub trait SpecsTransport: Send + Sync {
    /// Canonical registry identifier, used as the cache key.
    fn registry(&self) -> &str;

    /// Lists the published versions of `pod`. With a token from a previous
    /// answer the registry may reply [`IndexUpdate::Unchanged`].
    fn check_for_update(&self, pod: &str, token: Option<&str>) -> Result<IndexUpdate>;

    /// Constraints that `pod` at `version` places on other pods.
    fn declared_constraints(&self, pod: &str, version: &Version)
    -> Result<Vec<DeclaredConstraint>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIndexEntry {
    pub version: Version,
    pub declared_constraints: Vec<DeclaredConstraint>,
}

/// Per-check view over the registries.
///
/// Listings are fetched once per (registry, pod) and declared constraints
/// once per (registry, pod, version); nothing here outlives the check.
pub struct VersionIndex {
    factory: Arc<RegistryFactory>,
    store: Arc<dyn ListingStore>,
    max_age: Duration,
    listings: HashMap<(String, String), Vec<Version>>,
    entries: HashMap<(String, String, Version), Vec<DeclaredConstraint>>,
}

impl VersionIndex {
    pub fn new(factory: Arc<RegistryFactory>, store: Arc<dyn ListingStore>) -> Self {
        Self {
            factory,
            store,
            max_age: Duration::ZERO,
            listings: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Stored listings younger than `max_age` are used without asking the registry.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Published versions of `name` in the registry behind `source`, newest first.
    ///
    /// A [`Source::RegistrySearch`] answers with the first registry that lists
    /// the pod.
    pub fn versions_for(&mut self, name: &str, source: &Source) -> Result<Vec<Version>> {
        let pod = root_name(name).to_string();
        let (_, versions) = self.serving(&pod, source)?;
        Ok(versions)
    }

    /// Index entry for one version, with its declared constraints fetched lazily.
    pub fn entry(
        &mut self,
        name: &str,
        source: &Source,
        version: &Version,
    ) -> Result<VersionIndexEntry> {
        let pod = root_name(name).to_string();
        let transport = match source {
            Source::RegistrySearch { .. } => self.serving(&pod, source)?.0,
            other => self.factory.transport_for(other)?,
        };
        let key = (
            transport.registry().to_string(),
            pod.clone(),
            version.clone(),
        );

        if let Some(constraints) = self.entries.get(&key) {
            return Ok(VersionIndexEntry {
                version: version.clone(),
                declared_constraints: constraints.clone(),
            });
        }

        let constraints = transport.declared_constraints(&pod, version)?;
        self.entries.insert(key, constraints.clone());

        Ok(VersionIndexEntry {
            version: version.clone(),
            declared_constraints: constraints,
        })
    }

    /// The registry that answers for `pod` along with its listing. Registries
    /// are asked in order until one lists the pod; when none does the first
    /// one answers with its empty listing.
    fn serving(
        &mut self,
        pod: &str,
        source: &Source,
    ) -> Result<(Arc<dyn SpecsTransport>, Vec<Version>)> {
        let mut fallback = None;
        for transport in self.factory.transports_for(source)? {
            let versions = self.listing(transport.as_ref(), pod)?;
            if !versions.is_empty() {
                return Ok((transport, versions));
            }
            if fallback.is_none() {
                fallback = Some((transport, versions));
            }
        }
        fallback.ok_or_else(|| PodupError::Config(format!("{source} names no registry")))
    }

    fn listing(&mut self, transport: &dyn SpecsTransport, pod: &str) -> Result<Vec<Version>> {
        let key = (transport.registry().to_string(), pod.to_string());
        if let Some(cached) = self.listings.get(&key) {
            return Ok(cached.clone());
        }

        let raw = self.fetch_listing(transport, pod)?;
        let ordered = VersionComparator::newest_first(&raw);
        tracing::debug!(
            "{} lists {} version(s) of {}",
            transport.registry(),
            ordered.len(),
            pod
        );

        self.listings.insert(key, ordered.clone());
        Ok(ordered)
    }

    fn fetch_listing(&self, transport: &dyn SpecsTransport, pod: &str) -> Result<Vec<String>> {
        let registry = transport.registry();
        let stored = self.store.load(registry, pod);

        if let Some(stored) = &stored {
            if stored.is_fresh(self.max_age) {
                tracing::debug!("Using fresh cached listing for {} from {}", pod, registry);
                return Ok(stored.versions.clone());
            }
        }

        let token = stored.as_ref().and_then(|s| s.token.as_deref());
        match transport.check_for_update(pod, token)? {
            IndexUpdate::Unchanged => match stored {
                Some(stored) => {
                    tracing::debug!("{} reports {} unchanged, reusing cached listing", registry, pod);
                    let refreshed = StoredListing::new(stored.versions, stored.token);
                    self.persist(registry, pod, &refreshed);
                    Ok(refreshed.versions)
                }
                None => {
                    tracing::warn!(
                        "{} answered 'not modified' for {} without a cached listing; retrying",
                        registry,
                        pod
                    );
                    match transport.check_for_update(pod, None)? {
                        IndexUpdate::Changed { versions, token } => {
                            self.persist(registry, pod, &StoredListing::new(versions.clone(), token));
                            Ok(versions)
                        }
                        IndexUpdate::Unknown => Ok(Vec::new()),
                        IndexUpdate::Unchanged => Err(PodupError::unreachable(
                            registry,
                            format!("registry keeps answering 'not modified' for {pod}"),
                        )),
                    }
                }
            },
            IndexUpdate::Changed { versions, token } => {
                self.persist(registry, pod, &StoredListing::new(versions.clone(), token));
                Ok(versions)
            }
            IndexUpdate::Unknown => {
                tracing::debug!("{} does not know {}", registry, pod);
                Ok(Vec::new())
            }
        }
    }

    fn persist(&self, registry: &str, pod: &str, listing: &StoredListing) {
        if let Err(e) = self.store.save(registry, pod, listing) {
            tracing::warn!("Failed to cache listing for {}: {}", pod, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticTransport;
    use super::*;
    use std::sync::atomic::Ordering;

    const PRIVATE: &str = "https://github.com/dependabot/Specs";

    fn factory(transports: Vec<Arc<StaticTransport>>) -> Arc<RegistryFactory> {
        let factory = RegistryFactory::default();
        for transport in transports {
            factory.register(transport);
        }
        Arc::new(factory)
    }

    fn private_source() -> Source {
        Source::Registry {
            name: "dependabot".into(),
            url: Some(PRIVATE.into()),
        }
    }

    #[test]
    fn lists_versions_newest_first_and_caches_per_check() {
        let trunk = Arc::new(
            StaticTransport::new(factory::DEFAULT_CDN_URL)
                .pod("Alamofire", "3.0.0", &[])
                .pod("Alamofire", "4.4.0", &[])
                .pod("Alamofire", "3.5.1", &[]),
        );
        let mut index = VersionIndex::new(
            factory(vec![trunk.clone()]),
            Arc::new(MemoryListingStore::new()),
        );

        let versions = index
            .versions_for("Alamofire", &Source::default_registry())
            .unwrap();
        let rendered: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(rendered, vec!["4.4.0", "3.5.1", "3.0.0"]);

        index
            .versions_for("Alamofire/Core", &Source::default_registry())
            .unwrap();
        assert_eq!(trunk.listing_queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registries_do_not_share_listings() {
        let trunk = Arc::new(StaticTransport::new(factory::DEFAULT_CDN_URL).pod(
            "Alamofire",
            "4.4.0",
            &[],
        ));
        let private = Arc::new(StaticTransport::new(PRIVATE).pod("Alamofire", "4.3.0", &[]));
        let mut index = VersionIndex::new(
            factory(vec![trunk, private]),
            Arc::new(MemoryListingStore::new()),
        );

        let public = index
            .versions_for("Alamofire", &Source::default_registry())
            .unwrap();
        let scoped = index.versions_for("Alamofire", &private_source()).unwrap();

        assert_eq!(public[0].as_str(), "4.4.0");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].as_str(), "4.3.0");
    }

    #[test]
    fn not_modified_reuses_stored_listing() {
        let store = Arc::new(MemoryListingStore::new());
        store
            .save(
                PRIVATE,
                "Alamofire",
                &StoredListing::new(vec!["4.3.0".into(), "3.0.0".into()], Some("etag-1".into())),
            )
            .unwrap();

        // the transport itself knows nothing; only the stored listing can answer
        let private = Arc::new(StaticTransport::new(PRIVATE).with_token("etag-1"));
        let mut index = VersionIndex::new(factory(vec![private.clone()]), store);

        let versions = index.versions_for("Alamofire", &private_source()).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(private.listing_queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fresh_listing_skips_the_registry() {
        let store = Arc::new(MemoryListingStore::new());
        store
            .save(PRIVATE, "Alamofire", &StoredListing::new(vec!["4.3.0".into()], None))
            .unwrap();
        let private = Arc::new(StaticTransport::new(PRIVATE));
        let mut index = VersionIndex::new(factory(vec![private.clone()]), store)
            .with_max_age(Duration::from_secs(600));

        let versions = index.versions_for("Alamofire", &private_source()).unwrap();
        assert_eq!(versions[0].as_str(), "4.3.0");
        assert_eq!(private.queries(), 0);
    }

    #[test]
    fn unknown_pod_is_an_empty_listing() {
        let trunk = Arc::new(StaticTransport::new(factory::DEFAULT_CDN_URL));
        let mut index =
            VersionIndex::new(factory(vec![trunk]), Arc::new(MemoryListingStore::new()));
        assert!(
            index
                .versions_for("NoSuchPod", &Source::default_registry())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn unreachable_registry_is_fatal() {
        let trunk = Arc::new(StaticTransport::new(factory::DEFAULT_CDN_URL).unreachable());
        let mut index =
            VersionIndex::new(factory(vec![trunk]), Arc::new(MemoryListingStore::new()));
        let err = index
            .versions_for("Alamofire", &Source::default_registry())
            .unwrap_err();
        assert!(matches!(err, PodupError::RegistryUnreachable { .. }));
    }

    fn search(first: Source) -> Source {
        Source::RegistrySearch {
            registries: vec![first, Source::default_registry()],
        }
    }

    #[test]
    fn registry_search_takes_first_registry_listing_the_pod() {
        let private = Arc::new(StaticTransport::new(PRIVATE).pod("Internal", "1.0.0", &[]));
        let trunk = Arc::new(StaticTransport::new(factory::DEFAULT_CDN_URL).pod(
            "Alamofire",
            "4.4.0",
            &[("Result", "~> 3.0")],
        ));
        let mut index = VersionIndex::new(
            factory(vec![private.clone(), trunk.clone()]),
            Arc::new(MemoryListingStore::new()),
        );
        let source = search(private_source());

        let versions = index.versions_for("Alamofire", &source).unwrap();
        assert_eq!(versions[0].as_str(), "4.4.0");
        let entry = index.entry("Alamofire", &source, &versions[0]).unwrap();
        assert_eq!(entry.declared_constraints.len(), 1);
        assert_eq!(trunk.spec_queries.load(Ordering::SeqCst), 1);
        assert_eq!(private.spec_queries.load(Ordering::SeqCst), 0);

        let internal = index.versions_for("Internal", &source).unwrap();
        assert_eq!(internal[0].as_str(), "1.0.0");
        // the first registry already answered, so trunk is never asked about Internal
        assert_eq!(trunk.listing_queries.load(Ordering::SeqCst), 1);

        assert!(index.versions_for("Nowhere", &source).unwrap().is_empty());
    }

    #[test]
    fn entries_are_fetched_once_per_version() {
        let trunk = Arc::new(StaticTransport::new(factory::DEFAULT_CDN_URL).pod(
            "Alamofire",
            "4.4.0",
            &[("Result", "~> 3.0")],
        ));
        let mut index = VersionIndex::new(
            factory(vec![trunk.clone()]),
            Arc::new(MemoryListingStore::new()),
        );
        let version = Version::parse("4.4.0").unwrap();

        let entry = index
            .entry("Alamofire", &Source::default_registry(), &version)
            .unwrap();
        index
            .entry("Alamofire", &Source::default_registry(), &version)
            .unwrap();

        assert_eq!(
            entry.declared_constraints,
            vec![DeclaredConstraint::new("Result", Some("~> 3.0"))]
        );
        assert_eq!(trunk.spec_queries.load(Ordering::SeqCst), 1);
    }
}
