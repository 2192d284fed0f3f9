use crate::error::Result;
use jiff::Timestamp;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// A version listing remembered between checks together with the cache token
/// (ETag) that lets a registry answer "not modified".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredListing {
    pub versions: Vec<String>,
    pub token: Option<String>,
    pub fetched_at: Timestamp,
}

impl StoredListing {
    pub fn new(versions: Vec<String>, token: Option<String>) -> Self {
        Self {
            versions,
            token,
            fetched_at: Timestamp::now(),
        }
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        let age = Timestamp::now().duration_since(self.fetched_at);
        age.as_secs() >= 0 && (age.as_secs() as u64) < max_age.as_secs()
    }
}

/// Persistence for version listings, keyed by registry and pod.
pub trait ListingStore: Send + Sync {
    fn load(&self, registry: &str, pod: &str) -> Option<StoredListing>;

    fn save(&self, registry: &str, pod: &str, listing: &StoredListing) -> Result<()>;
}

/// Stores each listing as a JSON file named after a hash of its key.
pub struct DiskListingStore {
    root: PathBuf,
}

impl DiskListingStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `$XDG_CACHE_HOME/podup/listings`, falling back to the temp dir.
    pub fn default_location() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("podup")
            .join("listings")
    }

    fn path_for(&self, registry: &str, pod: &str) -> PathBuf {
        let digest = Md5::digest(format!("{registry}\n{pod}").as_bytes());
        self.root.join(format!("{:x}.json", digest))
    }
}

impl ListingStore for DiskListingStore {
    fn load(&self, registry: &str, pod: &str) -> Option<StoredListing> {
        let path = self.path_for(registry, pod);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(listing) => Some(listing),
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save(&self, registry: &str, pod: &str, listing: &StoredListing) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(registry, pod);
        fs::write(path, serde_json::to_vec(listing)?)?;
        Ok(())
    }
}

/// Keeps listings for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryListingStore {
    listings: Mutex<HashMap<(String, String), StoredListing>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListingStore for MemoryListingStore {
    fn load(&self, registry: &str, pod: &str) -> Option<StoredListing> {
        let listings = self.listings.lock().ok()?;
        listings
            .get(&(registry.to_string(), pod.to_string()))
            .cloned()
    }

    fn save(&self, registry: &str, pod: &str, listing: &StoredListing) -> Result<()> {
        if let Ok(mut listings) = self.listings.lock() {
            listings.insert((registry.to_string(), pod.to_string()), listing.clone());
        }
        Ok(())
    }
}
