use crate::error::{PodupError, Result};
use crate::index::podspec::{parse_podspec, shard_path};
use crate::index::{IndexUpdate, SpecsTransport};
use crate::model::DeclaredConstraint;
use crate::specs::Version;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads a spec repository checkout on disk.
pub struct LocalSpecsTransport {
    root: PathBuf,
    registry: String,
}

impl LocalSpecsTransport {
    pub fn new<P: AsRef<Path>>(root: P, registry: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            registry: registry.to_string(),
        }
    }

    fn pod_dir(&self, pod: &str) -> Option<PathBuf> {
        [
            self.root.join("Specs").join(shard_path(pod)).join(pod),
            self.root.join("Specs").join(pod),
            self.root.join(pod),
        ]
        .into_iter()
        .find(|candidate| candidate.is_dir())
    }

    fn ensure_root(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(PodupError::unreachable(
                &self.registry,
                format!("'{}' is not a directory", self.root.display()),
            ))
        }
    }
}

impl SpecsTransport for LocalSpecsTransport {
    fn registry(&self) -> &str {
        &self.registry
    }

    fn check_for_update(&self, pod: &str, _token: Option<&str>) -> Result<IndexUpdate> {
        self.ensure_root()?;

        let Some(dir) = self.pod_dir(pod) else {
            return Ok(IndexUpdate::Unknown);
        };
        tracing::debug!("Reading versions from {}", dir.display());

        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(IndexUpdate::Changed {
            versions,
            token: None,
        })
    }

    fn declared_constraints(
        &self,
        pod: &str,
        version: &Version,
    ) -> Result<Vec<DeclaredConstraint>> {
        self.ensure_root()?;

        let spec_path = self
            .pod_dir(pod)
            .map(|dir| dir.join(version.as_str()).join(format!("{pod}.podspec.json")));

        match spec_path {
            Some(path) if path.is_file() => parse_podspec(&fs::read_to_string(path)?),
            _ => {
                tracing::warn!("No podspec published for {} {} in {}", pod, version, self.registry);
                Ok(Vec::new())
            }
        }
    }
}
