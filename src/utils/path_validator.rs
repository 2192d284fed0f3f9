use crate::error::{PodupError, Result};
use std::path::{Path, PathBuf};

const FORBIDDEN: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

/// Guards the directories and files a check is allowed to read.
pub struct PathValidator;

impl PathValidator {
    /// Canonicalises a project directory, refusing files and system directories.
    pub fn validate_project_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            PodupError::ProjectValidation(format!("Invalid path '{}': {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(PodupError::ProjectValidation(format!(
                "Path '{}' is not a directory",
                canonical.display()
            )));
        }

        if let Some(forbidden) = FORBIDDEN.iter().find(|forbidden| {
            let forbidden = Path::new(forbidden);
            canonical.starts_with(forbidden)
                || forbidden
                    .canonicalize()
                    .is_ok_and(|resolved| canonical.starts_with(resolved))
        }) {
            return Err(PodupError::ProjectValidation(format!(
                "Access to system directory '{forbidden}' is not allowed"
            )));
        }

        Ok(canonical)
    }

    /// Resolves `name` inside `project_dir`. `Ok(None)` when the file does not
    /// exist; an error when it resolves outside the project (e.g. through a
    /// symlink).
    pub fn project_file(project_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
        let candidate = project_dir.join(name);
        if !candidate.exists() {
            return Ok(None);
        }

        let resolved = candidate.canonicalize().map_err(|e| {
            PodupError::ProjectValidation(format!("Invalid file '{}': {e}", candidate.display()))
        })?;
        if !resolved.starts_with(project_dir) {
            return Err(PodupError::ProjectValidation(format!(
                "'{name}' resolves outside the project directory"
            )));
        }
        if !resolved.is_file() {
            return Err(PodupError::ProjectValidation(format!("'{name}' is not a file")));
        }

        Ok(Some(resolved))
    }
}
