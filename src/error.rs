use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodupError {
    #[error("No {lockfile}! Cannot determine the locked version of '{pod}' without it")]
    MissingLockfile { lockfile: String, pod: String },

    #[error("Registry '{registry}' is unreachable: {reason}")]
    RegistryUnreachable { registry: String, reason: String },

    #[error("Unknown registry '{0}': add it to [registries] in podup.toml")]
    UnknownRegistry(String),

    #[error("Invalid requirement '{requirement}': {reason}")]
    InvalidRequirement { requirement: String, reason: String },

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Podfile parsing failed: {0}")]
    ManifestParsing(String),

    #[error("Podfile.lock parsing failed: {0}")]
    LockfileParsing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{failed} of {total} update check(s) failed")]
    ChecksFailed { failed: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PodupError {
    pub fn missing_lockfile(pod: impl Into<String>) -> Self {
        PodupError::MissingLockfile {
            lockfile: crate::model::PODFILE_LOCK.to_string(),
            pod: pod.into(),
        }
    }

    pub fn unreachable(registry: impl Into<String>, reason: impl ToString) -> Self {
        PodupError::RegistryUnreachable {
            registry: registry.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_requirement(requirement: impl Into<String>, reason: impl Into<String>) -> Self {
        PodupError::InvalidRequirement {
            requirement: requirement.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PodupError>;
