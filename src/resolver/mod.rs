pub mod classifier;
pub mod requirements;
pub mod simulator;
pub mod update_checker;

pub use classifier::{Resolvability, classify};
pub use requirements::update_requirements;
pub use simulator::{ResolutionOutcome, ResolutionSimulator, UnlockMode};
pub use update_checker::{IgnoredVersions, ResolverOptions, UpdateChecker, UpdateReport};
