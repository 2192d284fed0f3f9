pub mod requirement;
pub mod version;

pub use requirement::{Constraint, Operator, VersionRequirement};
pub use version::{Version, VersionComparator};
