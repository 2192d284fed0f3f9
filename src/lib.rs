//! Update resolution for CocoaPods projects.
//!
//! Given a `Podfile`, its `Podfile.lock` and one or more spec registries,
//! [`resolver::UpdateChecker`] answers three questions about a pod: the newest
//! published version, the newest version the locked graph can move to, and
//! how the `Podfile` requirements must change to admit it.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod project;
pub mod resolver;
pub mod specs;
pub mod utils;

pub use error::{PodupError, Result};
