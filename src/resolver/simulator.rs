use crate::error::Result;
use crate::index::{VersionIndex, VersionIndexEntry};
use crate::model::{Dependency, LockedGraph, root_name};
use crate::specs::{Version, VersionRequirement};
use serde::{Deserialize, Serialize};

/// Which manifest requirements may move while simulating an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMode {
    /// Bounds in the target's own manifest requirements are relaxed and rewritten
    /// afterwards; `!=`, `>` and `>=` still hold.
    #[default]
    Own,
    /// Every manifest requirement, the target's included, must keep holding.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub version: Version,
    pub satisfiable: bool,
}

/// Checks whether moving a single pod to another version keeps the locked
/// graph consistent, with every other pod held at its locked version.
pub struct ResolutionSimulator<'a> {
    graph: &'a LockedGraph,
    manifest: &'a [Dependency],
    unlock: UnlockMode,
}

impl<'a> ResolutionSimulator<'a> {
    pub fn new(graph: &'a LockedGraph, manifest: &'a [Dependency], unlock: UnlockMode) -> Self {
        Self {
            graph,
            manifest,
            unlock,
        }
    }

    pub fn resolves(
        &self,
        index: &mut VersionIndex,
        target: &Dependency,
        version: &Version,
    ) -> Result<bool> {
        Ok(self.simulate(index, target, version)?.satisfiable)
    }

    pub fn simulate(
        &self,
        index: &mut VersionIndex,
        target: &Dependency,
        version: &Version,
    ) -> Result<ResolutionOutcome> {
        let entry = index.entry(&target.name, &target.source, version)?;
        Ok(ResolutionOutcome {
            version: version.clone(),
            satisfiable: self.check(&target.name, &entry)?,
        })
    }

    /// Evaluates the hypothesis "`target` is at `entry.version`" against
    /// manifest requirements, the declared constraints of every other locked
    /// pod, and the constraints `entry` itself declares.
    pub fn check(&self, target: &str, entry: &VersionIndexEntry) -> Result<bool> {
        let target = root_name(target);
        let assignment = |name: &str| -> Option<&Version> {
            if root_name(name) == target {
                Some(&entry.version)
            } else {
                self.graph.version_of(name)
            }
        };

        for dependency in self.manifest {
            // an unlocked target keeps its exclusions and floors
            let relaxed = self.unlock == UnlockMode::Own && root_name(&dependency.name) == target;
            let Some(version) = assignment(&dependency.name) else {
                continue;
            };
            for requirement in &dependency.requirements {
                let parsed = VersionRequirement::parse_optional(requirement.requirement.as_deref())?;
                let holds = parsed
                    .constraints()
                    .iter()
                    .filter(|constraint| !(relaxed && constraint.operator.limits_upgrades()))
                    .all(|constraint| constraint.satisfied_by(version));
                if !holds {
                    tracing::debug!(
                        "{} {} rejected: {} requires {} ({})",
                        target,
                        entry.version,
                        requirement.file,
                        dependency.name,
                        parsed
                    );
                    return Ok(false);
                }
            }
        }

        for (name, pod) in self.graph.iter() {
            if name == target {
                continue;
            }
            for constraint in &pod.dependencies {
                let Some(version) = assignment(&constraint.name) else {
                    continue;
                };
                let parsed = VersionRequirement::parse_optional(constraint.requirement.as_deref())?;
                if !parsed.satisfied_by(version) {
                    tracing::debug!(
                        "{} {} rejected: {} {} requires {} ({})",
                        target,
                        entry.version,
                        name,
                        pod.version,
                        constraint.name,
                        parsed
                    );
                    return Ok(false);
                }
            }
        }

        for constraint in &entry.declared_constraints {
            if root_name(&constraint.name) == target {
                continue;
            }
            // pods outside the locked graph would be resolved fresh
            let Some(version) = self.graph.version_of(&constraint.name) else {
                continue;
            };
            let parsed = VersionRequirement::parse_optional(constraint.requirement.as_deref())?;
            if !parsed.satisfied_by(version) {
                tracing::debug!(
                    "{} {} rejected: it requires {} ({}) but {} is locked",
                    target,
                    entry.version,
                    constraint.name,
                    parsed,
                    version
                );
                return Ok(false);
            }
        }

        tracing::trace!("{} {} resolves", target, entry.version);
        Ok(true)
    }
}
