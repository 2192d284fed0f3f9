use crate::error::{PodupError, Result};
use crate::model::Requirement;
use crate::specs::{Constraint, Operator, Version, VersionRequirement};

/// Rewrites the manifest requirements of `pod` so they admit the version an
/// update would move to.
///
/// One output per input, in the same order, with `file` and `groups` untouched.
/// The target is the lower of `latest_resolvable` and `latest`.
pub fn update_requirements(
    pod: &str,
    requirements: &[Requirement],
    existing: Option<&Version>,
    latest: Option<&Version>,
    latest_resolvable: Option<&Version>,
) -> Result<Vec<Requirement>> {
    if existing.is_none() {
        return Err(PodupError::missing_lockfile(pod));
    }

    let Some(resolvable) = latest_resolvable else {
        return Ok(requirements.to_vec());
    };
    let target = match latest {
        Some(latest) if latest < resolvable => latest,
        _ => resolvable,
    };

    requirements
        .iter()
        .map(|requirement| {
            let Some(text) = requirement.requirement.as_deref() else {
                return Ok(requirement.clone());
            };
            let rewritten = rewrite(text, target)?;
            Ok(Requirement {
                requirement: Some(rewritten),
                ..requirement.clone()
            })
        })
        .collect()
}

fn rewrite(text: &str, target: &Version) -> Result<String> {
    let parsed = VersionRequirement::parse(text)?;
    let mut changed = false;

    if let Some(blocking) = parsed
        .constraints()
        .iter()
        .find(|c| !c.operator.limits_upgrades() && !c.satisfied_by(target))
    {
        tracing::warn!("'{}' rules out {} and is left as written", blocking, target);
    }

    let parts: Vec<String> = parsed
        .constraints()
        .iter()
        .map(|constraint| match rewrite_constraint(constraint, target) {
            Some(updated) => {
                changed = true;
                updated
            }
            None => constraint.to_string(),
        })
        .collect();

    // untouched requirements keep their original spelling
    if changed {
        Ok(parts.join(", "))
    } else {
        Ok(text.to_string())
    }
}

/// `None` when the constraint already admits `target` the way it is written.
fn rewrite_constraint(constraint: &Constraint, target: &Version) -> Option<String> {
    let precision = constraint.precision();
    let value = match constraint.operator {
        Operator::Pessimistic => {
            if &constraint.version >= target {
                return None;
            }
            let value = target.to_precision(precision);
            if value == constraint.version.as_str() {
                return None;
            }
            value
        }
        Operator::Exact => {
            if &constraint.version >= target {
                return None;
            }
            target.as_str().to_string()
        }
        Operator::Greater | Operator::GreaterOrEqual | Operator::NotEqual => return None,
        Operator::LessOrEqual => {
            if constraint.satisfied_by(target) {
                return None;
            }
            target.to_precision(precision)
        }
        Operator::Less => {
            if constraint.satisfied_by(target) {
                return None;
            }
            // no representable bound above the target
            target.bump_at_precision(precision)?
        }
    };

    tracing::trace!("Rewriting '{}' to admit {}", constraint, target);
    Some(constraint.render_with(&value))
}
