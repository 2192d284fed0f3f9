use crate::model::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolvability {
    Resolvable,
    /// Explicitly pinned outside version semantics (git revision, local path).
    Unresolvable,
}

pub fn classify(source: &Source) -> Resolvability {
    match source {
        Source::Registry { .. } | Source::RegistrySearch { .. } => Resolvability::Resolvable,
        Source::SourceControl { .. } | Source::LocalPath { .. } => Resolvability::Unresolvable,
    }
}
