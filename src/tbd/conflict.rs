//! Consistency-conflict policies.
//!
//! When two load commands or two architectures disagree about a value that
//! must be unique (install name, platform, UUID, ...), the parser asks a
//! [`ConflictPolicy`] whether to go on. Continuing keeps the first-seen value.

use tracing::warn;

use crate::error::{ConflictKind, Error, Result};
use crate::target::ArchInfo;

/// What to do after a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Stop parsing and report the conflict
    Abort,
    /// Keep the first-seen value and go on
    Continue,
}

/// Decides whether a conflict is fatal.
pub trait ConflictPolicy {
    /// Called once per conflict found while parsing `arch`.
    fn on_conflict(&mut self, kind: ConflictKind, arch: &'static ArchInfo) -> Continuation;
}

impl<F> ConflictPolicy for F
where
    F: FnMut(ConflictKind, &'static ArchInfo) -> Continuation,
{
    fn on_conflict(&mut self, kind: ConflictKind, arch: &'static ArchInfo) -> Continuation {
        self(kind, arch)
    }
}

/// Aborts on every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConflicts;

impl ConflictPolicy for RejectConflicts {
    fn on_conflict(&mut self, _: ConflictKind, _: &'static ArchInfo) -> Continuation {
        Continuation::Abort
    }
}

/// Keeps the first value on every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreConflicts;

impl ConflictPolicy for IgnoreConflicts {
    fn on_conflict(&mut self, _: ConflictKind, _: &'static ArchInfo) -> Continuation {
        Continuation::Continue
    }
}

/// Routes a conflict through `policy`, turning `Abort` into an error.
pub(crate) fn resolve(
    policy: &mut dyn ConflictPolicy,
    kind: ConflictKind,
    arch: &'static ArchInfo,
) -> Result<()> {
    match policy.on_conflict(kind, arch) {
        Continuation::Abort => Err(Error::Conflict {
            kind,
            arch: arch.name,
        }),
        Continuation::Continue => {
            warn!("Ignoring {} in architecture {}", kind, arch.name);
            Ok(())
        }
    }
}
