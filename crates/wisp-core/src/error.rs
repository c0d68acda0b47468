//! Error type shared by every wisp-core operation.

use thiserror::Error;

use crate::ast::MountKind;

/// Errors reported by the engine.
///
/// Data-driven paths (writes, flushes, reconciliation) never fail; these
/// variants cover API misuse and malformed templates.
#[derive(Debug, Error)]
pub enum Error {
    /// The component was destroyed and can no longer be used.
    #[error("this component has been destroyed")]
    Destroyed,

    /// A binding path had no segments.
    #[error("binding path is empty")]
    EmptyPath,

    /// No mount point with this name was declared by the template.
    #[error("unknown mount point `{0}`")]
    UnknownMountPoint(String),

    /// The mount point exists but has the other kind.
    #[error("mount point `{name}` is not a {expected} mount point")]
    WrongMountKind { name: String, expected: MountKind },

    /// Two mount points in one template share a name.
    #[error("duplicate mount point `{0}` in template")]
    DuplicateMountPoint(String),

    /// A mount point needs a parent element to anchor into.
    #[error("a mount point cannot be the template root")]
    MountPointAtRoot,

    /// No prop with this name was registered on the template.
    #[error("unknown prop `{0}`")]
    UnknownProp(String),

    /// A callback run through [`Scheduler::bundle`](crate::Scheduler::bundle) panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
