use std::{fmt, time::Duration};

use crate::domain::{DeviceId, UserId};

/// Which side of the ownership relation an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Device,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Device => f.write_str("device"),
            Entity::User => f.write_str("user"),
        }
    }
}

/// The two ways the membership list can drift from the Device Store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InconsistencyKind {
    /// A device row exists but no membership list references it.
    Orphan,
    /// A membership list references a device row that no longer exists.
    Dangling,
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconsistencyKind::Orphan => f.write_str("orphan device"),
            InconsistencyKind::Dangling => f.write_str("dangling id"),
        }
    }
}

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot and the
/// reconciliation job handle failures consistently (user-facing message vs retryable).
/// An ownership check that fails is not an error; see [`crate::access::Access`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("store call `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("ownership inconsistency ({kind}) for user {user_id}, device {device_id}: {cause}")]
    OwnershipInconsistency {
        kind: InconsistencyKind,
        user_id: UserId,
        device_id: DeviceId,
        cause: Box<Error>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn device_not_found(id: DeviceId) -> Self {
        Error::NotFound {
            entity: Entity::Device,
            id: id.0,
        }
    }

    pub fn user_not_found(id: UserId) -> Self {
        Error::NotFound {
            entity: Entity::User,
            id: id.0,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Store(_) => "store",
            Error::Timeout { .. } => "timeout",
            Error::OwnershipInconsistency { .. } => "ownership_inconsistency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::External(_) => "external",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Transport/commit failures that left no side effect behind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Timeout { .. })
    }

    pub fn inconsistency_kind(&self) -> Option<InconsistencyKind> {
        match self {
            Error::OwnershipInconsistency { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
