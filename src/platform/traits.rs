//! Platform Adapter Trait Abstractions
//!
//! The gate never talks to a chat platform directly. Everything it needs
//! (membership snapshots, actor authority, the revoke action) comes through
//! `PlatformClient`, so tests and the CLI simulator can swap in
//! `InMemoryPlatform`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque identifier of the member undergoing verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform role identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of a subject's membership.
///
/// Always fetched fresh before a decision; never cached across stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub roles: BTreeSet<RoleId>,
    /// Unix milliseconds at which the subject joined
    pub joined_at_ms: u64,
}

impl Membership {
    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }
}

/// What the enforcing actor (the bot itself) is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorPermissions {
    pub can_revoke: bool,
    /// Position of the actor's highest role in the platform hierarchy
    pub highest_role_position: i64,
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform adapter errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("Member not found: {0}")]
    MemberNotFound(SubjectId),

    #[error("Missing permissions: {0}")]
    Forbidden(String),

    #[error("Platform error: {0}")]
    Other(String),
}

/// Platform adapter consumed by the enforcement workflow.
///
/// Implementations must be `Send + Sync`: every subject's workflow runs as its
/// own spawned tokio task and shares one client.
#[async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Fetch a fresh membership snapshot.
    ///
    /// `Ok(None)` means the subject has left.
    async fn fetch_membership(&self, subject: &SubjectId) -> PlatformResult<Option<Membership>>;

    /// Permissions of the enforcing actor.
    async fn actor_permissions(&self) -> PlatformResult<ActorPermissions>;

    /// Hierarchy position of a role (higher outranks lower).
    async fn role_position(&self, role: &RoleId) -> PlatformResult<i64>;

    /// Remove the subject's membership.
    async fn revoke(&self, subject: &SubjectId, reason: &str) -> PlatformResult<()>;
}
