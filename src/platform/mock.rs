//! In-memory platform adapter
//!
//! Backs the integration tests and the `warden simulate` command. Holds a
//! role hierarchy, a member table and the enforcing actor's permissions, and
//! records every revoke call for assertions.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// In-memory platform for tests and simulation
#[derive(Clone)]
pub struct InMemoryPlatform {
    state: Arc<Mutex<PlatformState>>,
}

struct PlatformState {
    members: HashMap<SubjectId, Membership>,
    role_positions: HashMap<RoleId, i64>,
    actor: ActorPermissions,
    revocations: Vec<Revocation>,
    fail_revoke: bool,
    fail_fetch: bool,
}

/// A recorded revoke call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub subject: SubjectId,
    pub reason: String,
}

impl InMemoryPlatform {
    /// Create an empty platform whose actor holds `actor`.
    pub fn new(actor: ActorPermissions) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlatformState {
                members: HashMap::new(),
                role_positions: HashMap::new(),
                actor,
                revocations: Vec::new(),
                fail_revoke: false,
                fail_fetch: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        // A poisoned lock only happens after a panic elsewhere in a test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Define a role at a hierarchy position.
    pub fn define_role(&self, role: RoleId, position: i64) {
        self.lock().role_positions.insert(role, position);
    }

    /// Add a member with the given roles.
    pub fn join(&self, subject: SubjectId, joined_at_ms: u64, roles: impl IntoIterator<Item = RoleId>) {
        let membership = Membership {
            roles: roles.into_iter().collect::<BTreeSet<_>>(),
            joined_at_ms,
        };
        self.lock().members.insert(subject, membership);
    }

    /// Remove a member (they left on their own).
    pub fn leave(&self, subject: &SubjectId) -> bool {
        self.lock().members.remove(subject).is_some()
    }

    pub fn add_role(&self, subject: &SubjectId, role: RoleId) -> bool {
        match self.lock().members.get_mut(subject) {
            Some(m) => m.roles.insert(role),
            None => false,
        }
    }

    pub fn remove_role(&self, subject: &SubjectId, role: &RoleId) -> bool {
        match self.lock().members.get_mut(subject) {
            Some(m) => m.roles.remove(role),
            None => false,
        }
    }

    pub fn is_member(&self, subject: &SubjectId) -> bool {
        self.lock().members.contains_key(subject)
    }

    pub fn set_actor(&self, actor: ActorPermissions) {
        self.lock().actor = actor;
    }

    /// Make every subsequent revoke call fail.
    pub fn set_fail_revoke(&self, fail: bool) {
        self.lock().fail_revoke = fail;
    }

    /// Make every subsequent membership fetch fail.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    /// Revoke calls that succeeded, in order.
    pub fn revocations(&self) -> Vec<Revocation> {
        self.lock().revocations.clone()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn fetch_membership(&self, subject: &SubjectId) -> PlatformResult<Option<Membership>> {
        let state = self.lock();
        if state.fail_fetch {
            return Err(PlatformError::Network("fetch failed".to_string()));
        }
        Ok(state.members.get(subject).cloned())
    }

    async fn actor_permissions(&self) -> PlatformResult<ActorPermissions> {
        Ok(self.lock().actor)
    }

    async fn role_position(&self, role: &RoleId) -> PlatformResult<i64> {
        self.lock()
            .role_positions
            .get(role)
            .copied()
            .ok_or_else(|| PlatformError::RoleNotFound(role.clone()))
    }

    async fn revoke(&self, subject: &SubjectId, reason: &str) -> PlatformResult<()> {
        let mut state = self.lock();
        if state.fail_revoke {
            return Err(PlatformError::Forbidden("revoke rejected".to_string()));
        }
        if state.members.remove(subject).is_none() {
            return Err(PlatformError::MemberNotFound(subject.clone()));
        }
        state.revocations.push(Revocation {
            subject: subject.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
