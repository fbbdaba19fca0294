//! Gate Enforcement Workflow
//!
//! Per subject, entered once per join:
//!
//! ```text
//! Scheduled -> Evaluating -> ComplianceMet
//!                         -> PendingRevocation -> ReEvaluating -> Aborted
//!                                                              -> Revoked
//!                                                              -> RevokeFailed
//! ```
//!
//! 1. Join schedules one run `lower_age` after the event.
//! 2. Evaluating: fresh membership snapshot, three conditions (age in the
//!    closed window, still gated, not exempt). All three must hold to go on.
//! 3. PendingRevocation: the actor must be able to revoke and outrank both
//!    the subject's highest role and the gate role. No retry on failure.
//! 4. Grace period, then ReEvaluating on a second fresh snapshot.
//! 5. Revoke, never retried.
//!
//! A successful verification before step 2 cancels the scheduled run. A
//! run already past step 2 is not interrupted; the re-check in step 4 is
//! what catches a verification that lands during the grace period.
//!
//! Membership fetch failures are treated as the subject having left: silent,
//! never escalated. Every stage emits an audit record.

use super::audit_trail::{
    AbortReason, AuditRecord, AuditSink, ConditionSnapshot, EnforcementDecision, Stage,
};
use super::config::{ConfigError, EnforcementPolicy, GateConfig};
use super::scheduler::{CancelOutcome, DelayedTaskScheduler, TaskHandle};
use crate::clock::Clock;
use crate::platform::{Membership, PlatformClient, SubjectId};
use crate::verification::{SelectionSnapshot, SelectionState, SessionFailure, SessionStore, SessionTicket};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};

/// Evaluate the three enforcement conditions against a snapshot.
///
/// The window is closed on both ends: a subject older than `upper_age` is
/// not actionable.
pub fn evaluate_conditions(
    policy: &EnforcementPolicy,
    membership: &Membership,
    now_ms: u64,
) -> ConditionSnapshot {
    let membership_age_ms = now_ms.saturating_sub(membership.joined_at_ms);
    let lower = policy.lower_age.as_millis() as u64;
    let upper = policy.upper_age.as_millis() as u64;

    ConditionSnapshot {
        membership_age_ms,
        age_in_window: (lower..=upper).contains(&membership_age_ms),
        still_gated: membership.has_role(&policy.gate_role),
        not_exempt: !membership
            .roles
            .iter()
            .any(|r| policy.exempt_roles.contains(r)),
    }
}

/// The state stores the workflow drives. Shared, never global.
#[derive(Debug, Clone)]
pub struct GateStores {
    pub sessions: Arc<SessionStore>,
    pub selections: Arc<SelectionState>,
    pub scheduler: Arc<DelayedTaskScheduler>,
}

impl GateStores {
    pub fn new(sessions: SessionStore) -> Self {
        Self {
            sessions: Arc::new(sessions),
            selections: Arc::new(SelectionState::new()),
            scheduler: Arc::new(DelayedTaskScheduler::new()),
        }
    }
}

struct Inner<P, A> {
    platform: P,
    audit: A,
    policy: EnforcementPolicy,
    stores: GateStores,
    clock: Clock,
}

/// Orchestrates verification state and time-gated revocation.
///
/// Cheap to clone; every clone drives the same stores.
pub struct GateEnforcementWorkflow<P, A> {
    inner: Arc<Inner<P, A>>,
}

impl<P, A> Clone for GateEnforcementWorkflow<P, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, A> GateEnforcementWorkflow<P, A>
where
    P: PlatformClient,
    A: AuditSink,
{
    pub fn new(
        platform: P,
        audit: A,
        policy: EnforcementPolicy,
        stores: GateStores,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                audit,
                policy,
                stores,
                clock,
            }),
        }
    }

    /// Validate `config` and build the workflow with fresh stores.
    pub fn from_config(
        config: &GateConfig,
        platform: P,
        audit: A,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        let policy = config.enforcement_policy()?;
        let sessions = SessionStore::new(config.expiration(), config.alphabet()?, clock);
        Ok(Self::new(platform, audit, policy, GateStores::new(sessions), clock))
    }

    pub fn policy(&self) -> &EnforcementPolicy {
        &self.inner.policy
    }

    pub fn platform(&self) -> &P {
        &self.inner.platform
    }

    pub fn stores(&self) -> &GateStores {
        &self.inner.stores
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.stores.sessions
    }

    pub fn selections(&self) -> &SelectionState {
        &self.inner.stores.selections
    }

    pub fn scheduler(&self) -> &DelayedTaskScheduler {
        &self.inner.stores.scheduler
    }

    /// Schedule the enforcement run for a new subject.
    ///
    /// A repeated join (rejoin) supersedes the earlier run.
    pub fn on_subject_joined(&self, subject: SubjectId) -> TaskHandle {
        let inner = Arc::clone(&self.inner);
        let target = subject.clone();
        info!(
            subject = %subject,
            delay = %humantime::format_duration(self.inner.policy.lower_age),
            "enforcement scheduled"
        );
        self.inner
            .stores
            .scheduler
            .schedule(subject, self.inner.policy.lower_age, move || async move {
                inner.run(&target).await;
                Ok::<(), Infallible>(())
            })
    }

    /// The subject passed verification: stop enforcement and drop their
    /// in-progress state.
    ///
    /// Returns true only when a run was stopped before it fired. A run
    /// already evaluating or in its grace period keeps going and is left to
    /// the post-grace re-check.
    pub fn on_verification_succeeded(&self, subject: &SubjectId) -> bool {
        let outcome = self.inner.stores.scheduler.cancel_with_outcome(subject);
        self.inner.stores.selections.clear(subject);
        self.inner.stores.sessions.clear_session(subject);
        info!(subject = %subject, ?outcome, "verification succeeded");
        outcome == CancelOutcome::Stopped
    }

    /// The subject left on their own. Same cleanup as a verification.
    pub fn on_subject_left(&self, subject: &SubjectId) {
        let cancelled = self.inner.stores.scheduler.cancel(subject);
        self.inner.stores.selections.clear(subject);
        self.inner.stores.sessions.clear_session(subject);
        debug!(subject = %subject, cancelled, "subject left");
    }

    /// Issue a code, attaching the subject's current selections.
    pub fn issue_code(&self, subject: &SubjectId) -> SessionTicket {
        let selections = self.inner.stores.selections.get(subject);
        let meta = (selections != SelectionSnapshot::default()).then_some(selections);
        self.inner.stores.sessions.create_session(subject, meta)
    }

    /// Check a submitted code and, on success, complete verification.
    ///
    /// The `SessionFailure` is the only error meant for the subject.
    pub fn on_code_submitted(
        &self,
        subject: &SubjectId,
        code: &str,
    ) -> Result<Option<SelectionSnapshot>, SessionFailure> {
        let meta = self.inner.stores.sessions.validate(subject, code)?;
        self.on_verification_succeeded(subject);
        Ok(meta)
    }

    /// Run the evaluation immediately, bypassing the scheduler.
    ///
    /// The scheduled path calls the same code; this is for operators forcing
    /// a check and for tests.
    pub async fn evaluate_now(&self, subject: &SubjectId) -> EnforcementDecision {
        self.inner.run(subject).await
    }
}

impl<P, A> Inner<P, A>
where
    P: PlatformClient,
    A: AuditSink,
{
    async fn run(&self, subject: &SubjectId) -> EnforcementDecision {
        // Evaluating
        let Some(membership) = self.fetch(subject).await else {
            return self.record(subject, Stage::Evaluating, AbortReason::SubjectGone.into(), None);
        };
        let conditions = evaluate_conditions(&self.policy, &membership, self.clock.now_ms());
        if !conditions.all_hold() {
            return self.record(
                subject,
                Stage::Evaluating,
                EnforcementDecision::ComplianceMet,
                Some(conditions),
            );
        }
        self.record(
            subject,
            Stage::Evaluating,
            EnforcementDecision::PendingRevocation,
            Some(conditions),
        );

        // PendingRevocation
        if let Err(reason) = self.check_authority(&membership).await {
            let record = AuditRecord::from_decision(
                subject,
                Stage::PendingRevocation,
                AbortReason::InsufficientAuthority.into(),
                Some(conditions),
                self.clock.now_ms(),
            )
            .with_note(reason);
            return self.emit(record);
        }

        tokio::time::sleep(self.policy.grace_period).await;

        // ReEvaluating
        let Some(membership) = self.fetch(subject).await else {
            return self.record(subject, Stage::ReEvaluating, AbortReason::SubjectGone.into(), None);
        };
        let conditions = evaluate_conditions(&self.policy, &membership, self.clock.now_ms());
        if !conditions.all_hold() {
            return self.record(
                subject,
                Stage::ReEvaluating,
                AbortReason::ComplianceRestored.into(),
                Some(conditions),
            );
        }

        let reason = format!(
            "Did not complete verification within {}",
            humantime::format_duration(self.policy.lower_age)
        );
        match self.platform.revoke(subject, &reason).await {
            Ok(()) => self.record(
                subject,
                Stage::ReEvaluating,
                EnforcementDecision::Revoked,
                Some(conditions),
            ),
            Err(e) => {
                let record = AuditRecord::from_decision(
                    subject,
                    Stage::ReEvaluating,
                    EnforcementDecision::RevokeFailed,
                    Some(conditions),
                    self.clock.now_ms(),
                )
                .with_note(e.to_string());
                self.emit(record)
            }
        }
    }

    /// Fresh membership, or `None` when the subject is gone or the fetch failed.
    async fn fetch(&self, subject: &SubjectId) -> Option<Membership> {
        match self.platform.fetch_membership(subject).await {
            Ok(membership) => membership,
            Err(e) => {
                debug!(subject = %subject, error = %e, "membership fetch failed, treating as gone");
                None
            }
        }
    }

    /// Ok when the actor may revoke and strictly outranks both the subject's
    /// highest role and the gate role.
    async fn check_authority(&self, membership: &Membership) -> Result<(), String> {
        let actor = self
            .platform
            .actor_permissions()
            .await
            .map_err(|e| format!("actor permissions unavailable ({})", e))?;
        if !actor.can_revoke {
            return Err("actor lacks revoke permission".to_string());
        }

        let gate_position = self
            .platform
            .role_position(&self.policy.gate_role)
            .await
            .map_err(|e| format!("gate role position unavailable ({})", e))?;

        let mut subject_top = i64::MIN;
        for role in &membership.roles {
            let position = self
                .platform
                .role_position(role)
                .await
                .map_err(|e| format!("role position unavailable ({})", e))?;
            subject_top = subject_top.max(position);
        }

        let required = gate_position.max(subject_top);
        if actor.highest_role_position <= required {
            return Err(format!(
                "actor role position {} does not outrank {}",
                actor.highest_role_position, required
            ));
        }
        Ok(())
    }

    fn record(
        &self,
        subject: &SubjectId,
        stage: Stage,
        decision: EnforcementDecision,
        conditions: Option<ConditionSnapshot>,
    ) -> EnforcementDecision {
        let record =
            AuditRecord::from_decision(subject, stage, decision, conditions, self.clock.now_ms());
        self.emit(record)
    }

    fn emit(&self, record: AuditRecord) -> EnforcementDecision {
        let decision = record.decision;
        debug!(subject = %record.subject, stage = ?record.stage, %decision, "enforcement stage");
        self.audit.emit(record);
        decision
    }
}

impl From<AbortReason> for EnforcementDecision {
    fn from(reason: AbortReason) -> Self {
        EnforcementDecision::Aborted(reason)
    }
}
