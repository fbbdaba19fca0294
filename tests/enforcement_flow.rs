//! Integration tests for the join → verify / enforce lifecycle.
//!
//! Runs the public workflow against `InMemoryPlatform` on a paused tokio
//! clock:
//! 1. Subject joins holding the gate role, enforcement is scheduled
//! 2. Either they verify with a code (run cancelled) or the run fires
//! 3. Run evaluates, waits the grace period, re-evaluates
//! 4. Revoke or abort, audited at each stage

use std::time::Duration;
use tokio::time::{advance, sleep};
use warden::gatekeeper::{
    AbortReason, EnforcementDecision, GateEnforcementWorkflow, MemoryAuditSink, Stage,
};
use warden::platform::{ActorPermissions, InMemoryPlatform};
use warden::verification::{Category, SessionFailure};
use warden::{Clock, GateConfig, RoleId, SubjectId};

const GATE: &str = "unverified";
const LOWER_MS: u64 = 150_000;
const UPPER_MS: u64 = 300_000;
const GRACE_MS: u64 = 5_000;
const JOINED_AT_MS: u64 = 1_000_000;

struct TestBot {
    workflow: GateEnforcementWorkflow<InMemoryPlatform, MemoryAuditSink>,
    platform: InMemoryPlatform,
    audit: MemoryAuditSink,
}

impl TestBot {
    fn new() -> Self {
        let mut config = GateConfig::new(RoleId::new(GATE));
        config.exempt_roles.insert(RoleId::new("staff"));
        config.lower_age_ms = Some(LOWER_MS);
        config.upper_age_ms = Some(UPPER_MS);
        config.grace_period_ms = GRACE_MS;

        let platform = InMemoryPlatform::new(ActorPermissions {
            can_revoke: true,
            highest_role_position: 10,
        });
        platform.define_role(RoleId::new(GATE), 1);
        platform.define_role(RoleId::new("staff"), 5);

        let audit = MemoryAuditSink::new();
        let workflow = GateEnforcementWorkflow::from_config(
            &config,
            platform.clone(),
            audit.clone(),
            Clock::starting_at(JOINED_AT_MS),
        )
        .unwrap();

        Self {
            workflow,
            platform,
            audit,
        }
    }

    fn join(&self, name: &str) -> SubjectId {
        let subject = SubjectId::new(name);
        self.platform
            .join(subject.clone(), JOINED_AT_MS, [RoleId::new(GATE)]);
        self.workflow.on_subject_joined(subject.clone());
        subject
    }

    fn decisions(&self, subject: &SubjectId) -> Vec<EnforcementDecision> {
        self.audit
            .records_for(subject)
            .into_iter()
            .map(|r| r.decision)
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn test_never_verified_is_revoked_once() {
    let bot = TestBot::new();
    let bob = bot.join("bob");

    // Past the first check and the grace period
    sleep(Duration::from_millis(LOWER_MS + GRACE_MS + 1_000)).await;

    let revocations = bot.platform.revocations();
    assert_eq!(revocations.len(), 1);
    assert_eq!(revocations[0].subject, bob);
    assert!(!revocations[0].reason.is_empty());
    assert!(!bot.platform.is_member(&bob));

    assert_eq!(
        bot.decisions(&bob),
        vec![
            EnforcementDecision::PendingRevocation,
            EnforcementDecision::Revoked
        ]
    );
    let last = bot.audit.records_for(&bob).pop().unwrap();
    assert_eq!(last.stage, Stage::ReEvaluating);
    assert!(last.decision.is_terminal());
    assert_eq!(last.revoke_succeeded, Some(true));
    assert!(!bot.workflow.scheduler().has(&bob));

    // Nothing fires later
    sleep(Duration::from_millis(UPPER_MS)).await;
    assert_eq!(bot.platform.revocations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gate_removed_during_grace_aborts() {
    let bot = TestBot::new();
    let alice = bot.join("alice");

    // First check at LOWER_MS, grace ends at LOWER_MS + GRACE_MS
    sleep(Duration::from_millis(LOWER_MS + GRACE_MS / 2)).await;
    assert_eq!(
        bot.decisions(&alice),
        vec![EnforcementDecision::PendingRevocation]
    );

    bot.platform.remove_role(&alice, &RoleId::new(GATE));
    sleep(Duration::from_millis(GRACE_MS)).await;

    assert!(bot.platform.revocations().is_empty());
    assert!(bot.platform.is_member(&alice));
    assert_eq!(
        bot.decisions(&alice),
        vec![
            EnforcementDecision::PendingRevocation,
            EnforcementDecision::Aborted(AbortReason::ComplianceRestored)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_leave_during_grace_aborts_as_gone() {
    let bot = TestBot::new();
    let carol = bot.join("carol");

    sleep(Duration::from_millis(LOWER_MS + 1_000)).await;
    bot.platform.leave(&carol);
    sleep(Duration::from_millis(GRACE_MS)).await;

    assert!(bot.platform.revocations().is_empty());
    assert_eq!(
        bot.decisions(&carol).last(),
        Some(&EnforcementDecision::Aborted(AbortReason::SubjectGone))
    );
}

#[tokio::test(start_paused = true)]
async fn test_verification_before_check_cancels_run() {
    let bot = TestBot::new();
    let dave = bot.join("dave");

    bot.workflow
        .selections()
        .set(&dave, Category::Pronoun, "they/them");
    bot.workflow.selections().set(&dave, Category::Age, "25-34");

    advance(Duration::from_millis(30_000)).await;
    let ticket = bot.workflow.issue_code(&dave);
    assert_eq!(ticket.code.len(), 4);

    // Wrong code keeps the session and the scheduled run
    assert_eq!(
        bot.workflow.on_code_submitted(&dave, "0000"),
        Err(SessionFailure::Mismatch)
    );
    assert!(bot.workflow.scheduler().has(&dave));

    let meta = bot
        .workflow
        .on_code_submitted(&dave, &format!("  {}  ", ticket.code.to_lowercase()))
        .unwrap()
        .unwrap();
    assert_eq!(meta.get(Category::Pronoun), Some("they/them"));
    assert_eq!(meta.get(Category::Continent), None);

    assert!(!bot.workflow.scheduler().has(&dave));
    assert!(bot.workflow.selections().is_empty());
    assert!(bot.workflow.sessions().is_empty());

    // Even though the platform still shows the gate role, nothing runs
    sleep(Duration::from_millis(UPPER_MS)).await;
    assert!(bot.platform.revocations().is_empty());
    assert!(bot.audit.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_code_is_rejected_and_enforcement_continues() {
    let bot = TestBot::new();
    let erin = bot.join("erin");

    let ticket = bot.workflow.issue_code(&erin);
    advance(Duration::from_millis(60_001)).await;

    assert_eq!(
        bot.workflow.on_code_submitted(&erin, &ticket.code),
        Err(SessionFailure::Expired)
    );
    assert_eq!(
        bot.workflow.on_code_submitted(&erin, &ticket.code),
        Err(SessionFailure::Missing)
    );

    sleep(Duration::from_millis(LOWER_MS + GRACE_MS)).await;
    assert_eq!(bot.platform.revocations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_supersedes_earlier_run() {
    let bot = TestBot::new();
    let frank = SubjectId::new("frank");

    bot.platform
        .join(frank.clone(), JOINED_AT_MS, [RoleId::new(GATE)]);
    let first = bot.workflow.on_subject_joined(frank.clone());

    advance(Duration::from_millis(100_000)).await;
    bot.platform
        .join(frank.clone(), JOINED_AT_MS + 100_000, [RoleId::new(GATE)]);
    let second = bot.workflow.on_subject_joined(frank.clone());
    assert!(second.generation > first.generation);
    assert_eq!(bot.workflow.scheduler().pending(), 1);

    // The first timer would have fired here
    sleep(Duration::from_millis(60_000)).await;
    assert!(bot.audit.records_for(&frank).is_empty());

    // The second one fires LOWER_MS after the rejoin
    sleep(Duration::from_millis(LOWER_MS - 60_000 + GRACE_MS + 1_000)).await;
    assert_eq!(bot.platform.revocations().len(), 1);
    assert_eq!(bot.audit.records_for(&frank).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exempt_subject_is_left_alone() {
    let bot = TestBot::new();
    let gina = SubjectId::new("gina");

    bot.platform.join(
        gina.clone(),
        JOINED_AT_MS,
        [RoleId::new(GATE), RoleId::new("staff")],
    );
    bot.workflow.on_subject_joined(gina.clone());

    sleep(Duration::from_millis(LOWER_MS + GRACE_MS + 1_000)).await;

    assert!(bot.platform.revocations().is_empty());
    assert_eq!(
        bot.decisions(&gina),
        vec![EnforcementDecision::ComplianceMet]
    );
}

#[tokio::test(start_paused = true)]
async fn test_many_subjects_are_independent() {
    let bot = TestBot::new();
    let subjects: Vec<SubjectId> = (0..20).map(|i| bot.join(&format!("user-{i}"))).collect();

    // Even-numbered subjects verify before the check
    for subject in subjects.iter().step_by(2) {
        let ticket = bot.workflow.issue_code(subject);
        bot.workflow.on_code_submitted(subject, &ticket.code).unwrap();
        bot.platform.remove_role(subject, &RoleId::new(GATE));
    }

    sleep(Duration::from_millis(LOWER_MS + GRACE_MS + 1_000)).await;

    let revoked: Vec<SubjectId> = bot
        .platform
        .revocations()
        .into_iter()
        .map(|r| r.subject)
        .collect();
    assert_eq!(revoked.len(), 10);
    for subject in subjects.iter().skip(1).step_by(2) {
        assert!(revoked.contains(subject));
    }
    assert_eq!(bot.workflow.scheduler().pending(), 0);
}
