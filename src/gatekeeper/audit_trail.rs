//! Enforcement Audit Trail
//!
//! Every stage of the enforcement workflow produces one `AuditRecord`, aborts
//! included. Records are built by a pure function of the decision and the
//! condition snapshot (`AuditRecord::from_decision`) and handed to an
//! `AuditSink`, which is fire-and-forget.
//!
//! - Privacy: records carry the subject identifier only
//! - Operator-visible outcomes (authority aborts, failed revokes) are marked
//!   `Severity::Warning`

use crate::platform::SubjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why a run stopped without revoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Subject left, or their membership could not be fetched
    SubjectGone,
    /// Actor cannot revoke, or does not outrank the subject and gate role
    InsufficientAuthority,
    /// A condition stopped holding during the grace period
    ComplianceRestored,
}

/// Outcome of one evaluation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementDecision {
    ComplianceMet,
    PendingRevocation,
    Aborted(AbortReason),
    Revoked,
    RevokeFailed,
}

impl EnforcementDecision {
    /// Whether the run ends at this decision.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EnforcementDecision::PendingRevocation)
    }
}

impl fmt::Display for EnforcementDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementDecision::ComplianceMet => f.write_str("compliance met"),
            EnforcementDecision::PendingRevocation => f.write_str("pending revocation"),
            EnforcementDecision::Aborted(AbortReason::SubjectGone) => {
                f.write_str("aborted (subject gone)")
            }
            EnforcementDecision::Aborted(AbortReason::InsufficientAuthority) => {
                f.write_str("aborted (insufficient authority)")
            }
            EnforcementDecision::Aborted(AbortReason::ComplianceRestored) => {
                f.write_str("aborted (compliance restored)")
            }
            EnforcementDecision::Revoked => f.write_str("revoked"),
            EnforcementDecision::RevokeFailed => f.write_str("revoke failed"),
        }
    }
}

/// Workflow stage that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Evaluating,
    PendingRevocation,
    ReEvaluating,
}

/// The three enforcement conditions at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    pub membership_age_ms: u64,
    pub age_in_window: bool,
    pub still_gated: bool,
    pub not_exempt: bool,
}

impl ConditionSnapshot {
    /// True when the subject is actionable: in window, gated, not exempt.
    pub fn all_hold(&self) -> bool {
        self.age_in_window && self.still_gated && self.not_exempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unix milliseconds
    pub timestamp_ms: u64,
    pub subject: SubjectId,
    pub stage: Stage,
    pub decision: EnforcementDecision,
    pub conditions: Option<ConditionSnapshot>,
    /// Set on terminal revoke outcomes only
    pub revoke_succeeded: Option<bool>,
    pub severity: Severity,
    pub details: String,
}

impl AuditRecord {
    /// Build the record for a decision. Pure: no clock, no I/O.
    pub fn from_decision(
        subject: &SubjectId,
        stage: Stage,
        decision: EnforcementDecision,
        conditions: Option<ConditionSnapshot>,
        timestamp_ms: u64,
    ) -> Self {
        let revoke_succeeded = match decision {
            EnforcementDecision::Revoked => Some(true),
            EnforcementDecision::RevokeFailed => Some(false),
            _ => None,
        };
        let severity = match decision {
            EnforcementDecision::Aborted(AbortReason::InsufficientAuthority)
            | EnforcementDecision::RevokeFailed => Severity::Warning,
            _ => Severity::Info,
        };

        Self {
            timestamp_ms,
            subject: subject.clone(),
            stage,
            decision,
            conditions,
            revoke_succeeded,
            severity,
            details: describe(decision, conditions.as_ref()),
        }
    }

    /// Append extra context (platform error text, authority numbers).
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        self.details.push_str(": ");
        self.details.push_str(note.as_ref());
        self
    }

    /// How long ago the record was made, relative to `now_ms`.
    pub fn age_display(&self, now_ms: u64) -> String {
        if now_ms < self.timestamp_ms {
            return format!("Unix ms: {}", self.timestamp_ms);
        }
        // Second resolution keeps the output short.
        let elapsed = Duration::from_secs((now_ms - self.timestamp_ms) / 1000);
        if elapsed.is_zero() {
            "just now".to_string()
        } else {
            format!("{} ago", humantime::format_duration(elapsed))
        }
    }
}

fn describe(decision: EnforcementDecision, conditions: Option<&ConditionSnapshot>) -> String {
    let summary = match decision {
        EnforcementDecision::ComplianceMet => "No action needed",
        EnforcementDecision::PendingRevocation => "Non-compliant, re-checking after grace period",
        EnforcementDecision::Aborted(AbortReason::SubjectGone) => "Subject no longer present",
        EnforcementDecision::Aborted(AbortReason::InsufficientAuthority) => {
            "Cannot revoke: insufficient authority"
        }
        EnforcementDecision::Aborted(AbortReason::ComplianceRestored) => {
            "Compliance restored during grace period"
        }
        EnforcementDecision::Revoked => "Membership revoked",
        EnforcementDecision::RevokeFailed => "Revoke attempt failed",
    };

    match conditions {
        Some(c) => format!(
            "{} (age {}, in_window={}, gated={}, not_exempt={})",
            summary,
            humantime::format_duration(Duration::from_millis(c.membership_age_ms)),
            c.age_in_window,
            c.still_gated,
            c.not_exempt
        ),
        None => summary.to_string(),
    }
}

/// Destination for audit records. Must not block or fail.
pub trait AuditSink: Send + Sync + 'static {
    fn emit(&self, record: AuditRecord);
}

/// Writes each record as a structured `tracing` event on target `warden::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: AuditRecord) {
        let conditions = record.conditions;
        match record.severity {
            Severity::Info => tracing::info!(
                target: "warden::audit",
                subject = %record.subject,
                stage = ?record.stage,
                decision = %record.decision,
                age_ms = conditions.map(|c| c.membership_age_ms),
                revoke_succeeded = record.revoke_succeeded,
                "{}",
                record.details
            ),
            Severity::Warning => tracing::warn!(
                target: "warden::audit",
                subject = %record.subject,
                stage = ?record.stage,
                decision = %record.decision,
                age_ms = conditions.map(|c| c.membership_age_ms),
                revoke_succeeded = record.revoke_succeeded,
                "{}",
                record.details
            ),
        }
    }
}

/// Keeps records in memory for queries and assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in emission order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Records for one subject, in emission order.
    pub fn records_for(&self, subject: &SubjectId) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.subject == subject)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// Fan out to two sinks.
impl<A: AuditSink, B: AuditSink> AuditSink for (A, B) {
    fn emit(&self, record: AuditRecord) {
        self.0.emit(record.clone());
        self.1.emit(record);
    }
}

/// Query options for the audit log.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub subject: Option<SubjectId>,
    pub decision: Option<EnforcementDecision>,
    /// Only warnings (authority aborts, failed revokes)
    pub warnings_only: bool,
    /// Limit number of results (most recent first)
    pub limit: Option<usize>,
    /// Only entries strictly after this timestamp
    pub after_timestamp_ms: Option<u64>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            subject: None,
            decision: None,
            warnings_only: false,
            limit: Some(50),
            after_timestamp_ms: None,
        }
    }
}

/// Filter the audit log. Returns most recent first.
pub fn query_audit_log(records: &[AuditRecord], query: &AuditQuery) -> Vec<AuditRecord> {
    let mut filtered: Vec<AuditRecord> = records
        .iter()
        .filter(|r| query.subject.as_ref().map_or(true, |s| &r.subject == s))
        .filter(|r| query.decision.map_or(true, |d| r.decision == d))
        .filter(|r| !query.warnings_only || r.severity == Severity::Warning)
        .filter(|r| query.after_timestamp_ms.map_or(true, |t| r.timestamp_ms > t))
        .cloned()
        .collect();

    // Stable sort keeps emission order among equal timestamps, reversed below.
    filtered.reverse();
    filtered.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }
    filtered
}

/// Render records for an operator.
pub fn format_audit_log(records: &[AuditRecord], now_ms: u64) -> String {
    if records.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::from("Enforcement Audit Trail\n\n");
    for record in records {
        let marker = match record.severity {
            Severity::Info => "-",
            Severity::Warning => "!",
        };
        output.push_str(&format!(
            "{} {} | {} | {:?} | {}\n  {}\n\n",
            marker,
            record.age_display(now_ms),
            record.subject,
            record.stage,
            record.decision,
            record.details
        ));
    }

    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str) -> SubjectId {
        SubjectId::new(id)
    }

    fn conditions(all: bool) -> ConditionSnapshot {
        ConditionSnapshot {
            membership_age_ms: 150_000,
            age_in_window: true,
            still_gated: all,
            not_exempt: true,
        }
    }

    fn record(id: &str, decision: EnforcementDecision, ts: u64) -> AuditRecord {
        AuditRecord::from_decision(&subject(id), Stage::Evaluating, decision, None, ts)
    }

    #[test]
    fn test_conditions_all_hold() {
        assert!(conditions(true).all_hold());
        assert!(!conditions(false).all_hold());
    }

    #[test]
    fn test_revoked_record() {
        let r = AuditRecord::from_decision(
            &subject("a"),
            Stage::ReEvaluating,
            EnforcementDecision::Revoked,
            Some(conditions(true)),
            42,
        );
        assert_eq!(r.revoke_succeeded, Some(true));
        assert_eq!(r.severity, Severity::Info);
        assert!(r.details.starts_with("Membership revoked"));
        assert!(r.details.contains("2m 30s"));
        assert!(r.details.contains("gated=true"));
    }

    #[test]
    fn test_revoke_failed_record_is_warning() {
        let r = AuditRecord::from_decision(
            &subject("a"),
            Stage::ReEvaluating,
            EnforcementDecision::RevokeFailed,
            Some(conditions(true)),
            42,
        )
        .with_note("Network error: timeout");
        assert_eq!(r.revoke_succeeded, Some(false));
        assert_eq!(r.severity, Severity::Warning);
        assert!(r.details.ends_with(": Network error: timeout"));
    }

    #[test]
    fn test_authority_abort_distinct_from_compliance_abort() {
        let authority = record(
            "a",
            EnforcementDecision::Aborted(AbortReason::InsufficientAuthority),
            1,
        );
        let restored = record(
            "a",
            EnforcementDecision::Aborted(AbortReason::ComplianceRestored),
            1,
        );
        assert_eq!(authority.severity, Severity::Warning);
        assert_eq!(restored.severity, Severity::Info);
        assert_ne!(authority.details, restored.details);
        assert_eq!(authority.revoke_succeeded, None);
    }

    #[test]
    fn test_terminal_decisions() {
        assert!(!EnforcementDecision::PendingRevocation.is_terminal());
        assert!(EnforcementDecision::ComplianceMet.is_terminal());
        assert!(EnforcementDecision::Aborted(AbortReason::SubjectGone).is_terminal());
    }

    #[test]
    fn test_age_display() {
        let r = record("a", EnforcementDecision::ComplianceMet, 10_000);
        assert_eq!(r.age_display(10_500), "just now");
        assert_eq!(r.age_display(130_000), "2m ago");
        assert!(r.age_display(5_000).starts_with("Unix ms:"));
    }

    #[test]
    fn test_memory_sink_and_tee() {
        let first = MemoryAuditSink::new();
        let second = MemoryAuditSink::new();
        let tee = (first.clone(), second.clone());

        tee.emit(record("a", EnforcementDecision::ComplianceMet, 1));
        tee.emit(record("b", EnforcementDecision::Revoked, 2));

        assert_eq!(first.records().len(), 2);
        assert_eq!(second.records_for(&subject("b")).len(), 1);
    }

    #[test]
    fn test_query_filters_and_order() {
        let records = vec![
            record("a", EnforcementDecision::PendingRevocation, 1),
            record("b", EnforcementDecision::ComplianceMet, 2),
            record("a", EnforcementDecision::Revoked, 3),
            record(
                "c",
                EnforcementDecision::Aborted(AbortReason::InsufficientAuthority),
                4,
            ),
        ];

        let by_subject = query_audit_log(
            &records,
            &AuditQuery {
                subject: Some(subject("a")),
                ..Default::default()
            },
        );
        assert_eq!(by_subject.len(), 2);
        assert_eq!(by_subject[0].decision, EnforcementDecision::Revoked);

        let warnings = query_audit_log(
            &records,
            &AuditQuery {
                warnings_only: true,
                ..Default::default()
            },
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].subject, subject("c"));

        let recent = query_audit_log(
            &records,
            &AuditQuery {
                after_timestamp_ms: Some(1),
                limit: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp_ms, 4);
        assert_eq!(recent[1].timestamp_ms, 3);

        let by_decision = query_audit_log(
            &records,
            &AuditQuery {
                decision: Some(EnforcementDecision::ComplianceMet),
                ..Default::default()
            },
        );
        assert_eq!(by_decision.len(), 1);
    }

    #[test]
    fn test_query_same_timestamp_most_recent_first() {
        let records = vec![
            record("a", EnforcementDecision::PendingRevocation, 5),
            record("a", EnforcementDecision::Revoked, 5),
        ];
        let result = query_audit_log(&records, &AuditQuery::default());
        assert_eq!(result[0].decision, EnforcementDecision::Revoked);
    }

    #[test]
    fn test_format_audit_log() {
        let records = vec![
            record("a", EnforcementDecision::Revoked, 0),
            record(
                "b",
                EnforcementDecision::Aborted(AbortReason::InsufficientAuthority),
                0,
            ),
        ];
        let formatted = format_audit_log(&records, 0);
        assert!(formatted.starts_with("Enforcement Audit Trail"));
        assert!(formatted.contains("- just now | a | Evaluating | revoked"));
        assert!(formatted.contains("! just now | b"));
        assert!(formatted.contains("insufficient authority"));
    }

    #[test]
    fn test_format_audit_log_empty() {
        assert_eq!(format_audit_log(&[], 0), "No audit entries found.");
    }

    #[test]
    fn test_record_serializes() {
        let r = record(
            "a",
            EnforcementDecision::Aborted(AbortReason::ComplianceRestored),
            7,
        );
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"compliance_restored\""));
        assert!(json.contains("\"subject\":\"a\""));
    }
}
