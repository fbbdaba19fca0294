//! Gatekeeper module: time-gated enforcement
//!
//! - Scheduler: one cancellable delayed task per subject
//! - Enforcement: evaluate, grace period, re-evaluate, revoke or abort
//! - Audit trail: one record per stage, pure construction, pluggable sink
//! - Config: operator values resolved into an `EnforcementPolicy`

pub mod audit_trail;
pub mod config;
pub mod enforcement;
pub mod scheduler;

pub use audit_trail::{
    format_audit_log, query_audit_log, AbortReason, AuditQuery, AuditRecord, AuditSink,
    ConditionSnapshot, EnforcementDecision, MemoryAuditSink, Severity, Stage, TracingAuditSink,
};
pub use config::{ConfigError, EnforcementPolicy, EnforcementProfile, GateConfig};
pub use enforcement::{evaluate_conditions, GateEnforcementWorkflow, GateStores};
pub use scheduler::{CancelOutcome, DelayedTaskScheduler, TaskHandle};
