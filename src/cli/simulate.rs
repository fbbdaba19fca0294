//! Replay a scripted event stream against the in-memory platform
//!
//! Events are JSON lines, one per line. Blank lines and lines starting with
//! `#` are skipped.
//!
//! ```text
//! {"event": "define_role", "role": "member", "position": 2}
//! {"event": "join", "subject": "alice"}
//! {"event": "select", "subject": "alice", "category": "age", "value": "18-24"}
//! {"event": "issue_code", "subject": "alice"}
//! {"event": "submit_code", "subject": "alice"}
//! {"event": "join", "subject": "bob"}
//! {"event": "advance", "ms": 40000}
//! ```
//!
//! `submit_code` without a `code` submits the last code issued to that
//! subject. `advance` sleeps in real time, so scripts meant to show a
//! revocation want the testing profile or a short `lower_age_ms`.

use super::config::{resolve_config_path, WardenConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::time::Duration;
use tracing::debug;
use warden::gatekeeper::{
    format_audit_log, AuditRecord, GateEnforcementWorkflow, MemoryAuditSink, TracingAuditSink,
};
use warden::platform::{ActorPermissions, InMemoryPlatform, Revocation};
use warden::verification::Category;
use warden::{Clock, GateConfig, RoleId, SubjectId};

/// Hierarchy position given to the gate role unless a script redefines it
const DEFAULT_GATE_POSITION: i64 = 1;

/// Hierarchy position of the simulated bot unless a script sets `actor`
const DEFAULT_ACTOR_POSITION: i64 = 100;

/// Extra wait past the last possible run when draining scheduled work
const DRAIN_SLACK: Duration = Duration::from_secs(1);

const DRAIN_POLL: Duration = Duration::from_millis(100);

/// One scripted event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    DefineRole {
        role: RoleId,
        position: i64,
    },
    Actor {
        can_revoke: bool,
        position: i64,
    },
    /// The subject joins holding the gate role plus `roles`
    Join {
        subject: SubjectId,
        #[serde(default)]
        roles: Vec<RoleId>,
    },
    Leave {
        subject: SubjectId,
    },
    AddRole {
        subject: SubjectId,
        role: RoleId,
    },
    RemoveRole {
        subject: SubjectId,
        role: RoleId,
    },
    Select {
        subject: SubjectId,
        category: Category,
        value: String,
    },
    IssueCode {
        subject: SubjectId,
    },
    SubmitCode {
        subject: SubjectId,
        #[serde(default)]
        code: Option<String>,
    },
    Advance {
        ms: u64,
    },
}

/// Parse a JSON-lines event script.
pub fn parse_events<R: Read>(reader: R) -> Result<Vec<SimEvent>, Box<dyn std::error::Error>> {
    let mut events = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read events: {}", e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: SimEvent = serde_json::from_str(line)
            .map_err(|e| format!("Invalid event on line {}: {}", index + 1, e))?;
        events.push(event);
    }
    Ok(events)
}

type SimWorkflow = GateEnforcementWorkflow<InMemoryPlatform, (TracingAuditSink, MemoryAuditSink)>;

/// Drives a workflow over an in-memory platform.
pub struct Simulator {
    workflow: SimWorkflow,
    platform: InMemoryPlatform,
    audit: MemoryAuditSink,
    clock: Clock,
    issued: HashMap<SubjectId, String>,
}

impl Simulator {
    pub fn new(config: &GateConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let platform = InMemoryPlatform::new(ActorPermissions {
            can_revoke: true,
            highest_role_position: DEFAULT_ACTOR_POSITION,
        });
        platform.define_role(config.gate_role.clone(), DEFAULT_GATE_POSITION);

        let audit = MemoryAuditSink::new();
        let clock = Clock::system();
        let workflow = GateEnforcementWorkflow::from_config(
            config,
            platform.clone(),
            (TracingAuditSink, audit.clone()),
            clock,
        )?;

        Ok(Self {
            workflow,
            platform,
            audit,
            clock,
            issued: HashMap::new(),
        })
    }

    /// Apply one event. Returns a line describing what happened.
    pub async fn apply(&mut self, event: SimEvent) -> String {
        let purged = self.workflow.sessions().purge_expired();
        if purged > 0 {
            debug!(purged, "expired verification sessions purged");
        }

        match event {
            SimEvent::DefineRole { role, position } => {
                self.platform.define_role(role.clone(), position);
                format!("role {} at position {}", role, position)
            }
            SimEvent::Actor {
                can_revoke,
                position,
            } => {
                self.platform.set_actor(ActorPermissions {
                    can_revoke,
                    highest_role_position: position,
                });
                format!("actor can_revoke={} position={}", can_revoke, position)
            }
            SimEvent::Join { subject, roles } => {
                let gate = self.workflow.policy().gate_role.clone();
                self.platform.join(
                    subject.clone(),
                    self.clock.now_ms(),
                    std::iter::once(gate).chain(roles),
                );
                let handle = self.workflow.on_subject_joined(subject.clone());
                format!(
                    "{} joined, enforcement run #{} in {}",
                    subject,
                    handle.generation,
                    humantime::format_duration(self.workflow.policy().lower_age)
                )
            }
            SimEvent::Leave { subject } => {
                let was_member = self.platform.leave(&subject);
                self.workflow.on_subject_left(&subject);
                self.issued.remove(&subject);
                if was_member {
                    format!("{} left", subject)
                } else {
                    format!("{} was not a member", subject)
                }
            }
            SimEvent::AddRole { subject, role } => {
                if self.platform.add_role(&subject, role.clone()) {
                    format!("{} gained {}", subject, role)
                } else {
                    format!("{} unchanged (not a member or already holds {})", subject, role)
                }
            }
            SimEvent::RemoveRole { subject, role } => {
                if self.platform.remove_role(&subject, &role) {
                    format!("{} lost {}", subject, role)
                } else {
                    format!("{} unchanged (not a member or lacks {})", subject, role)
                }
            }
            SimEvent::Select {
                subject,
                category,
                value,
            } => {
                let snapshot = self.workflow.selections().set(&subject, category, value);
                format!(
                    "{} selected {} ({} of {} categories)",
                    subject,
                    category,
                    Category::ALL
                        .iter()
                        .filter(|c| snapshot.get(**c).is_some())
                        .count(),
                    Category::ALL.len()
                )
            }
            SimEvent::IssueCode { subject } => {
                let ticket = self.workflow.issue_code(&subject);
                self.issued.insert(subject.clone(), ticket.code.clone());
                format!("{} was issued code {}", subject, ticket.code)
            }
            SimEvent::SubmitCode { subject, code } => {
                let Some(code) = code.or_else(|| self.issued.get(&subject).cloned()) else {
                    return format!("{} has no code to submit", subject);
                };
                match self.workflow.on_code_submitted(&subject, &code) {
                    Ok(meta) => {
                        self.issued.remove(&subject);
                        // Lifting the gate is the platform adapter's job
                        self.platform
                            .remove_role(&subject, &self.workflow.policy().gate_role);
                        match meta {
                            Some(meta) if meta.is_complete() => {
                                format!("{} verified with every category selected", subject)
                            }
                            Some(_) => format!("{} verified with partial selections", subject),
                            None => format!("{} verified", subject),
                        }
                    }
                    Err(failure) => format!("{} submitted {}: {}", subject, code, failure),
                }
            }
            SimEvent::Advance { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                format!("advanced {}", humantime::format_duration(Duration::from_millis(ms)))
            }
        }
    }

    /// Wait for scheduled enforcement runs to finish. Returns whether the
    /// scheduler drained before the deadline.
    pub async fn drain(&self) -> bool {
        let policy = self.workflow.policy();
        let deadline = policy.lower_age + policy.grace_period + DRAIN_SLACK;
        let scheduler = self.workflow.scheduler();

        tokio::time::timeout(deadline, async {
            while scheduler.pending() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await
        .is_ok()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.audit.records()
    }

    pub fn revocations(&self) -> Vec<Revocation> {
        self.platform.revocations()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Run the simulate command
pub async fn execute(
    config_path: Option<String>,
    events: String,
    drain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    let config = WardenConfig::load(&config_path)?;
    super::logging::init(&config.logging)?;

    let events = if events == "-" {
        parse_events(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(&events)
            .map_err(|e| format!("Failed to open events file '{}': {}", events, e))?;
        parse_events(file)?
    };

    println!("Config: {}", config_path.display());
    println!("Replaying {} events", events.len());
    println!();

    let mut simulator = Simulator::new(&config.gate)?;
    for event in events {
        println!("  {}", simulator.apply(event).await);
    }

    if drain && !simulator.drain().await {
        println!("  scheduled enforcement still pending at exit");
    }

    println!();
    let mut records = simulator.records();
    records.reverse();
    print!("{}", format_audit_log(&records, simulator.now_ms()));

    let revocations = simulator.revocations();
    println!("Revocations: {}", revocations.len());
    for revocation in revocations {
        println!("  {}: {}", revocation.subject, revocation.reason);
    }

    Ok(())
}
