//! Warden - Verification Gate Bot Core
//!
//! New members sit behind a restricted gate role until they verify with a
//! short-lived code. Members who stay gated through the enforcement window
//! lose access automatically.
//!
//! Key principles:
//! - Verification state is ephemeral (in-memory only)
//! - One enforcement timer per subject, last writer wins
//! - Decisions are made on fresh membership snapshots, re-checked after a
//!   grace period
//! - Every decision is audited; enforcement failures never crash the process
//!
//! The chat platform is an external collaborator behind `PlatformClient`.

pub mod clock;
pub mod gatekeeper;
pub mod platform;
pub mod verification;

pub use clock::Clock;
pub use gatekeeper::{GateConfig, GateEnforcementWorkflow};
pub use platform::{PlatformClient, RoleId, SubjectId};
