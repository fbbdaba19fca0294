//! Gate configuration
//!
//! Everything the core needs is a plain value here: session lifetime,
//! enforcement window, grace period, gate and exempt roles, code alphabet.
//! `GateConfig` is what operators write in the `[gate]` table of the config
//! file; `EnforcementPolicy` is the validated, resolved form the workflow
//! runs on.

use crate::platform::RoleId;
use crate::verification::{CodeAlphabet, DEFAULT_ALPHABET};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Base minimum dwell time the profiles are derived from (2.5 minutes).
pub const BASE_LOWER_AGE_MS: u64 = 150_000;

/// Production minimum dwell time: 5 × base (12.5 minutes).
pub const PRODUCTION_LOWER_AGE_MS: u64 = 5 * BASE_LOWER_AGE_MS;

/// Testing minimum dwell time (30 seconds).
pub const TESTING_LOWER_AGE_MS: u64 = 30_000;

/// Default session lifetime.
pub const DEFAULT_EXPIRATION_MS: u64 = 60_000;

/// Default wait between detecting non-compliance and the final re-check.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Upper bound for every configured duration (one year).
pub const MAX_DURATION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Which set of default timings applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementProfile {
    #[default]
    Production,
    Testing,
}

impl EnforcementProfile {
    pub fn default_lower_age_ms(&self) -> u64 {
        match self {
            EnforcementProfile::Production => PRODUCTION_LOWER_AGE_MS,
            EnforcementProfile::Testing => TESTING_LOWER_AGE_MS,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Gate role must not be empty")]
    MissingGateRole,

    #[error("Invalid code alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("Session expiration must be greater than zero")]
    ZeroExpiration,

    #[error("Enforcement window is empty: upper_age_ms ({upper}) < lower_age_ms ({lower})")]
    InvalidWindow { lower: u64, upper: u64 },

    #[error("{field} ({value}) exceeds the maximum of {max} ms")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Operator-facing gate configuration (`[gate]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Restricted role assigned at join and removed on verification
    pub gate_role: RoleId,

    /// Roles that excuse a subject from enforcement
    #[serde(default)]
    pub exempt_roles: BTreeSet<RoleId>,

    /// Timing defaults to use when `lower_age_ms` is not set
    #[serde(default)]
    pub profile: EnforcementProfile,

    /// Verification code lifetime
    #[serde(default = "default_expiration_ms")]
    pub expiration_ms: u64,

    /// Minimum membership age before the first check (profile default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_age_ms: Option<u64>,

    /// Maximum membership age still subject to enforcement (2 × lower if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_age_ms: Option<u64>,

    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    #[serde(default = "default_code_alphabet")]
    pub code_alphabet: String,
}

fn default_expiration_ms() -> u64 {
    DEFAULT_EXPIRATION_MS
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_code_alphabet() -> String {
    DEFAULT_ALPHABET.to_string()
}

impl GateConfig {
    /// Configuration with every default for the given gate role.
    pub fn new(gate_role: RoleId) -> Self {
        Self {
            gate_role,
            exempt_roles: BTreeSet::new(),
            profile: EnforcementProfile::default(),
            expiration_ms: DEFAULT_EXPIRATION_MS,
            lower_age_ms: None,
            upper_age_ms: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            code_alphabet: default_code_alphabet(),
        }
    }

    pub fn lower_age_ms(&self) -> u64 {
        self.lower_age_ms
            .unwrap_or_else(|| self.profile.default_lower_age_ms())
    }

    pub fn upper_age_ms(&self) -> u64 {
        self.upper_age_ms
            .unwrap_or_else(|| self.lower_age_ms().saturating_mul(2))
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    pub fn alphabet(&self) -> Result<CodeAlphabet, ConfigError> {
        CodeAlphabet::new(&self.code_alphabet).map_err(ConfigError::InvalidAlphabet)
    }

    /// Check every value without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.enforcement_policy().map(|_| ())
    }

    /// Validate and resolve into the form the workflow runs on.
    pub fn enforcement_policy(&self) -> Result<EnforcementPolicy, ConfigError> {
        if self.gate_role.as_str().trim().is_empty() {
            return Err(ConfigError::MissingGateRole);
        }
        if self.expiration_ms == 0 {
            return Err(ConfigError::ZeroExpiration);
        }
        self.alphabet()?;

        let lower = self.lower_age_ms();
        let upper = self.upper_age_ms();
        for (field, value) in [
            ("expiration_ms", self.expiration_ms),
            ("lower_age_ms", lower),
            ("upper_age_ms", upper),
            ("grace_period_ms", self.grace_period_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    max: MAX_DURATION_MS,
                });
            }
        }
        if upper < lower {
            return Err(ConfigError::InvalidWindow { lower, upper });
        }

        Ok(EnforcementPolicy {
            gate_role: self.gate_role.clone(),
            exempt_roles: self.exempt_roles.clone(),
            lower_age: Duration::from_millis(lower),
            upper_age: Duration::from_millis(upper),
            grace_period: Duration::from_millis(self.grace_period_ms),
        })
    }
}

/// Resolved enforcement rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementPolicy {
    pub gate_role: RoleId,
    pub exempt_roles: BTreeSet<RoleId>,
    /// First check fires this long after join; also the window's lower bound
    pub lower_age: Duration,
    pub upper_age: Duration,
    pub grace_period: Duration,
}
