//! Short-lived verification sessions
//!
//! Each subject holds at most one live session: a 4-character code and an
//! expiry. Sessions are in-memory only, replaced when a new code is issued,
//! consumed by a successful validation and purged lazily once expired.

use super::selection::SelectionSnapshot;
use crate::clock::Clock;
use crate::platform::SubjectId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Number of characters in an issued code.
pub const CODE_LENGTH: usize = 4;

/// Default code alphabet: upper-case letters and digits without the
/// look-alikes `I`, `O`, `0` and `1`.
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default session lifetime (60 seconds).
pub const DEFAULT_EXPIRATION: Duration = Duration::from_millis(60_000);

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    #[error("No verification code was issued, or it was already used")]
    Missing,

    #[error("The verification code has expired")]
    Expired,

    #[error("The verification code does not match")]
    Mismatch,
}

/// Validated set of characters codes are drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAlphabet {
    chars: Vec<char>,
}

impl CodeAlphabet {
    /// Build an alphabet, dropping duplicate characters.
    ///
    /// Requires at least two distinct ASCII alphanumeric characters. Letters
    /// are normalised to upper case since validation ignores case anyway.
    pub fn new(alphabet: &str) -> Result<Self, String> {
        let mut chars: Vec<char> = Vec::new();
        for c in alphabet.chars() {
            if !c.is_ascii_alphanumeric() {
                return Err(format!(
                    "Code alphabet may only contain ASCII letters and digits, found '{}'",
                    c
                ));
            }
            let c = c.to_ascii_uppercase();
            if !chars.contains(&c) {
                chars.push(c);
            }
        }
        if chars.len() < 2 {
            return Err("Code alphabet needs at least two distinct characters".to_string());
        }
        Ok(Self { chars })
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c.to_ascii_uppercase())
    }

    /// Draw a code uniformly at random.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> String {
        (0..CODE_LENGTH)
            .map(|_| self.chars[rng.gen_range(0..self.chars.len())])
            .collect()
    }
}

impl Default for CodeAlphabet {
    fn default() -> Self {
        Self {
            chars: DEFAULT_ALPHABET.chars().collect(),
        }
    }
}

/// One subject's live verification attempt.
#[derive(Debug, Clone)]
struct VerificationSession {
    code: String,
    meta: Option<SelectionSnapshot>,
    created_at_ms: u64,
    expires_at_ms: u64,
}

/// What the caller shows the subject after issuing a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub code: String,
    /// Unix milliseconds after which the code is rejected
    pub expires_at_ms: u64,
}

/// Issues and checks verification codes.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SubjectId, VerificationSession>,
    expiration: Duration,
    alphabet: CodeAlphabet,
    clock: Clock,
}

impl SessionStore {
    pub fn new(expiration: Duration, alphabet: CodeAlphabet, clock: Clock) -> Self {
        Self {
            sessions: DashMap::new(),
            expiration,
            alphabet,
            clock,
        }
    }

    /// Issue a fresh code, replacing any session the subject already had.
    pub fn create_session(
        &self,
        subject: &SubjectId,
        meta: Option<SelectionSnapshot>,
    ) -> SessionTicket {
        let now = self.clock.now_ms();
        let code = self.alphabet.generate(&mut rand::thread_rng());
        let expires_at_ms = now.saturating_add(self.expiration.as_millis() as u64);

        let replaced = self
            .sessions
            .insert(
                subject.clone(),
                VerificationSession {
                    code: code.clone(),
                    meta,
                    created_at_ms: now,
                    expires_at_ms,
                },
            )
            .is_some();
        debug!(subject = %subject, replaced, expires_at_ms, "verification session created");

        SessionTicket {
            code,
            expires_at_ms,
        }
    }

    /// Check a submitted code.
    ///
    /// Comparison trims whitespace and ignores case. A match consumes the
    /// session and returns the selection snapshot stored with it. An expired
    /// session is purged; a mismatch leaves the session in place for a retry.
    pub fn validate(
        &self,
        subject: &SubjectId,
        submitted: &str,
    ) -> Result<Option<SelectionSnapshot>, SessionFailure> {
        let now = self.clock.now_ms();
        let submitted = submitted.trim();

        let outcome = match self.sessions.entry(subject.clone()) {
            Entry::Vacant(_) => Err(SessionFailure::Missing),
            Entry::Occupied(entry) => {
                if now > entry.get().expires_at_ms {
                    entry.remove();
                    Err(SessionFailure::Expired)
                } else if !entry.get().code.eq_ignore_ascii_case(submitted) {
                    Err(SessionFailure::Mismatch)
                } else {
                    let session = entry.remove();
                    debug!(
                        subject = %subject,
                        elapsed_ms = now.saturating_sub(session.created_at_ms),
                        "verification code accepted"
                    );
                    Ok(session.meta)
                }
            }
        };

        if let Err(failure) = &outcome {
            debug!(subject = %subject, ?failure, "verification code rejected");
        }
        outcome
    }

    /// Drop the subject's session, if any.
    pub fn clear_session(&self, subject: &SubjectId) {
        self.sessions.remove(subject);
    }

    /// Remove every expired session. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now <= s.expires_at_ms);
        before.saturating_sub(self.sessions.len())
    }

    /// Number of sessions held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
