//! Verification state: issued codes and in-progress answers.
//!
//! All of it is ephemeral. Nothing here is persisted; a restart simply means
//! subjects request a new code.

pub mod selection;
pub mod session;

pub use selection::{Category, SelectionSnapshot, SelectionState};
pub use session::{
    CodeAlphabet, SessionFailure, SessionStore, SessionTicket, CODE_LENGTH, DEFAULT_ALPHABET,
    DEFAULT_EXPIRATION,
};
