//! Error types for the command boundary.
//!
//! Every [`CommandError`] maps to one user-visible failure class. A failing
//! command never corrupts ledger state and never prevents later commands;
//! the transport renders these however it likes. [`EngineError`] is the one
//! non-recoverable case: a mutation whose transaction record could not be
//! emitted to the permanent log.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Target;
use crate::ledger::ActorId;
use crate::transport::Role;

/// Which grammatical slot a token was used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSlot {
    Item,
    Variant,
}

impl fmt::Display for TokenSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSlot::Item => write!(f, "item"),
            TokenSlot::Variant => write!(f, "variant"),
        }
    }
}

/// User-visible command failures. Recoverable: the ledger is untouched.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandError {
    #[error("'{token}' matches nothing in the catalog")]
    UnknownToken { token: String },

    #[error("'{token}' is ambiguous; it matches: {}", .candidates.join(", "))]
    AmbiguousToken {
        token: String,
        candidates: Vec<String>,
    },

    #[error("'{token}' used where a name from the {expected} slot was expected")]
    WrongSlot { token: String, expected: TokenSlot },

    #[error("'{variant}' is not a variant of item '{item}'")]
    VariantNotApplicable { item: String, variant: String },

    #[error("more than one recorded holding matches; name the item and variant explicitly")]
    AmbiguousDefault { candidates: Vec<Target> },

    #[error("no item types recorded yet")]
    NoRecordsYet,

    #[error("count would become negative ({attempted}); current count is {current}")]
    NegativeValue { current: i64, attempted: i64 },

    #[error("a count of zero is not a useful transfer")]
    ZeroCount,

    #[error("cannot reverse {requested} items; only {posted} are posted and unconfirmed")]
    InsufficientForReversal { posted: i64, requested: i64 },

    #[error("nothing to remove")]
    NothingToRemove,

    #[error("no pending dropbox entries")]
    NothingPending,

    #[error("more than one maker has pending entries; name one, or confirm all")]
    AmbiguousPending { makers: Vec<ActorId> },

    #[error("the {role} role is required for this command")]
    Unauthorized { role: Role },

    #[error("'{collector}' does not hold the collector role, so the drop could never be confirmed")]
    DropTargetNotCollector { collector: ActorId },

    #[error("'{verb}' is not a command I know")]
    UnknownCommand { verb: String },

    #[error("{message}")]
    BadArgument { message: String },
}

impl CommandError {
    /// Arithmetic left the representable count range.
    pub(crate) fn overflow() -> Self {
        CommandError::BadArgument {
            message: "count is out of range".into(),
        }
    }
}

/// Non-recoverable engine failures.
///
/// Emission failure means the in-memory ledger can no longer be trusted to
/// survive a restart, so the caller must treat this as fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to emit transaction record to the permanent log; state would be lost on restart")]
    Emission(#[source] anyhow::Error),
}
