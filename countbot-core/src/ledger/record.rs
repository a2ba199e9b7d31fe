//! Transaction records - the append-only facts the ledger is a fold over.
//!
//! Records carry absolute post-state counts, never deltas. `add`, `drop`
//! and the transfer commands all reduce to one or more absolute records,
//! so replay is a deterministic last-write-wins fold and never needs to
//! re-run command semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActorId, BoxKind, Count};

/// The verb-specific payload of a transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RecordOp {
    /// Absolute count for one holding row. Creates the row if absent;
    /// a total of zero keeps the row alive.
    Count {
        box_kind: BoxKind,
        item: String,
        variant: Option<String>,
        total: Count,
    },

    /// Delete holding rows. `item: None` deletes every row the actor has
    /// in the box.
    Remove {
        box_kind: BoxKind,
        item: Option<String>,
        variant: Option<String>,
    },

    /// Absolute count for the dropbox entry `(collector, actor-as-maker,
    /// item, variant)`. A total of zero deletes the entry.
    DropboxSet {
        collector: ActorId,
        item: String,
        variant: Option<String>,
        total: Count,
    },
}

/// One immutable fact in the replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub seq: u64,
    pub at: DateTime<Utc>,
    /// The actor whose state this record describes (for `DropboxSet`,
    /// the maker side of the entry).
    pub actor: ActorId,
    #[serde(flatten)]
    pub op: RecordOp,
}

impl TransactionRecord {
    pub fn new(seq: u64, actor: ActorId, op: RecordOp) -> Self {
        Self {
            id: Uuid::now_v7(),
            seq,
            at: Utc::now(),
            actor,
            op,
        }
    }
}
