//! The ledger - the in-memory projection of every box for every actor.
//!
//! The ledger is rebuilt from scratch by replaying the external
//! transaction log (see [`replay`]) and afterwards mutated only through
//! [`Ledger::apply`] with records that have already been emitted to the
//! permanent log. Command semantics (validation, clamping, inference)
//! live in the engine and transfer modules; this module is arithmetic
//! and bookkeeping over rows.
//!
//! A holding row's existence is independent of its value: a zero-count
//! row stays until explicitly removed, which keeps default-item inference
//! working after a reset. Dropbox entries are the opposite - a zero entry
//! is deleted, because an empty pending hand-off means nothing.

pub mod record;
pub mod replay;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::Target;

pub use record::{RecordOp, TransactionRecord};

pub type Count = i64;

/// Opaque actor identity handed to us by the transport.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The two per-actor boxes. Dropbox entries are keyed by two actors and
/// kept in their own table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BoxKind {
    Maker,
    Collector,
}

impl fmt::Display for BoxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxKind::Maker => write!(f, "maker"),
            BoxKind::Collector => write!(f, "collector"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Holding {
    count: Count,
    updated_at: DateTime<Utc>,
}

/// One holding row, as handed out by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingRow {
    pub actor: ActorId,
    pub box_kind: BoxKind,
    pub target: Target,
    pub count: Count,
    pub updated_at: DateTime<Utc>,
}

/// One dropbox row: stock a maker has handed off to a collector, not yet
/// confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropboxRow {
    pub maker: ActorId,
    pub collector: ActorId,
    pub target: Target,
    pub count: Count,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DropboxKey {
    collector: ActorId,
    maker: ActorId,
    target: Target,
}

/// The full projection. Single source of truth for all boxes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    holdings: BTreeMap<(ActorId, BoxKind, Target), Holding>,
    dropbox: BTreeMap<DropboxKey, Holding>,
    last_seq: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last applied record.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Current count for one row. `None` means the row does not exist,
    /// which is distinct from a zero count.
    pub fn count_of(&self, actor: &ActorId, box_kind: BoxKind, target: &Target) -> Option<Count> {
        self.holdings
            .get(&(actor.clone(), box_kind, target.clone()))
            .map(|h| h.count)
    }

    /// All rows one actor has in one box, in catalog-key order.
    pub fn rows(&self, actor: &ActorId, box_kind: BoxKind) -> Vec<HoldingRow> {
        self.holdings
            .iter()
            .filter(|((a, b, _), _)| a == actor && *b == box_kind)
            .map(|((a, b, t), h)| HoldingRow {
                actor: a.clone(),
                box_kind: *b,
                target: t.clone(),
                count: h.count,
                updated_at: h.updated_at,
            })
            .collect()
    }

    /// Every holding row in the ledger (for reports).
    pub fn all_rows(&self) -> Vec<HoldingRow> {
        self.holdings
            .iter()
            .map(|((a, b, t), h)| HoldingRow {
                actor: a.clone(),
                box_kind: *b,
                target: t.clone(),
                count: h.count,
                updated_at: h.updated_at,
            })
            .collect()
    }

    /// Targets an actor holds in a box, optionally narrowed to one item.
    /// This is the candidate set for default-item inference.
    pub fn targets_for(
        &self,
        actor: &ActorId,
        box_kind: BoxKind,
        item: Option<&str>,
    ) -> Vec<Target> {
        self.holdings
            .keys()
            .filter(|(a, b, t)| {
                a == actor && *b == box_kind && item.is_none_or(|i| t.item == i)
            })
            .map(|(_, _, t)| t.clone())
            .collect()
    }

    /// Pending dropbox count for one `(collector, maker, target)` key.
    /// Zero means no entry.
    pub fn dropbox_count(&self, collector: &ActorId, maker: &ActorId, target: &Target) -> Count {
        self.dropbox
            .get(&DropboxKey {
                collector: collector.clone(),
                maker: maker.clone(),
                target: target.clone(),
            })
            .map(|h| h.count)
            .unwrap_or(0)
    }

    /// Every dropbox entry addressed to one collector, optionally from one
    /// maker only.
    pub fn pending_for(&self, collector: &ActorId, maker: Option<&ActorId>) -> Vec<DropboxRow> {
        self.dropbox
            .iter()
            .filter(|(k, _)| {
                k.collector == *collector && maker.is_none_or(|m| k.maker == *m)
            })
            .map(|(k, h)| Self::dropbox_row(k, h))
            .collect()
    }

    /// Distinct makers with pending entries for this collector.
    pub fn pending_makers(&self, collector: &ActorId) -> Vec<ActorId> {
        let mut makers: Vec<ActorId> = self
            .dropbox
            .keys()
            .filter(|k| k.collector == *collector)
            .map(|k| k.maker.clone())
            .collect();
        makers.dedup();
        makers
    }

    /// Every dropbox entry a maker has outstanding (for the maker's own
    /// inventory view).
    pub fn dropped_by(&self, maker: &ActorId) -> Vec<DropboxRow> {
        self.dropbox
            .iter()
            .filter(|(k, _)| k.maker == *maker)
            .map(|(k, h)| Self::dropbox_row(k, h))
            .collect()
    }

    /// Every dropbox entry in the ledger (for reports).
    pub fn all_dropbox_rows(&self) -> Vec<DropboxRow> {
        self.dropbox
            .iter()
            .map(|(k, h)| Self::dropbox_row(k, h))
            .collect()
    }

    fn dropbox_row(key: &DropboxKey, holding: &Holding) -> DropboxRow {
        DropboxRow {
            maker: key.maker.clone(),
            collector: key.collector.clone(),
            target: key.target.clone(),
            count: holding.count,
            updated_at: holding.updated_at,
        }
    }

    /// Fold one already-emitted record into the projection.
    ///
    /// Apply is total: malformed facts are logged and skipped rather than
    /// failing, so one bad historical record cannot wedge a restart.
    pub fn apply(&mut self, record: &TransactionRecord) {
        self.last_seq = self.last_seq.max(record.seq);
        match &record.op {
            RecordOp::Count {
                box_kind,
                item,
                variant,
                total,
            } => {
                if *total < 0 {
                    warn!(seq = record.seq, total, "skipping negative count record");
                    return;
                }
                let target = Target {
                    item: item.clone(),
                    variant: variant.clone(),
                };
                self.holdings.insert(
                    (record.actor.clone(), *box_kind, target),
                    Holding {
                        count: *total,
                        updated_at: record.at,
                    },
                );
            }
            RecordOp::Remove {
                box_kind,
                item,
                variant,
            } => match item {
                None => {
                    self.holdings.retain(|(a, b, _), _| {
                        !(a == &record.actor && b == box_kind)
                    });
                }
                Some(item) => {
                    let target = Target {
                        item: item.clone(),
                        variant: variant.clone(),
                    };
                    self.holdings
                        .remove(&(record.actor.clone(), *box_kind, target));
                }
            },
            RecordOp::DropboxSet {
                collector,
                item,
                variant,
                total,
            } => {
                let key = DropboxKey {
                    collector: collector.clone(),
                    maker: record.actor.clone(),
                    target: Target {
                        item: item.clone(),
                        variant: variant.clone(),
                    },
                };
                if *total > 0 {
                    self.dropbox.insert(
                        key,
                        Holding {
                            count: *total,
                            updated_at: record.at,
                        },
                    );
                } else {
                    if *total < 0 {
                        warn!(seq = record.seq, total, "clamping negative dropbox record");
                    }
                    self.dropbox.remove(&key);
                }
            }
        }
    }
}
