//! The transfer protocol: `collect from`, `drop` and `confirm`.
//!
//! Planners here take an already-resolved target and the current ledger
//! and produce the absolute records to emit plus the structured outcome.
//! Nothing is mutated: the engine emits the records to the permanent log
//! first and folds them into the ledger afterwards, which makes every
//! transfer all-or-nothing per command.
//!
//! The arithmetic asymmetry is deliberate domain policy: a transfer that
//! overdraws its source clamps the source to zero (the collector takes
//! whatever is left), while a plain count that would go negative is
//! rejected (direct counts must be accurate).

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::Target;
use crate::error::CommandError;
use crate::ledger::{ActorId, BoxKind, Count, Ledger, RecordOp};
use crate::transport::{ConfirmedEntry, ReplyBody};

/// Amount argument of a `drop`: an explicit signed count, or the maker's
/// entire current holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAmount {
    All,
    Count(Count),
}

/// A validated mutation, ready to emit and apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    /// Records to append, in order, as (owning actor, payload).
    pub ops: Vec<(ActorId, RecordOp)>,
    /// The structured result to hand back to the transport.
    pub outcome: ReplyBody,
}

fn count_op(box_kind: BoxKind, target: &Target, total: Count) -> RecordOp {
    RecordOp::Count {
        box_kind,
        item: target.item.clone(),
        variant: target.variant.clone(),
        total,
    }
}

fn dropbox_op(collector: &ActorId, target: &Target, total: Count) -> RecordOp {
    RecordOp::DropboxSet {
        collector: collector.clone(),
        item: target.item.clone(),
        variant: target.variant.clone(),
        total,
    }
}

/// Single-step transfer: move items from a maker's box straight into the
/// collector's box. Overdraw clamps the maker to zero and transfers what
/// was actually there; a maker with nothing of the target yields
/// [`CommandError::ZeroCount`].
pub fn plan_collect_from(
    ledger: &Ledger,
    collector: &ActorId,
    maker: &ActorId,
    target: &Target,
    requested: Count,
) -> Result<Planned, CommandError> {
    let current = ledger.count_of(maker, BoxKind::Maker, target).unwrap_or(0);

    if requested < 0 {
        return Err(CommandError::NegativeValue {
            current,
            attempted: requested,
        });
    }
    if requested == 0 {
        return Err(CommandError::ZeroCount);
    }

    // The clamp may leave nothing to move; an empty transfer is rejected
    // rather than materializing zero rows for the maker.
    let transferred = requested.min(current);
    if transferred == 0 {
        return Err(CommandError::ZeroCount);
    }
    let maker_remaining = current - transferred;
    let collector_total = ledger
        .count_of(collector, BoxKind::Collector, target)
        .unwrap_or(0)
        .checked_add(transferred)
        .ok_or_else(CommandError::overflow)?;

    debug!(%maker, %collector, %target, requested, transferred, "planned collect from");

    Ok(Planned {
        ops: vec![
            (maker.clone(), count_op(BoxKind::Maker, target, maker_remaining)),
            (
                collector.clone(),
                count_op(BoxKind::Collector, target, collector_total),
            ),
        ],
        outcome: ReplyBody::Collected {
            maker: maker.clone(),
            target: target.clone(),
            requested,
            transferred,
            maker_remaining,
            collector_total,
        },
    })
}

/// Phase one of the two-phase hand-off: post items into a collector's
/// dropbox (positive amount), or reverse a still-unconfirmed posting
/// (negative amount, bounded by what is posted).
pub fn plan_drop(
    ledger: &Ledger,
    maker: &ActorId,
    collector: &ActorId,
    target: &Target,
    amount: DropAmount,
) -> Result<Planned, CommandError> {
    let current = ledger.count_of(maker, BoxKind::Maker, target).unwrap_or(0);
    let posted = ledger.dropbox_count(collector, maker, target);

    let requested = match amount {
        DropAmount::All => current,
        DropAmount::Count(n) => n,
    };
    if requested == 0 {
        return Err(CommandError::ZeroCount);
    }

    let (moved, maker_remaining, posted_total) = if requested > 0 {
        let moved = requested.min(current);
        if moved == 0 {
            return Err(CommandError::ZeroCount);
        }
        let posted_total = posted.checked_add(moved).ok_or_else(CommandError::overflow)?;
        (moved, current - moved, posted_total)
    } else {
        let reversal = requested.checked_neg().ok_or_else(CommandError::overflow)?;
        if reversal > posted {
            return Err(CommandError::InsufficientForReversal {
                posted,
                requested: reversal,
            });
        }
        let maker_remaining = current
            .checked_add(reversal)
            .ok_or_else(CommandError::overflow)?;
        (requested, maker_remaining, posted - reversal)
    };

    debug!(%maker, %collector, %target, moved, posted_total, "planned drop");

    Ok(Planned {
        ops: vec![
            (maker.clone(), count_op(BoxKind::Maker, target, maker_remaining)),
            (maker.clone(), dropbox_op(collector, target, posted_total)),
        ],
        outcome: ReplyBody::Dropped {
            collector: collector.clone(),
            target: target.clone(),
            moved,
            posted_total,
            maker_remaining,
        },
    })
}

/// Phase two: a collector claims pending dropbox entries into their
/// permanent box. Each confirmed entry is deleted outright - confirmed
/// drops cannot be unconfirmed.
pub fn plan_confirm(
    ledger: &Ledger,
    collector: &ActorId,
    maker: Option<&ActorId>,
    all: bool,
) -> Result<Planned, CommandError> {
    let entries = if all {
        ledger.pending_for(collector, None)
    } else if let Some(maker) = maker {
        ledger.pending_for(collector, Some(maker))
    } else {
        let makers = ledger.pending_makers(collector);
        match makers.len() {
            0 => return Err(CommandError::NothingPending),
            1 => ledger.pending_for(collector, Some(&makers[0])),
            _ => return Err(CommandError::AmbiguousPending { makers }),
        }
    };
    if entries.is_empty() {
        return Err(CommandError::NothingPending);
    }

    // Running totals per target: `confirm all` may fold entries from
    // several makers into the same collector row.
    let mut totals: BTreeMap<Target, Count> = BTreeMap::new();
    let mut ops = Vec::new();
    let mut confirmed = Vec::new();

    for entry in entries {
        let total = totals.entry(entry.target.clone()).or_insert_with(|| {
            ledger
                .count_of(collector, BoxKind::Collector, &entry.target)
                .unwrap_or(0)
        });
        *total += entry.count;

        ops.push((
            collector.clone(),
            count_op(BoxKind::Collector, &entry.target, *total),
        ));
        ops.push((entry.maker.clone(), dropbox_op(collector, &entry.target, 0)));

        confirmed.push(ConfirmedEntry {
            maker: entry.maker,
            target: entry.target,
            count: entry.count,
            collector_total: *total,
        });
    }

    debug!(%collector, entries = confirmed.len(), "planned confirm");

    Ok(Planned {
        ops,
        outcome: ReplyBody::Confirmed { entries: confirmed },
    })
}
