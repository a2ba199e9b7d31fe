//! Read-only report aggregation over the ledger.
//!
//! Produces a per-(item, variant) summary across the three box kinds plus
//! the detailed per-actor rows, already filtered and ordered; the
//! transport decides how to render it (the CLI uses tables, a chat
//! transport would use code blocks).

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Target};
use crate::ledger::{Count, DropboxRow, HoldingRow, Ledger};

/// One summary line: totals for a catalog combination with any stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub target: Target,
    pub total: Count,
    pub maker: Count,
    pub dropbox: Count,
    pub collector: Count,
}

/// The full structured report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportView {
    pub summary: Vec<SummaryRow>,
    pub makers: Vec<HoldingRow>,
    pub dropboxes: Vec<DropboxRow>,
    pub collectors: Vec<HoldingRow>,
}

/// Aggregate the ledger, optionally narrowed to one resolved item (and
/// variant). Summary rows follow catalog order and skip combinations with
/// no stock anywhere.
pub fn generate(
    catalog: &Catalog,
    ledger: &Ledger,
    item: Option<&str>,
    variant: Option<&str>,
) -> ReportView {
    let matches = |target: &Target| {
        item.is_none_or(|i| target.item == i)
            && variant.is_none_or(|v| target.variant.as_deref() == Some(v))
    };

    let makers: Vec<HoldingRow> = ledger
        .all_rows()
        .into_iter()
        .filter(|r| r.box_kind == crate::ledger::BoxKind::Maker && matches(&r.target))
        .collect();
    let collectors: Vec<HoldingRow> = ledger
        .all_rows()
        .into_iter()
        .filter(|r| r.box_kind == crate::ledger::BoxKind::Collector && matches(&r.target))
        .collect();
    let dropboxes: Vec<DropboxRow> = ledger
        .all_dropbox_rows()
        .into_iter()
        .filter(|r| matches(&r.target))
        .collect();

    let mut summary = Vec::new();
    for target in catalog.all_targets() {
        if !matches(&target) {
            continue;
        }
        let maker: Count = makers
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.count)
            .sum();
        let dropbox: Count = dropboxes
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.count)
            .sum();
        let collector: Count = collectors
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.count)
            .sum();
        let total = maker + dropbox + collector;
        if total == 0 {
            continue;
        }
        summary.push(SummaryRow {
            target,
            total,
            maker,
            dropbox,
            collector,
        });
    }

    ReportView {
        summary,
        makers,
        dropboxes,
        collectors,
    }
}
