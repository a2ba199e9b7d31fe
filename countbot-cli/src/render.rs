//! Plain-text rendering of structured replies.
//!
//! The engine hands back data; everything about presentation lives here.
//! Row sets become `tabled` tables, single outcomes become one-line
//! sentences.

use tabled::settings::Style;
use tabled::{Table, Tabled};

use countbot_core::ledger::{DropboxRow, HoldingRow};
use countbot_core::report::ReportView;
use countbot_core::transport::ReplyBody;

#[derive(Tabled)]
struct HoldingLine {
    actor: String,
    item: String,
    variant: String,
    count: i64,
    updated: String,
}

impl From<&HoldingRow> for HoldingLine {
    fn from(row: &HoldingRow) -> Self {
        Self {
            actor: row.actor.to_string(),
            item: row.target.item.clone(),
            variant: row.target.variant.clone().unwrap_or_default(),
            count: row.count,
            updated: row.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Tabled)]
struct DropboxLine {
    maker: String,
    collector: String,
    item: String,
    variant: String,
    count: i64,
}

impl From<&DropboxRow> for DropboxLine {
    fn from(row: &DropboxRow) -> Self {
        Self {
            maker: row.maker.to_string(),
            collector: row.collector.to_string(),
            item: row.target.item.clone(),
            variant: row.target.variant.clone().unwrap_or_default(),
            count: row.count,
        }
    }
}

#[derive(Tabled)]
struct SummaryLine {
    item: String,
    variant: String,
    total: i64,
    makers: i64,
    dropboxes: i64,
    collectors: i64,
}

fn table<T: Tabled>(lines: impl IntoIterator<Item = T>) -> String {
    let mut table = Table::new(lines);
    table.with(Style::sharp());
    table.to_string()
}

fn report(view: &ReportView) -> String {
    let mut out = String::new();
    if view.summary.is_empty() {
        out.push_str("nothing in stock");
    } else {
        out.push_str(&table(view.summary.iter().map(|row| SummaryLine {
            item: row.target.item.clone(),
            variant: row.target.variant.clone().unwrap_or_default(),
            total: row.total,
            makers: row.maker,
            dropboxes: row.dropbox,
            collectors: row.collector,
        })));
    }
    for (title, rows) in [("makers", &view.makers), ("collectors", &view.collectors)] {
        if !rows.is_empty() {
            out.push_str(&format!("\n\n{title}:\n"));
            out.push_str(&table(rows.iter().map(HoldingLine::from)));
        }
    }
    if !view.dropboxes.is_empty() {
        out.push_str("\n\ndropboxes:\n");
        out.push_str(&table(view.dropboxes.iter().map(DropboxLine::from)));
    }
    out
}

/// Render one reply body as plain text.
pub fn render(body: &ReplyBody) -> String {
    match body {
        ReplyBody::Inventory {
            box_kind,
            rows,
            dropped,
        } => {
            let mut out = if rows.is_empty() {
                format!("your {box_kind} box is empty")
            } else {
                format!(
                    "your {box_kind} box:\n{}",
                    table(rows.iter().map(HoldingLine::from))
                )
            };
            if !dropped.is_empty() {
                out.push_str(&format!(
                    "\n\nawaiting confirmation:\n{}",
                    table(dropped.iter().map(DropboxLine::from))
                ));
            }
            out
        }
        ReplyBody::CountUpdated {
            box_kind,
            target,
            previous,
            total,
        } => match previous {
            Some(previous) => {
                format!("{box_kind} box: {target} = {total} (was {previous})")
            }
            None => format!("{box_kind} box: {target} = {total}"),
        },
        ReplyBody::Removed { box_kind, targets } => {
            let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
            format!("removed from {box_kind} box: {}", names.join(", "))
        }
        ReplyBody::Collected {
            maker,
            target,
            requested,
            transferred,
            maker_remaining,
            collector_total,
        } => format!(
            "collected {transferred} of {requested} requested {target} from {maker} \
             ({maker_remaining} left with them, {collector_total} now in your box)"
        ),
        ReplyBody::Dropped {
            collector,
            target,
            moved,
            posted_total,
            maker_remaining,
        } => {
            if *moved >= 0 {
                format!(
                    "dropped {moved} {target} at {collector}'s dropbox \
                     ({posted_total} pending, {maker_remaining} left in your box)"
                )
            } else {
                format!(
                    "took back {} {target} from {collector}'s dropbox \
                     ({posted_total} still pending, {maker_remaining} now in your box)",
                    -moved
                )
            }
        }
        ReplyBody::Confirmed { entries } => entries
            .iter()
            .map(|e| {
                format!(
                    "confirmed {} {} from {} ({} now in your box)",
                    e.count, e.target, e.maker, e.collector_total
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ReplyBody::Report(view) => report(view),
        ReplyBody::Identity { pid, version } => {
            format!("countbot {version}, pid {pid}")
        }
        ReplyBody::RoleMembers { role, members } => {
            if members.is_empty() {
                format!("no {role}s configured")
            } else {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                format!("{role}s: {}", names.join(", "))
            }
        }
        ReplyBody::Shutdown => "shutting down".to_string(),
        ReplyBody::Error { error } => format!("error: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countbot_core::catalog::Target;
    use countbot_core::error::CommandError;
    use countbot_core::ledger::{ActorId, BoxKind};

    #[test]
    fn count_update_mentions_the_previous_total() {
        let text = render(&ReplyBody::CountUpdated {
            box_kind: BoxKind::Maker,
            target: Target::new("verkstan", Some("PLA")),
            previous: Some(12),
            total: 24,
        });
        assert_eq!(text, "maker box: verkstan PLA = 24 (was 12)");
    }

    #[test]
    fn empty_inventory_says_so() {
        let text = render(&ReplyBody::Inventory {
            box_kind: BoxKind::Collector,
            rows: vec![],
            dropped: vec![],
        });
        assert_eq!(text, "your collector box is empty");
    }

    #[test]
    fn reversal_renders_as_a_take_back() {
        let text = render(&ReplyBody::Dropped {
            collector: ActorId::from("katy"),
            target: Target::new("prusa", Some("PLA")),
            moved: -10,
            posted_total: 15,
            maker_remaining: 15,
        });
        assert!(text.starts_with("took back 10 prusa PLA"));
    }

    #[test]
    fn errors_use_their_display_form() {
        let text = render(&ReplyBody::Error {
            error: CommandError::NoRecordsYet,
        });
        assert!(text.starts_with("error: "));
    }
}
