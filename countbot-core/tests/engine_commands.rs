//! End-to-end command flows through the engine: raw text in, structured
//! replies out, with an in-memory transaction log standing in for the
//! external sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use countbot_core::catalog::{Catalog, Target};
use countbot_core::engine::Engine;
use countbot_core::error::{CommandError, EngineError};
use countbot_core::ledger::{ActorId, BoxKind, TransactionRecord};
use countbot_core::transport::{
    Audience, Channel, Envelope, FixedRoleDirectory, Reply, ReplyBody, Role, TransactionSink,
};

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<TransactionRecord>>,
}

impl MemorySink {
    fn records(&self) -> Vec<TransactionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSink for MemorySink {
    async fn emit(&self, record: &TransactionRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl TransactionSink for FailingSink {
    async fn emit(&self, _record: &TransactionRecord) -> anyhow::Result<()> {
        anyhow::bail!("log unavailable")
    }
}

/// Collectors: katy, leon. Admin: freddie.
fn roles() -> Arc<FixedRoleDirectory> {
    Arc::new(FixedRoleDirectory::new(
        [ActorId::from("katy"), ActorId::from("leon")],
        [ActorId::from("freddie")],
    ))
}

fn engine() -> (Arc<MemorySink>, Engine) {
    let sink = Arc::new(MemorySink::default());
    let engine = Engine::new(Catalog::default(), roles(), sink.clone(), Vec::new());
    (sink, engine)
}

async fn send(engine: &Engine, actor: &str, text: &str) -> Vec<Reply> {
    engine
        .handle(&Envelope {
            actor: ActorId::from(actor),
            text: text.to_string(),
            channel: Channel::Public,
        })
        .await
        .unwrap()
}

fn sole_body(mut replies: Vec<Reply>) -> ReplyBody {
    assert_eq!(replies.len(), 1, "expected exactly one reply");
    replies.remove(0).body
}

fn error_of(replies: Vec<Reply>) -> CommandError {
    match sole_body(replies) {
        ReplyBody::Error { error } => error,
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn counting_again_defaults_to_the_only_recorded_target() {
    let (_, engine) = engine();

    let body = sole_body(send(&engine, "freddie", "count 12 verk pla").await);
    assert_eq!(
        body,
        ReplyBody::CountUpdated {
            box_kind: BoxKind::Maker,
            target: Target::new("verkstan", Some("PLA")),
            previous: None,
            total: 12,
        }
    );

    // No tokens at all: the single existing row wins.
    let body = sole_body(send(&engine, "freddie", "count 24").await);
    assert_eq!(
        body,
        ReplyBody::CountUpdated {
            box_kind: BoxKind::Maker,
            target: Target::new("verkstan", Some("PLA")),
            previous: Some(12),
            total: 24,
        }
    );
}

#[tokio::test]
async fn variant_of_the_wrong_item_is_a_mismatch_not_unknown() {
    let (_, engine) = engine();
    let error = error_of(send(&engine, "freddie", "count 1 visor petg").await);
    assert_eq!(
        error,
        CommandError::VariantNotApplicable {
            item: "visor".into(),
            variant: "petg".into(),
        }
    );
}

#[tokio::test]
async fn ambiguous_default_mutates_nothing() {
    let (sink, engine) = engine();
    send(&engine, "freddie", "count 5 verk pla").await;
    send(&engine, "freddie", "count 5 prusa pla").await;
    assert_eq!(sink.records().len(), 2);

    let error = error_of(send(&engine, "freddie", "count 30").await);
    assert!(matches!(error, CommandError::AmbiguousDefault { .. }));
    assert_eq!(sink.records().len(), 2);
}

#[tokio::test]
async fn add_and_reset_adjust_the_resolved_row() {
    let (_, engine) = engine();
    send(&engine, "ana", "count 10 earsaver").await;

    let body = sole_body(send(&engine, "ana", "add 5").await);
    assert_eq!(
        body,
        ReplyBody::CountUpdated {
            box_kind: BoxKind::Maker,
            target: Target::new("earsaver", None),
            previous: Some(10),
            total: 15,
        }
    );

    // A delta that would go below zero is rejected outright.
    let error = error_of(send(&engine, "ana", "add -20").await);
    assert_eq!(
        error,
        CommandError::NegativeValue {
            current: 15,
            attempted: -5,
        }
    );

    let body = sole_body(send(&engine, "ana", "reset").await);
    assert!(matches!(body, ReplyBody::CountUpdated { total: 0, .. }));

    // The zero row still exists, so bare counting still resolves.
    let body = sole_body(send(&engine, "ana", "count 3").await);
    assert!(matches!(
        body,
        ReplyBody::CountUpdated {
            previous: Some(0),
            total: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn remove_deletes_rows_and_then_there_is_no_default() {
    let (_, engine) = engine();
    send(&engine, "ana", "count 10 earsaver").await;

    let body = sole_body(send(&engine, "ana", "remove").await);
    assert_eq!(
        body,
        ReplyBody::Removed {
            box_kind: BoxKind::Maker,
            targets: vec![Target::new("earsaver", None)],
        }
    );

    let error = error_of(send(&engine, "ana", "count 5").await);
    assert_eq!(error, CommandError::NoRecordsYet);

    let error = error_of(send(&engine, "ana", "remove").await);
    assert_eq!(error, CommandError::NothingToRemove);
}

#[tokio::test]
async fn remove_all_clears_the_whole_box() {
    let (_, engine) = engine();
    send(&engine, "ana", "count 1 verk pla").await;
    send(&engine, "ana", "count 2 prusa pla").await;

    let body = sole_body(send(&engine, "ana", "remove all").await);
    match body {
        ReplyBody::Removed { targets, .. } => assert_eq!(targets.len(), 2),
        other => panic!("unexpected reply {other:?}"),
    }

    let ledger = engine.ledger().await;
    assert!(ledger.rows(&ActorId::from("ana"), BoxKind::Maker).is_empty());
}

#[tokio::test]
async fn bare_remove_with_several_rows_errors_and_mutates_nothing() {
    let (sink, engine) = engine();
    send(&engine, "ana", "count 5 verk pla").await;
    send(&engine, "ana", "count 7 prusa pla").await;
    assert_eq!(sink.records().len(), 2);

    let error = error_of(send(&engine, "ana", "remove").await);
    match error {
        CommandError::AmbiguousDefault { candidates } => assert_eq!(candidates.len(), 2),
        other => panic!("unexpected error {other:?}"),
    }

    // Nothing was emitted and both rows are intact.
    assert_eq!(sink.records().len(), 2);
    let ledger = engine.ledger().await;
    let ana = ActorId::from("ana");
    assert_eq!(
        ledger.count_of(&ana, BoxKind::Maker, &Target::new("verkstan", Some("PLA"))),
        Some(5)
    );
    assert_eq!(
        ledger.count_of(&ana, BoxKind::Maker, &Target::new("prusa", Some("PLA"))),
        Some(7)
    );
}

#[tokio::test]
async fn collect_verbs_require_the_collector_role() {
    let (_, engine) = engine();
    let error = error_of(send(&engine, "ana", "collect count 5 prusa pla").await);
    assert_eq!(
        error,
        CommandError::Unauthorized {
            role: Role::Collector,
        }
    );
    let error = error_of(send(&engine, "ana", "confirm").await);
    assert_eq!(
        error,
        CommandError::Unauthorized {
            role: Role::Collector,
        }
    );
}

#[tokio::test]
async fn collect_from_clamps_to_what_the_maker_has() {
    let (_, engine) = engine();
    send(&engine, "justin", "count 20 prusa pla").await;

    let body = sole_body(send(&engine, "katy", "collect from justin 150 prusa").await);
    assert_eq!(
        body,
        ReplyBody::Collected {
            maker: ActorId::from("justin"),
            target: Target::new("prusa", Some("PLA")),
            requested: 150,
            transferred: 20,
            maker_remaining: 0,
            collector_total: 20,
        }
    );

    let ledger = engine.ledger().await;
    assert_eq!(
        ledger.count_of(
            &ActorId::from("justin"),
            BoxKind::Maker,
            &Target::new("prusa", Some("PLA"))
        ),
        Some(0)
    );
}

#[tokio::test]
async fn drop_confirm_round_trip_moves_stock_to_the_collector() {
    let (_, engine) = engine();
    send(&engine, "justin", "count 20 prusa pla").await;

    // Drop at a non-collector is refused, naming the bad target.
    let error = error_of(send(&engine, "justin", "drop ana 5").await);
    assert_eq!(
        error,
        CommandError::DropTargetNotCollector {
            collector: ActorId::from("ana"),
        }
    );

    let body = sole_body(send(&engine, "justin", "drop katy 15").await);
    assert_eq!(
        body,
        ReplyBody::Dropped {
            collector: ActorId::from("katy"),
            target: Target::new("prusa", Some("PLA")),
            moved: 15,
            posted_total: 15,
            maker_remaining: 5,
        }
    );

    // Partial reversal while still pending.
    let body = sole_body(send(&engine, "justin", "drop katy -10").await);
    assert!(matches!(
        body,
        ReplyBody::Dropped {
            moved: -10,
            posted_total: 5,
            maker_remaining: 15,
            ..
        }
    ));

    let body = sole_body(send(&engine, "katy", "confirm").await);
    match body {
        ReplyBody::Confirmed { entries } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].count, 5);
            assert_eq!(entries[0].collector_total, 5);
        }
        other => panic!("unexpected reply {other:?}"),
    }

    // Once confirmed the reversal window is closed.
    let error = error_of(send(&engine, "justin", "drop katy -1").await);
    assert_eq!(
        error,
        CommandError::InsufficientForReversal {
            posted: 0,
            requested: 1,
        }
    );
}

#[tokio::test]
async fn additions_past_the_count_range_are_rejected() {
    let (sink, engine) = engine();
    let max = i64::MAX;
    send(&engine, "ana", &format!("count {max} earsaver")).await;
    assert_eq!(sink.records().len(), 1);

    let error = error_of(send(&engine, "ana", "add 1").await);
    assert!(matches!(error, CommandError::BadArgument { .. }));

    // The saturated row is untouched.
    assert_eq!(sink.records().len(), 1);
    let ledger = engine.ledger().await;
    assert_eq!(
        ledger.count_of(
            &ActorId::from("ana"),
            BoxKind::Maker,
            &Target::new("earsaver", None)
        ),
        Some(max)
    );
}

#[tokio::test]
async fn sudo_requires_admin_and_acts_as_the_named_actor() {
    let (sink, engine) = engine();

    let error = error_of(send(&engine, "ana", "sudo justin count 5 prusa pla").await);
    assert_eq!(error, CommandError::Unauthorized { role: Role::Admin });

    let body = sole_body(send(&engine, "freddie", "sudo justin count 5 prusa pla").await);
    assert!(matches!(body, ReplyBody::CountUpdated { total: 5, .. }));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor, ActorId::from("justin"));

    // Sudo collect still demands the collector role on the target actor.
    let error = error_of(send(&engine, "freddie", "sudo ana collect from justin 5 prusa").await);
    assert_eq!(
        error,
        CommandError::Unauthorized {
            role: Role::Collector,
        }
    );
}

#[tokio::test]
async fn public_report_posts_a_summary_and_dms_the_detail() {
    let (_, engine) = engine();
    send(&engine, "justin", "count 20 prusa pla").await;

    let replies = send(&engine, "ana", "report").await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].audience, Audience::Public);
    assert_eq!(replies[1].audience, Audience::AuthorDm);

    match (&replies[0].body, &replies[1].body) {
        (ReplyBody::Report(summary), ReplyBody::Report(full)) => {
            assert_eq!(summary.summary, full.summary);
            assert!(summary.makers.is_empty());
            assert_eq!(full.makers.len(), 1);
        }
        other => panic!("unexpected replies {other:?}"),
    }
}

#[tokio::test]
async fn who_reports_identity_and_role_membership() {
    let (_, engine) = engine();

    let body = sole_body(send(&engine, "ana", "who are you").await);
    match body {
        ReplyBody::Identity { pid, version } => {
            assert_eq!(pid, std::process::id());
            assert!(!version.is_empty());
        }
        other => panic!("unexpected reply {other:?}"),
    }

    let body = sole_body(send(&engine, "ana", "who are collectors").await);
    assert_eq!(
        body,
        ReplyBody::RoleMembers {
            role: Role::Collector,
            members: vec![ActorId::from("katy"), ActorId::from("leon")],
        }
    );
}

#[tokio::test]
async fn kamikazi_answers_only_its_own_pid() {
    let (_, engine) = engine();

    let error = error_of(send(&engine, "ana", "kamikazi 1").await);
    assert_eq!(error, CommandError::Unauthorized { role: Role::Admin });

    // Wrong pid: addressed to some other instance, stay silent.
    let replies = send(&engine, "freddie", "kamikazi 999999999").await;
    assert!(replies.is_empty());

    let own = std::process::id();
    let body = sole_body(send(&engine, "freddie", &format!("kamikazi {own}")).await);
    assert_eq!(body, ReplyBody::Shutdown);
}

#[tokio::test]
async fn emission_failure_is_fatal_and_leaves_the_ledger_untouched() {
    let engine = Engine::new(
        Catalog::default(),
        roles(),
        Arc::new(FailingSink),
        Vec::new(),
    );

    let result = engine
        .handle(&Envelope {
            actor: ActorId::from("ana"),
            text: "count 5 earsaver".into(),
            channel: Channel::Public,
        })
        .await;
    assert!(matches!(result, Err(EngineError::Emission(_))));

    let ledger = engine.ledger().await;
    assert!(ledger.rows(&ActorId::from("ana"), BoxKind::Maker).is_empty());

    // Read-only commands still work against a failing sink.
    let replies = send(&engine, "ana", "count").await;
    assert!(matches!(
        sole_body(replies),
        ReplyBody::Inventory { .. }
    ));
}

#[tokio::test]
async fn replaying_the_emitted_log_reproduces_the_ledger() {
    let (sink, engine) = engine();
    send(&engine, "justin", "count 20 prusa pla").await;
    send(&engine, "justin", "drop katy 15").await;
    send(&engine, "katy", "confirm").await;
    send(&engine, "ana", "count 7 earsaver").await;
    send(&engine, "ana", "remove").await;

    let rebuilt = Engine::new(
        Catalog::default(),
        roles(),
        Arc::new(MemorySink::default()),
        sink.records(),
    );

    assert_eq!(engine.ledger().await, rebuilt.ledger().await);
}
