//! Startup replay - rebuilding the projection from the external log.
//!
//! The replay source hands us transaction records already ordered; the
//! ledger is a pure fold over them. Replay is a prerequisite barrier: the
//! engine constructs its ledger with [`Ledger::replay`] before accepting
//! any command.

use tracing::{debug, info};

use super::{Ledger, TransactionRecord};

impl Ledger {
    /// Rebuild a ledger by folding an ordered record sequence from empty
    /// state. Deterministic: the same sequence always produces the same
    /// ledger.
    pub fn replay(records: impl IntoIterator<Item = TransactionRecord>) -> Ledger {
        let mut ledger = Ledger::new();
        let mut applied = 0usize;
        for record in records {
            debug!(seq = record.seq, actor = %record.actor, "replaying record");
            ledger.apply(&record);
            applied += 1;
        }
        info!(
            records = applied,
            last_seq = ledger.last_seq(),
            "ledger rebuilt from transaction log"
        );
        ledger
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Target;
    use crate::ledger::{ActorId, BoxKind, Ledger, RecordOp, TransactionRecord};

    fn sample_log() -> Vec<TransactionRecord> {
        vec![
            TransactionRecord::new(
                1,
                ActorId::from("freddie"),
                RecordOp::Count {
                    box_kind: BoxKind::Maker,
                    item: "verkstan".into(),
                    variant: Some("PLA".into()),
                    total: 12,
                },
            ),
            TransactionRecord::new(
                2,
                ActorId::from("freddie"),
                RecordOp::Count {
                    box_kind: BoxKind::Maker,
                    item: "verkstan".into(),
                    variant: Some("PLA".into()),
                    total: 24,
                },
            ),
            TransactionRecord::new(
                3,
                ActorId::from("justin"),
                RecordOp::DropboxSet {
                    collector: ActorId::from("katy"),
                    item: "prusa".into(),
                    variant: Some("PLA".into()),
                    total: 20,
                },
            ),
            TransactionRecord::new(
                4,
                ActorId::from("katy"),
                RecordOp::Count {
                    box_kind: BoxKind::Collector,
                    item: "earsaver".into(),
                    variant: None,
                    total: 100,
                },
            ),
        ]
    }

    #[test]
    fn replay_is_deterministic() {
        let log = sample_log();
        let first = Ledger::replay(log.clone());
        let second = Ledger::replay(log);
        assert_eq!(first, second);
    }

    #[test]
    fn later_records_supersede_earlier_ones() {
        let ledger = Ledger::replay(sample_log());
        assert_eq!(
            ledger.count_of(
                &ActorId::from("freddie"),
                BoxKind::Maker,
                &Target::new("verkstan", Some("PLA"))
            ),
            Some(24)
        );
        assert_eq!(ledger.last_seq(), 4);
    }

    #[test]
    fn empty_log_yields_empty_ledger() {
        let ledger = Ledger::replay(Vec::new());
        assert_eq!(ledger, Ledger::new());
        assert_eq!(ledger.last_seq(), 0);
    }
}
