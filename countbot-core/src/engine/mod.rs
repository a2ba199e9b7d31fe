//! The command engine - the single mutation path of the system.
//!
//! One [`Engine`] owns the ledger behind an async mutex and processes one
//! command at a time: parse, authorize, resolve tokens, validate, then
//! emit the resulting records to the [`TransactionSink`] and only
//! afterwards fold them into the in-memory ledger. The permanent log is
//! the source of truth; if emission fails the command is fatal
//! ([`EngineError::Emission`]) and the host must restart and replay.
//!
//! User mistakes never surface as `Err`: they become
//! [`ReplyBody::Error`] replies, so the transport always has something to
//! render.

pub mod command;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::catalog::{resolver, Catalog, Target};
use crate::error::{CommandError, EngineError};
use crate::ledger::{ActorId, BoxKind, Count, Ledger, RecordOp, TransactionRecord};
use crate::report::{self, ReportView};
use crate::transfer;
use crate::transport::{
    Audience, Channel, Envelope, Reply, ReplyBody, Role, RoleDirectory, TransactionSink,
};

pub use command::{CollectCommand, Command, RemoveSelector};

/// Internal dispatch failure: a user mistake to render, or a fatal
/// engine fault to propagate.
enum Failure {
    User(CommandError),
    Fatal(EngineError),
}

impl From<CommandError> for Failure {
    fn from(error: CommandError) -> Self {
        Failure::User(error)
    }
}

pub struct Engine {
    catalog: Catalog,
    roles: Arc<dyn RoleDirectory>,
    sink: Arc<dyn TransactionSink>,
    ledger: Mutex<Ledger>,
    pid: u32,
}

impl Engine {
    /// Build an engine over an already-ordered transaction history. The
    /// ledger is rebuilt here, before the first command can be handled.
    pub fn new(
        catalog: Catalog,
        roles: Arc<dyn RoleDirectory>,
        sink: Arc<dyn TransactionSink>,
        history: impl IntoIterator<Item = TransactionRecord>,
    ) -> Self {
        Self {
            catalog,
            roles,
            sink,
            ledger: Mutex::new(Ledger::replay(history)),
            pid: std::process::id(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Snapshot of the current ledger, for transports that render state
    /// outside the command flow.
    pub async fn ledger(&self) -> Ledger {
        self.ledger.lock().await.clone()
    }

    /// Process one inbound command end to end.
    #[instrument(skip(self, envelope), fields(actor = %envelope.actor))]
    pub async fn handle(&self, envelope: &Envelope) -> Result<Vec<Reply>, EngineError> {
        let audience = reply_audience(envelope.channel);
        let command = match command::parse(&envelope.text) {
            Ok(command) => command,
            Err(error) => {
                warn!(%error, text = %envelope.text, "rejected command");
                return Ok(vec![Reply {
                    audience,
                    body: ReplyBody::Error { error },
                }]);
            }
        };

        let mut ledger = self.ledger.lock().await;
        match self
            .execute(&mut ledger, &envelope.actor, envelope.channel, command)
            .await
        {
            Ok(replies) => Ok(replies),
            Err(Failure::User(error)) => {
                warn!(%error, "command failed");
                Ok(vec![Reply {
                    audience,
                    body: ReplyBody::Error { error },
                }])
            }
            Err(Failure::Fatal(error)) => Err(error),
        }
    }

    async fn execute(
        &self,
        ledger: &mut Ledger,
        actor: &ActorId,
        channel: Channel,
        command: Command,
    ) -> Result<Vec<Reply>, Failure> {
        let audience = reply_audience(channel);
        let one = |body| vec![Reply { audience, body }];

        match command {
            Command::Count {
                total,
                item,
                variant,
            } => match total {
                None => Ok(one(self.view_box(ledger, actor, BoxKind::Maker))),
                Some(total) => {
                    let body = self
                        .set_count(
                            ledger,
                            actor,
                            BoxKind::Maker,
                            total,
                            false,
                            item.as_deref(),
                            variant.as_deref(),
                        )
                        .await?;
                    Ok(one(body))
                }
            },
            Command::Add {
                amount,
                item,
                variant,
            } => match amount {
                None => Ok(one(self.view_box(ledger, actor, BoxKind::Maker))),
                Some(amount) => {
                    let body = self
                        .set_count(
                            ledger,
                            actor,
                            BoxKind::Maker,
                            amount,
                            true,
                            item.as_deref(),
                            variant.as_deref(),
                        )
                        .await?;
                    Ok(one(body))
                }
            },
            Command::Reset { item, variant } => {
                let body = self
                    .set_count(
                        ledger,
                        actor,
                        BoxKind::Maker,
                        0,
                        false,
                        item.as_deref(),
                        variant.as_deref(),
                    )
                    .await?;
                Ok(one(body))
            }
            Command::Remove { selector } => {
                let body = self.remove(ledger, actor, BoxKind::Maker, selector).await?;
                Ok(one(body))
            }
            Command::Collect(sub) => {
                self.require_role(actor, Role::Collector).await?;
                let body = self.collect(ledger, actor, sub).await?;
                Ok(one(body))
            }
            Command::Drop {
                collector,
                amount,
                item,
                variant,
            } => {
                let collector = ActorId::from(collector);
                // Items can only be dropped at someone who can confirm them.
                if !self.roles.has_role(&collector, Role::Collector).await {
                    return Err(CommandError::DropTargetNotCollector { collector }.into());
                }
                let target = self.resolve_target(
                    ledger,
                    actor,
                    BoxKind::Maker,
                    item.as_deref(),
                    variant.as_deref(),
                )?;
                let planned = transfer::plan_drop(ledger, actor, &collector, &target, amount)?;
                self.commit(ledger, planned.ops).await?;
                Ok(one(planned.outcome))
            }
            Command::Confirm { maker, all } => {
                self.require_role(actor, Role::Collector).await?;
                let maker = maker.map(ActorId::from);
                let planned = transfer::plan_confirm(ledger, actor, maker.as_ref(), all)?;
                self.commit(ledger, planned.ops).await?;
                Ok(one(planned.outcome))
            }
            Command::Report { item, variant } => {
                self.reportage(ledger, channel, item.as_deref(), variant.as_deref())
            }
            Command::Who { role } => {
                let body = self.who(role.as_deref()).await?;
                Ok(one(body))
            }
            Command::Sudo {
                actor: target_actor,
                command,
            } => {
                self.require_role(actor, Role::Admin).await?;
                let target_actor = ActorId::from(target_actor);
                info!(admin = %actor, as_actor = %target_actor, "sudo command");
                Box::pin(self.execute(ledger, &target_actor, channel, *command)).await
            }
            Command::Kamikazi { pid } => {
                self.require_role(actor, Role::Admin).await?;
                if pid == self.pid {
                    info!(pid, "shutdown requested");
                    Ok(one(ReplyBody::Shutdown))
                } else {
                    // Addressed to some other instance; stay silent.
                    info!(pid, own_pid = self.pid, "ignoring kamikazi for another pid");
                    Ok(Vec::new())
                }
            }
        }
    }

    /// The `collect` family: the same box operations as the maker verbs,
    /// aimed at the collector box, plus the `from` transfer.
    async fn collect(
        &self,
        ledger: &mut Ledger,
        actor: &ActorId,
        sub: CollectCommand,
    ) -> Result<ReplyBody, Failure> {
        match sub {
            CollectCommand::View => Ok(self.view_box(ledger, actor, BoxKind::Collector)),
            CollectCommand::Count {
                total,
                item,
                variant,
            } => match total {
                None => Ok(self.view_box(ledger, actor, BoxKind::Collector)),
                Some(total) => {
                    self.set_count(
                        ledger,
                        actor,
                        BoxKind::Collector,
                        total,
                        false,
                        item.as_deref(),
                        variant.as_deref(),
                    )
                    .await
                }
            },
            CollectCommand::Add {
                amount,
                item,
                variant,
            } => match amount {
                None => Ok(self.view_box(ledger, actor, BoxKind::Collector)),
                Some(amount) => {
                    self.set_count(
                        ledger,
                        actor,
                        BoxKind::Collector,
                        amount,
                        true,
                        item.as_deref(),
                        variant.as_deref(),
                    )
                    .await
                }
            },
            CollectCommand::Reset { item, variant } => {
                self.set_count(
                    ledger,
                    actor,
                    BoxKind::Collector,
                    0,
                    false,
                    item.as_deref(),
                    variant.as_deref(),
                )
                .await
            }
            CollectCommand::Remove { selector } => {
                self.remove(ledger, actor, BoxKind::Collector, selector).await
            }
            CollectCommand::From {
                maker,
                amount,
                item,
                variant,
            } => {
                let maker = ActorId::from(maker);
                // The variant may be inferred, but from the maker's rows:
                // the transfer pulls from their box.
                let target = self.resolve_target(
                    ledger,
                    &maker,
                    BoxKind::Maker,
                    Some(&item),
                    variant.as_deref(),
                )?;
                let planned = transfer::plan_collect_from(ledger, actor, &maker, &target, amount)?;
                self.commit(ledger, planned.ops).await?;
                Ok(planned.outcome)
            }
        }
    }

    fn view_box(&self, ledger: &Ledger, actor: &ActorId, box_kind: BoxKind) -> ReplyBody {
        let dropped = match box_kind {
            BoxKind::Maker => ledger.dropped_by(actor),
            BoxKind::Collector => Vec::new(),
        };
        ReplyBody::Inventory {
            box_kind,
            rows: ledger.rows(actor, box_kind),
            dropped,
        }
    }

    /// Shared body of count/add/reset against either box.
    #[allow(clippy::too_many_arguments)]
    async fn set_count(
        &self,
        ledger: &mut Ledger,
        actor: &ActorId,
        box_kind: BoxKind,
        amount: Count,
        delta: bool,
        item: Option<&str>,
        variant: Option<&str>,
    ) -> Result<ReplyBody, Failure> {
        let target = self.resolve_target(ledger, actor, box_kind, item, variant)?;
        let previous = ledger.count_of(actor, box_kind, &target);
        let base = previous.unwrap_or(0);
        let total = if delta {
            base.checked_add(amount).ok_or_else(CommandError::overflow)?
        } else {
            amount
        };
        if total < 0 {
            return Err(CommandError::NegativeValue {
                current: base,
                attempted: total,
            }
            .into());
        }

        self.commit(
            ledger,
            vec![(
                actor.clone(),
                RecordOp::Count {
                    box_kind,
                    item: target.item.clone(),
                    variant: target.variant.clone(),
                    total,
                },
            )],
        )
        .await?;

        Ok(ReplyBody::CountUpdated {
            box_kind,
            target,
            previous,
            total,
        })
    }

    async fn remove(
        &self,
        ledger: &mut Ledger,
        actor: &ActorId,
        box_kind: BoxKind,
        selector: RemoveSelector,
    ) -> Result<ReplyBody, Failure> {
        let held = ledger.targets_for(actor, box_kind, None);
        if held.is_empty() {
            return Err(CommandError::NothingToRemove.into());
        }

        let (op, targets) = match selector {
            RemoveSelector::All => (
                RecordOp::Remove {
                    box_kind,
                    item: None,
                    variant: None,
                },
                held,
            ),
            RemoveSelector::One { item, variant } => {
                let target = match item.as_deref() {
                    // Bare remove only works when there is exactly one row.
                    None => resolver::infer_default(held)?,
                    Some(item) => {
                        let entry = resolver::resolve_item(&self.catalog, item)?;
                        let target = if !entry.has_variants() {
                            Target::new(entry.name.clone(), None)
                        } else if let Some(variant) = variant.as_deref() {
                            let variant =
                                resolver::resolve_variant(&self.catalog, entry, variant)?;
                            Target::new(entry.name.clone(), Some(&variant))
                        } else {
                            let mut candidates =
                                ledger.targets_for(actor, box_kind, Some(&entry.name));
                            match candidates.len() {
                                0 => return Err(CommandError::NothingToRemove.into()),
                                1 => candidates.remove(0),
                                _ => {
                                    return Err(CommandError::AmbiguousDefault { candidates }
                                        .into())
                                }
                            }
                        };
                        if ledger.count_of(actor, box_kind, &target).is_none() {
                            return Err(CommandError::NothingToRemove.into());
                        }
                        target
                    }
                };
                (
                    RecordOp::Remove {
                        box_kind,
                        item: Some(target.item.clone()),
                        variant: target.variant.clone(),
                    },
                    vec![target],
                )
            }
        };

        self.commit(ledger, vec![(actor.clone(), op)]).await?;
        Ok(ReplyBody::Removed { box_kind, targets })
    }

    fn reportage(
        &self,
        ledger: &Ledger,
        channel: Channel,
        item: Option<&str>,
        variant: Option<&str>,
    ) -> Result<Vec<Reply>, Failure> {
        let (item, variant) = match item {
            None => (None, None),
            Some(token) => {
                let entry = resolver::resolve_item(&self.catalog, token)?;
                let variant = match variant {
                    Some(token) => {
                        Some(resolver::resolve_variant(&self.catalog, entry, token)?)
                    }
                    None => None,
                };
                (Some(entry.name.clone()), variant)
            }
        };
        let view = report::generate(&self.catalog, ledger, item.as_deref(), variant.as_deref());

        // The full report is long; in a shared channel only the summary is
        // posted and the detail goes to the author.
        match channel {
            Channel::DirectMessage => Ok(vec![Reply::dm(ReplyBody::Report(view))]),
            Channel::Public => {
                let summary = ReportView {
                    summary: view.summary.clone(),
                    makers: Vec::new(),
                    dropboxes: Vec::new(),
                    collectors: Vec::new(),
                };
                Ok(vec![
                    Reply::public(ReplyBody::Report(summary)),
                    Reply::dm(ReplyBody::Report(view)),
                ])
            }
        }
    }

    async fn who(&self, role: Option<&str>) -> Result<ReplyBody, Failure> {
        let identity = ReplyBody::Identity {
            pid: self.pid,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let Some(word) = role else {
            return Ok(identity);
        };
        let role = match word.to_ascii_lowercase().as_str() {
            "you" => return Ok(identity),
            "collectors" | "collector" => Role::Collector,
            "admins" | "admin" => Role::Admin,
            other => {
                return Err(CommandError::BadArgument {
                    message: format!("'{other}' is not a role"),
                }
                .into())
            }
        };
        Ok(ReplyBody::RoleMembers {
            role,
            members: self.roles.members_with_role(role).await,
        })
    }

    /// Resolve (item, variant) tokens to a concrete target, inferring
    /// whatever was omitted from the actor's current rows in the box.
    fn resolve_target(
        &self,
        ledger: &Ledger,
        actor: &ActorId,
        box_kind: BoxKind,
        item: Option<&str>,
        variant: Option<&str>,
    ) -> Result<Target, CommandError> {
        let Some(item) = item else {
            return resolver::infer_default(ledger.targets_for(actor, box_kind, None));
        };
        let entry = resolver::resolve_item(&self.catalog, item)?;
        if !entry.has_variants() {
            return Ok(Target::new(entry.name.clone(), None));
        }
        if let Some(variant) = variant {
            let variant = resolver::resolve_variant(&self.catalog, entry, variant)?;
            return Ok(Target::new(entry.name.clone(), Some(&variant)));
        }
        resolver::infer_default(ledger.targets_for(actor, box_kind, Some(&entry.name)))
    }

    async fn require_role(&self, actor: &ActorId, role: Role) -> Result<(), Failure> {
        if self.roles.has_role(actor, role).await {
            Ok(())
        } else {
            Err(CommandError::Unauthorized { role }.into())
        }
    }

    /// Emit records to the permanent log, then fold them into the ledger.
    /// Sequence numbers continue from the last applied record. Emission is
    /// the durability barrier: nothing is applied until every record of
    /// the command has been accepted by the sink.
    async fn commit(
        &self,
        ledger: &mut Ledger,
        ops: Vec<(ActorId, RecordOp)>,
    ) -> Result<(), Failure> {
        let mut seq = ledger.last_seq();
        let records: Vec<TransactionRecord> = ops
            .into_iter()
            .map(|(actor, op)| {
                seq += 1;
                TransactionRecord::new(seq, actor, op)
            })
            .collect();
        for record in &records {
            self.sink
                .emit(record)
                .await
                .map_err(|e| Failure::Fatal(EngineError::Emission(e)))?;
        }
        for record in &records {
            ledger.apply(record);
        }
        Ok(())
    }
}

fn reply_audience(channel: Channel) -> Audience {
    match channel {
        Channel::Public => Audience::Public,
        Channel::DirectMessage => Audience::AuthorDm,
    }
}
