//! The transport seam - everything the engine consumes from, or returns
//! to, the outside chat platform.
//!
//! The engine never renders text and never talks to a chat API. Inbound it
//! receives an [`Envelope`]; outbound it returns [`Reply`] values carrying
//! structured results plus an audience hint. Role lookups and transaction
//! emission go through the injected [`RoleDirectory`] and
//! [`TransactionSink`] capabilities so tests can substitute fixed tables
//! and in-memory logs.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::Target;
use crate::error::CommandError;
use crate::ledger::{ActorId, BoxKind, Count, DropboxRow, HoldingRow, TransactionRecord};
use crate::report::ReportView;

/// Capability tiers beyond the default maker tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Collector,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Collector => write!(f, "collector"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Where the command arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The shared inventory channel.
    Public,
    /// A direct-message channel with the bot.
    DirectMessage,
}

/// One inbound command, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub actor: ActorId,
    pub text: String,
    pub channel: Channel,
}

/// Where the transport should deliver a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Public,
    AuthorDm,
}

/// One structured reply for the transport to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub audience: Audience,
    pub body: ReplyBody,
}

impl Reply {
    pub fn public(body: ReplyBody) -> Self {
        Self {
            audience: Audience::Public,
            body,
        }
    }

    pub fn dm(body: ReplyBody) -> Self {
        Self {
            audience: Audience::AuthorDm,
            body,
        }
    }
}

/// One entry moved out of a dropbox by a confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedEntry {
    pub maker: ActorId,
    pub target: Target,
    pub count: Count,
    pub collector_total: Count,
}

/// Structured command results. The enumerated result kind plus payloads;
/// rendering is entirely the transport's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReplyBody {
    /// An actor's current rows in one box; for makers, also whatever they
    /// have dropped and is still awaiting confirmation.
    Inventory {
        box_kind: BoxKind,
        rows: Vec<HoldingRow>,
        dropped: Vec<DropboxRow>,
    },

    /// A count/add/reset landed.
    CountUpdated {
        box_kind: BoxKind,
        target: Target,
        previous: Option<Count>,
        total: Count,
    },

    /// Rows removed from a box.
    Removed {
        box_kind: BoxKind,
        targets: Vec<Target>,
    },

    /// A `collect from` transfer completed.
    Collected {
        maker: ActorId,
        target: Target,
        requested: Count,
        transferred: Count,
        maker_remaining: Count,
        collector_total: Count,
    },

    /// A drop (or reversal) posted to a collector's dropbox.
    Dropped {
        collector: ActorId,
        target: Target,
        /// Signed amount actually moved (negative for a reversal).
        moved: Count,
        posted_total: Count,
        maker_remaining: Count,
    },

    /// Pending dropbox entries claimed into the collector box.
    Confirmed { entries: Vec<ConfirmedEntry> },

    /// Aggregated report over the whole ledger.
    Report(ReportView),

    /// Process identity, for `who` / `kamikazi`.
    Identity { pid: u32, version: String },

    /// Membership of a role, for `who are collectors` and friends.
    RoleMembers { role: Role, members: Vec<ActorId> },

    /// The engine acknowledged `kamikazi`; the host must terminate.
    Shutdown,

    /// A recoverable command failure.
    Error { error: CommandError },
}

/// Authoritative role lookups against the platform's user directory.
/// The engine never caches results beyond a single command.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn has_role(&self, actor: &ActorId, role: Role) -> bool;

    async fn members_with_role(&self, role: Role) -> Vec<ActorId>;
}

/// Required side effect of every successful mutation: the record must be
/// durably appended to the external log before the in-memory ledger moves.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn emit(&self, record: &TransactionRecord) -> anyhow::Result<()>;
}

/// A fixed, in-memory role table. The standard directory for tests and
/// for the local CLI harness, loaded from a YAML document like:
///
/// ```yaml
/// collectors: [katy, leon]
/// admins: [freddie]
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FixedRoleDirectory {
    #[serde(default)]
    collectors: BTreeSet<ActorId>,
    #[serde(default)]
    admins: BTreeSet<ActorId>,
}

impl FixedRoleDirectory {
    pub fn new(
        collectors: impl IntoIterator<Item = ActorId>,
        admins: impl IntoIterator<Item = ActorId>,
    ) -> Self {
        Self {
            collectors: collectors.into_iter().collect(),
            admins: admins.into_iter().collect(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(text)
    }
}

#[async_trait]
impl RoleDirectory for FixedRoleDirectory {
    async fn has_role(&self, actor: &ActorId, role: Role) -> bool {
        match role {
            Role::Collector => self.collectors.contains(actor),
            Role::Admin => self.admins.contains(actor),
        }
    }

    async fn members_with_role(&self, role: Role) -> Vec<ActorId> {
        let set = match role {
            Role::Collector => &self.collectors,
            Role::Admin => &self.admins,
        };
        set.iter().cloned().collect()
    }
}
