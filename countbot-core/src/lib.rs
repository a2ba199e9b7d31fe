//! countbot-core - chat-driven inventory tracking over an append-only
//! transaction log.
//!
//! All state is an in-memory [`ledger::Ledger`] rebuilt by replaying
//! ordered [`ledger::TransactionRecord`]s; the [`engine::Engine`] is the
//! single mutation path, emitting every new record to an injected
//! [`transport::TransactionSink`] before folding it in. Transports plug
//! in at the [`transport`] seam and own all rendering.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod report;
pub mod transfer;
pub mod transport;

pub use error::{CommandError, EngineError};
