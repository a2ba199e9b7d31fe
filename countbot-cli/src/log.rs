//! The JSON Lines transaction log.
//!
//! One record per line, appended on every successful mutation and read
//! back in full at startup. Append-only by construction: the sink never
//! seeks and never rewrites.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use countbot_core::ledger::TransactionRecord;
use countbot_core::transport::TransactionSink;

/// Append-only JSON Lines sink backing the engine's durability barrier.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TransactionSink for JsonlSink {
    async fn emit(&self, record: &TransactionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serializing record")?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(seq = record.seq, "record appended");
        Ok(())
    }
}

/// Read the full ordered history back. A missing file is an empty
/// history; a malformed line is an error naming the line number.
pub fn load_history(path: &Path) -> Result<Vec<TransactionRecord>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("reading log {}", path.display()));
        }
    };
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: bad record", path.display(), i + 1))
        })
        .collect()
}
