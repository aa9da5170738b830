//! Outbound commands for the extension side, written as NDJSON on stdout.
//! Currently the only command is closing a tab whose domain is blocked.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncWriteExt, Stdout},
    sync::Mutex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabCommand {
    CloseTab { tab_id: i64 },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: TabCommand) -> Result<()>;
}

/// Writes commands to the host's stdout, one JSON object per line. The
/// mutex keeps concurrent enforcement tasks from interleaving lines.
pub struct StdoutCommandSink {
    stdout: Mutex<Stdout>,
}

impl StdoutCommandSink {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutCommandSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSink for StdoutCommandSink {
    async fn send(&self, command: TabCommand) -> Result<()> {
        let mut line = serde_json::to_vec(&command)?;
        line.push(b'\n');

        let mut stdout = self.stdout.lock().await;
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}
