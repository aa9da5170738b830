//! Inbound browser lifecycle events. The extension side forwards them to the
//! host as NDJSON on stdin; [StdinEventSource] is the production reader.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// One browser lifecycle event. Only the fields the attribution model needs
/// are carried: a tab identifier plus optional URL and favicon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// A tab became the active one in the focused window.
    TabActivated {
        tab_id: i64,
        url: Option<Arc<str>>,
        favicon: Option<Arc<str>>,
    },
    /// A navigation in an existing tab finished loading.
    TabUpdated {
        tab_id: i64,
        url: Arc<str>,
        favicon: Option<Arc<str>>,
    },
    TabRemoved {
        tab_id: i64,
    },
    WindowFocusChanged {
        focused: bool,
    },
    IdleStateChanged {
        state: IdleState,
    },
    /// The extension is about to be unloaded.
    Suspend,
}

/// Contract for the inbound event stream. `None` means the stream is over
/// and the host should close out and exit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Result<Option<BrowserEvent>>;
}

/// Reads events from the host's stdin, one JSON object per line. Malformed
/// lines are skipped: a bad event must not take the whole stream down.
pub struct StdinEventSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinEventSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for StdinEventSource {
    async fn next_event(&mut self) -> Result<Option<BrowserEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("Skipping malformed event {line:?}: {e}"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::BrowserEvent;

    #[test]
    fn test_event_wire_format() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"tab_activated","tab_id":3,"url":"https://news.example/","favicon":null}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabActivated {
                tab_id: 3,
                url: Some("https://news.example/".into()),
                favicon: None,
            }
        );

        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"idle_state_changed","state":"locked"}"#).unwrap();
        assert_eq!(
            event,
            BrowserEvent::IdleStateChanged {
                state: super::IdleState::Locked
            }
        );
    }
}
