use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use tabkeeper_protocol::{TabId, WindowId};

/// One thing that happens during a replayed session: either something a user
/// does in the browser, or a command sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Open {
        window: WindowId,
        url: String,
        #[serde(default)]
        pinned: bool,
    },
    Navigate {
        tab: TabId,
        url: String,
    },
    Close {
        tab: TabId,
    },
    Focus {
        window: WindowId,
    },
    Merge,
    Sort {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<WindowId>,
    },
    Dedupe,
}

impl Step {
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::Merge | Self::Sort { .. } | Self::Dedupe)
    }
}

pub fn parse_script(raw: &str) -> Result<Vec<Step>> {
    serde_json::from_str(raw).context("Script must be a JSON array of steps")
}
