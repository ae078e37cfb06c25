use std::time::SystemTime;

use serde::Serialize;
use tabkeeper_protocol::{TabId, TabPosition, WindowId};

/// Counters published on the health watch channel after every event and
/// command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub cached_tabs: usize,
    pub events_applied: u64,
    pub duplicates_closed: u64,
    pub tabs_moved: u64,
    pub windows_closed: u64,
    pub sorts_run: u64,
    pub merges_run: u64,
    pub purged_stale: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rebuild: Option<SystemTime>,
}

/// Something the engine did to the host, or to its own cache because the
/// host said a tab was gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineAction {
    DuplicateClosed {
        tab_id: TabId,
        kept: TabId,
        window_id: WindowId,
        href: String,
    },
    TabMoved {
        tab_id: TabId,
        window_id: WindowId,
        position: TabPosition,
    },
    WindowClosed {
        window_id: WindowId,
    },
    Purged {
        tab_id: TabId,
    },
    Rebuilt {
        tabs: usize,
    },
}

impl EngineAction {
    pub(crate) fn count_into(&self, health: &mut EngineHealth) {
        match self {
            Self::DuplicateClosed { .. } => health.duplicates_closed += 1,
            Self::TabMoved { .. } => health.tabs_moved += 1,
            Self::WindowClosed { .. } => health.windows_closed += 1,
            Self::Purged { .. } => health.purged_stale += 1,
            Self::Rebuilt { .. } => health.last_rebuild = Some(SystemTime::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn actions_serialize_with_a_tag() {
        let action = EngineAction::TabMoved {
            tab_id: TabId(7),
            window_id: WindowId(1),
            position: TabPosition::End,
        };
        assert_eq!(
            serde_json::to_value(&action).expect("serialize"),
            serde_json::json!({
                "action": "tab_moved",
                "tab_id": 7,
                "window_id": 1,
                "position": "end"
            })
        );
    }

    #[test]
    fn counting_touches_only_the_matching_counter() {
        let mut health = EngineHealth::default();
        EngineAction::WindowClosed {
            window_id: WindowId(2),
        }
        .count_into(&mut health);
        EngineAction::Purged { tab_id: TabId(3) }.count_into(&mut health);
        assert_eq!(
            health,
            EngineHealth {
                windows_closed: 1,
                purged_stale: 1,
                ..EngineHealth::default()
            }
        );
    }
}
