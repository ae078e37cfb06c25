use std::sync::Arc;

use pretty_assertions::assert_eq;
use tabkeeper_engine::{EngineAction, EngineConfig, EngineHandle, TabEngine};
use tabkeeper_memory_host::{MemoryHost, SessionLayout};
use tabkeeper_protocol::{TabId, WindowId};

fn start(raw: &str, config: EngineConfig) -> (Arc<MemoryHost>, EngineHandle) {
    let host = Arc::new(MemoryHost::from_layout(
        &SessionLayout::from_json(raw).expect("layout fixture"),
    ));
    let handle = EngineHandle::start(Arc::new(TabEngine::new(host.clone(), config)));
    host.connect(handle.event_sender());
    (host, handle)
}

#[tokio::test]
async fn navigation_into_a_duplicate_closes_it() {
    let (host, handle) = start(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://a.com/" },
            { "id": 2, "url": "https://b.com/" }
        ] } ] }"#,
        EngineConfig::default(),
    );
    let mut actions = handle.subscribe_actions();
    handle.flush().await.expect("initial flush");
    assert_eq!(handle.health_snapshot().cached_tabs, 2);

    host.navigate(TabId(2), "https://a.com/");
    handle.flush().await.expect("flush");

    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1)]);
    let mut closed = Vec::new();
    while let Ok(action) = actions.try_recv() {
        if let EngineAction::DuplicateClosed { tab_id, kept, .. } = action {
            closed.push((tab_id, kept));
        }
    }
    assert_eq!(closed, vec![(TabId(2), TabId(1))]);

    let health = handle.health_snapshot();
    assert_eq!(health.duplicates_closed, 1);
    assert_eq!(health.cached_tabs, 1);
    assert!(health.events_applied >= 2);
    assert!(health.last_rebuild.is_some());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn merge_through_the_handle_collapses_cross_window_duplicates() {
    let (host, handle) = start(
        r#"{ "focused": 1, "windows": [
            { "id": 1, "tabs": [
                { "id": 1, "url": "https://b.com/" },
                { "id": 2, "url": "https://a.com/" }
            ] },
            { "id": 2, "tabs": [
                { "id": 3, "url": "https://a.com/" },
                { "id": 4, "url": "https://c.com/" }
            ] }
        ] }"#,
        EngineConfig::default(),
    );
    handle.flush().await.expect("initial flush");

    let report = handle.merge_windows().await.expect("merge");
    handle.flush().await.expect("flush");

    assert_eq!(report.closed_windows, vec![WindowId(2)]);
    // The tab that arrived from window 2 is the newer copy of a.com.
    let layout = host.layout();
    let window = layout.window(WindowId(1)).expect("target window");
    assert_eq!(
        window.urls(),
        vec!["https://a.com/", "https://b.com/", "https://c.com/"]
    );
    assert_eq!(window.tab_ids(), vec![TabId(2), TabId(1), TabId(4)]);
    assert_eq!(handle.health_snapshot().merges_run, 1);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn dedup_can_be_turned_off() {
    let (host, handle) = start(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://a.com/" },
            { "id": 2, "url": "https://b.com/" }
        ] } ] }"#,
        EngineConfig {
            dedupe_on_settle: false,
            ..EngineConfig::default()
        },
    );
    handle.flush().await.expect("initial flush");

    host.navigate(TabId(2), "https://a.com/");
    handle.flush().await.expect("flush");
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1), TabId(2)]);

    // An explicit sweep still works.
    let report = handle.dedupe_all().await.expect("sweep");
    assert_eq!(report.closed, vec![TabId(2)]);
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1)]);
}

#[tokio::test]
async fn sort_and_rebuild_commands_reply() {
    let (host, handle) = start(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://b.com/" },
            { "id": 2, "url": "https://a.com/" }
        ] } ] }"#,
        EngineConfig {
            rebuild_on_start: false,
            ..EngineConfig::default()
        },
    );
    assert_eq!(handle.rebuild().await.expect("rebuild"), 2);

    let report = handle.sort_current_window().await.expect("sort");
    assert_eq!(report.moved, vec![TabId(2)]);
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(2), TabId(1)]);

    let mut health = handle.health_stream();
    assert_eq!(health.borrow_and_update().sorts_run, 1);
}

#[tokio::test]
async fn commands_fail_after_shutdown() {
    let (_host, handle) = start(r#"{ "windows": [] }"#, EngineConfig::default());
    handle.shutdown().await.expect("shutdown");
    assert!(handle.flush().await.is_err());
}

#[tokio::test]
async fn zero_capacities_are_clamped_when_starting() {
    let config = EngineConfig {
        event_buffer: 0,
        command_buffer: 0,
        action_buffer: 0,
        ..EngineConfig::default()
    };
    let (host, handle) = start(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://a.com/" },
            { "id": 2, "url": "https://b.com/" }
        ] } ] }"#,
        config,
    );
    handle.flush().await.expect("flush");
    assert_eq!(handle.health_snapshot().cached_tabs, 2);

    let report = handle.sort_window(WindowId(1)).await.expect("sort");
    assert!(report.moved.is_empty());
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1), TabId(2)]);
    handle.shutdown().await.expect("shutdown");
}
