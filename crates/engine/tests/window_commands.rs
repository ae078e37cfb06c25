use std::sync::Arc;

use pretty_assertions::assert_eq;
use tabkeeper_engine::{EngineConfig, TabEngine};
use tabkeeper_memory_host::{HostOp, MemoryHost, SessionLayout};
use tabkeeper_protocol::{HostError, TabId, WindowId};

fn host(raw: &str) -> Arc<MemoryHost> {
    Arc::new(MemoryHost::from_layout(
        &SessionLayout::from_json(raw).expect("layout fixture"),
    ))
}

fn urls(host: &MemoryHost, window_id: WindowId) -> Vec<String> {
    host.layout()
        .window(window_id)
        .map(|window| window.urls().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn sort_orders_by_host_then_path() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://b.com/x" },
            { "id": 2, "url": "https://a.com/z" },
            { "id": 3, "url": "https://a.com/a" }
        ] } ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.sort_current_window().await.expect("sort");

    assert_eq!(
        urls(&host, WindowId(1)),
        vec!["https://a.com/a", "https://a.com/z", "https://b.com/x"]
    );
    assert_eq!(report.considered, 3);
    assert!(report.failed.is_empty());
    // Tabs discovered while sorting are cached.
    assert_eq!(engine.cached_len(), 3);
    assert_eq!(engine.health().sorts_run, 1);
}

#[tokio::test]
async fn sort_keeps_pinned_tabs_in_front_and_unsortable_tabs_behind() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://z.com/", "pinned": true },
            { "id": 2, "url": "https://c.com/", "pinned": true },
            { "id": 3, "url": "chrome://newtab/" },
            { "id": 4, "url": "https://b.com/" },
            { "id": 5, "url": "https://A.com/" }
        ] } ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    engine.sort_window(WindowId(1)).await.expect("sort");

    assert_eq!(
        host.window_tab_ids(WindowId(1)),
        vec![TabId(2), TabId(1), TabId(5), TabId(4), TabId(3)]
    );
}

#[tokio::test]
async fn failed_sort_move_does_not_stop_the_batch() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://c.com/" },
            { "id": 2, "url": "https://b.com/" },
            { "id": 3, "url": "https://a.com/" }
        ] } ] }"#,
    );
    host.fail_next(HostOp::MoveTab, HostError::Unavailable("busy".to_string()));
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.sort_window(WindowId(1)).await.expect("sort");

    assert_eq!(report.failed, vec![TabId(3)]);
    assert_eq!(report.moved, vec![TabId(2)]);
    assert_eq!(engine.health().sorts_run, 1);
    assert_eq!(engine.cached_len(), 3);
}

#[tokio::test]
async fn sorting_a_sorted_window_moves_nothing() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://a.com/" },
            { "id": 2, "url": "https://a.com/#top" },
            { "id": 3, "url": "https://a.com/?page=2" }
        ] } ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.sort_window(WindowId(1)).await.expect("sort");

    assert!(report.moved.is_empty(), "{report:?}");
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn merge_gathers_tabs_and_closes_emptied_windows() {
    let host = host(
        r#"{ "focused": 1, "windows": [
            { "id": 1, "tabs": [
                { "id": 1, "url": "https://pinned.example/", "pinned": true },
                { "id": 2, "url": "https://b.com/" }
            ] },
            { "id": 2, "tabs": [ { "id": 3, "url": "https://a.com/" } ] }
        ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.merge_windows().await.expect("merge");

    assert_eq!(report.target, Some(WindowId(1)));
    assert_eq!(report.moved, vec![TabId(3)]);
    assert_eq!(report.closed_windows, vec![WindowId(2)]);
    assert_eq!(host.window_ids(), vec![WindowId(1)]);
    assert_eq!(
        urls(&host, WindowId(1)),
        vec!["https://pinned.example/", "https://a.com/", "https://b.com/"]
    );
    assert_eq!(host.focused_window(), Some(WindowId(1)));
    let health = engine.health();
    assert_eq!(health.merges_run, 1);
    assert_eq!(health.windows_closed, 1);
}

#[tokio::test]
async fn merge_targets_the_current_window() {
    let host = host(
        r#"{ "focused": 2, "windows": [
            { "id": 1, "tabs": [ { "id": 1, "url": "https://a.com/" } ] },
            { "id": 2, "tabs": [ { "id": 2, "url": "https://b.com/" } ] }
        ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.merge_windows().await.expect("merge");

    assert_eq!(report.target, Some(WindowId(2)));
    assert_eq!(host.window_ids(), vec![WindowId(2)]);
    assert_eq!(host.window_tab_ids(WindowId(2)), vec![TabId(1), TabId(2)]);
}

#[tokio::test]
async fn failed_move_keeps_its_window_open() {
    let host = host(
        r#"{ "focused": 1, "windows": [
            { "id": 1, "tabs": [ { "id": 1, "url": "https://a.com/" } ] },
            { "id": 2, "tabs": [
                { "id": 2, "url": "https://b.com/" },
                { "id": 3, "url": "https://c.com/" }
            ] }
        ] }"#,
    );
    host.fail_next(HostOp::MoveTab, HostError::Unavailable("busy".to_string()));
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.merge_windows().await.expect("merge");

    assert_eq!(report.failed, vec![TabId(2)]);
    assert_eq!(report.moved, vec![TabId(3)]);
    assert!(report.closed_windows.is_empty());
    assert_eq!(host.window_tab_ids(WindowId(2)), vec![TabId(2)]);
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1), TabId(3)]);
}

#[tokio::test]
async fn single_window_merge_only_sorts() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://b.com/" },
            { "id": 2, "url": "https://a.com/" }
        ] } ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.merge_windows().await.expect("merge");

    assert!(report.closed_windows.is_empty());
    assert_eq!(report.sort.map(|sort| sort.moved.len()), Some(1));
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(2), TabId(1)]);
}

#[tokio::test]
async fn single_window_merge_survives_a_failed_sort() {
    let host = host(
        r#"{ "windows": [ { "id": 1, "tabs": [
            { "id": 1, "url": "https://b.com/" },
            { "id": 2, "url": "https://a.com/" }
        ] } ] }"#,
    );
    host.fail_next(HostOp::ListTabs, HostError::Unavailable("busy".to_string()));
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let report = engine.merge_windows().await.expect("merge");

    assert_eq!(report.target, Some(WindowId(1)));
    assert!(report.sort.is_none());
    assert_eq!(engine.health().merges_run, 1);
    assert_eq!(host.window_tab_ids(WindowId(1)), vec![TabId(1), TabId(2)]);
}

#[tokio::test]
async fn overlapping_merges_are_refused() {
    let host = host(
        r#"{ "focused": 1, "windows": [
            { "id": 1, "tabs": [ { "id": 1, "url": "https://a.com/" } ] },
            { "id": 2, "tabs": [ { "id": 2, "url": "https://b.com/" } ] }
        ] }"#,
    );
    let engine = TabEngine::new(host.clone(), EngineConfig::default());

    let (first, second) = tokio::join!(engine.merge_windows(), engine.merge_windows());
    let first = first.expect("first merge");
    let second = second.expect("second merge");

    assert!(!first.skipped);
    assert!(second.skipped);
    assert_eq!(engine.health().merges_run, 1);

    // The guard is released once the first merge finishes.
    let third = engine.merge_windows().await.expect("third merge");
    assert!(!third.skipped);
}
