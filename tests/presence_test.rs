use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use myacademics::services::presence::CellRect;
use myacademics::services::{CursorOverlay, CursorPosition, GridLayout, PresenceBus, PresenceEvent, PresenceHub};

const TTL: Duration = Duration::from_secs(30);

fn layout() -> GridLayout {
    GridLayout {
        row_keys: vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
        column_keys: vec!["math-cc".to_string(), "math-ef".to_string()],
        cell_width: 80.0,
        cell_height: 24.0,
        origin_x: 120.0,
        origin_y: 32.0,
    }
}

fn cursor(user: &str, cell: &str) -> CursorPosition {
    CursorPosition {
        user_id: user.to_string(),
        user_name: format!("User {}", user),
        cell_id: cell.to_string(),
        color: "#e11d48".to_string(),
        timestamp: Utc::now(),
    }
}

fn connected(users: &[&str]) -> HashSet<String> {
    users.iter().map(|u| u.to_string()).collect()
}

/// Lets spawned listeners catch up; the paused clock advances only when idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[test]
fn test_layout_locates_cells() {
    let layout = layout();
    assert_eq!(
        layout.locate("s2:math-ef"),
        Some(CellRect { x: 200.0, y: 56.0, width: 80.0, height: 24.0 })
    );
    assert_eq!(layout.locate("s1:math-cc").map(|r| (r.x, r.y)), Some((120.0, 32.0)));
    assert_eq!(layout.locate("s9:math-cc"), None);
    assert_eq!(layout.locate("no-separator"), None);
    assert_eq!(GridLayout::cell_id("s3", "math-cc"), "s3:math-cc");
}

#[tokio::test(start_paused = true)]
async fn test_cursor_expires_after_ttl() {
    let overlay = CursorOverlay::new(layout(), TTL);
    overlay.update(cursor("x", "s1:math-cc")).await;
    assert!(overlay.cursor_for("x").await.is_some());

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(overlay.cursor_for("x").await.is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(overlay.cursor_for("x").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_older_timer_does_not_prune_newer_cursor() {
    let overlay = CursorOverlay::new(layout(), TTL);
    overlay.update(cursor("x", "s1:math-cc")).await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    overlay.update(cursor("x", "s2:math-cc")).await;

    // first timer fires at 30s, the second update is still live
    tokio::time::sleep(Duration::from_secs(11)).await;
    let live = overlay.cursor_for("x").await.expect("cursor pruned by stale timer");
    assert_eq!(live.cell_id, "s2:math-cc");

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(overlay.cursor_for("x").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_one_indicator_per_user() {
    let overlay = CursorOverlay::new(layout(), TTL);
    overlay.update(cursor("x", "s1:math-cc")).await;
    overlay.update(cursor("x", "s3:math-ef")).await;
    overlay.update(cursor("y", "s1:math-ef")).await;

    let cursors = overlay.cursors().await;
    assert_eq!(cursors.len(), 2);
    assert_eq!(cursors[0].user_id, "x");
    assert_eq!(cursors[0].cell_id, "s3:math-ef");
    assert_eq!(cursors[0].rect.y, 32.0 + 2.0 * 24.0);
    assert_eq!(cursors[1].user_id, "y");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_cell_is_ignored() {
    let overlay = CursorOverlay::new(layout(), TTL);
    overlay.update(cursor("x", "s1:physics-cc")).await;
    assert!(overlay.cursors().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_presence_sync_prunes_disconnected_users_immediately() {
    let overlay = CursorOverlay::new(layout(), TTL);
    overlay.update(cursor("x", "s1:math-cc")).await;
    overlay.update(cursor("y", "s2:math-cc")).await;

    overlay.sync(&connected(&["y", "z"])).await;

    assert!(overlay.cursor_for("x").await.is_none());
    assert!(overlay.cursor_for("y").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_overlay_listens_to_bus() {
    let bus = PresenceBus::new();
    let overlay = CursorOverlay::new(layout(), TTL);
    let listener = overlay.listen(&bus);

    assert_eq!(bus.publish(PresenceEvent::CursorUpdate(cursor("x", "s1:math-cc"))), 1);
    bus.publish(PresenceEvent::CursorUpdate(cursor("y", "s1:math-ef")));
    settle().await;
    assert_eq!(overlay.cursors().await.len(), 2);

    bus.publish(PresenceEvent::PresenceSync { connected: connected(&["y"]) });
    settle().await;
    let remaining = overlay.cursors().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, "y");

    drop(bus);
    listener.await.expect("listener panicked");
}

#[tokio::test(start_paused = true)]
async fn test_hub_reuses_sessions() {
    let hub = PresenceHub::new(TTL);
    assert!(hub.session("grid-1").await.is_none());

    let session = hub.open("grid-1", layout()).await;
    session.bus.publish(PresenceEvent::CursorUpdate(cursor("x", "s1:math-cc")));
    settle().await;

    let mut wider = layout();
    wider.cell_width = 100.0;
    let reopened = hub.open("grid-1", wider).await;
    assert_eq!(reopened.overlay.cursors().await.len(), 1);

    reopened.bus.publish(PresenceEvent::CursorUpdate(cursor("y", "s1:math-ef")));
    settle().await;
    let y = session.overlay.cursor_for("y").await.expect("shared overlay");
    assert_eq!(y.rect.x, 120.0 + 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_closed_sessions_are_dropped() {
    let hub = PresenceHub::new(TTL);
    let kept = hub.open("grid-1", layout()).await;
    let closed = hub.open("grid-2", layout()).await;
    assert_eq!(hub.session_count().await, 2);

    assert!(hub.close("grid-2").await);
    assert!(!hub.close("grid-2").await);
    assert!(hub.session("grid-2").await.is_none());
    assert_eq!(hub.session_count().await, 1);

    settle().await;
    assert_eq!(closed.bus.publish(PresenceEvent::CursorUpdate(cursor("x", "s1:math-cc"))), 0);
    assert_eq!(kept.bus.publish(PresenceEvent::CursorUpdate(cursor("x", "s1:math-cc"))), 1);
}

#[test]
fn test_event_wire_format() {
    let event: PresenceEvent = serde_json::from_value(serde_json::json!({
        "kind": "presence_sync",
        "connected": ["a", "b"]
    }))
    .unwrap();
    assert_eq!(event, PresenceEvent::PresenceSync { connected: connected(&["a", "b"]) });

    let update: PresenceEvent = serde_json::from_value(serde_json::json!({
        "kind": "cursor_update",
        "user_id": "u1",
        "user_name": "Ada",
        "cell_id": "s1:math-cc",
        "color": "#000"
    }))
    .unwrap();
    assert!(matches!(update, PresenceEvent::CursorUpdate(ref p) if p.user_id == "u1"));
}
