use super::*;
use crate::config::ReconnectPolicy;
use crate::notify::NoticeLevel;
use crate::state::session::{SessionStore, lock};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

fn listener() -> (PushListener, tokio::sync::mpsc::UnboundedReceiver<crate::notify::Notice>) {
    let session = SessionStore::in_memory().into_shared();
    let reconciler = Reconciler::new(session);
    let (notifier, rx) = Notifier::channel();
    let listener = PushListener::new(
        "ws://127.0.0.1:9/ws".to_owned(),
        "ROOM1".to_owned(),
        "u1".to_owned(),
        ReconnectPolicy::default(),
        reconciler,
        notifier,
    );
    (listener, rx)
}

fn frame(event: &str, revealed: bool) -> String {
    json!({
        "event": event,
        "data": {
            "room": { "id": "ROOM1", "name": "Sprint", "cards_revealed": revealed },
            "votes": [ { "user_id": "u1", "task_id": "t1", "value": "5" } ],
            "active_task": { "id": "t1", "title": "Login", "status": "ACTIVE" }
        }
    })
    .to_string()
}

#[test]
fn parse_state_update_carries_snapshot() {
    let event = parse_event(&frame("state_update", false)).unwrap();
    let PushEvent::StateUpdate(snapshot) = event else {
        panic!("expected state_update");
    };
    assert_eq!(snapshot.active_task_id(), Some("t1"));
}

#[test]
fn parse_reveal_votes_carries_snapshot() {
    let event = parse_event(&frame("reveal_votes", true)).unwrap();
    assert!(matches!(event, PushEvent::RevealVotes(ref s) if s.cards_revealed()));
}

#[test]
fn unknown_event_is_reported_not_rejected() {
    let event = parse_event(r#"{"event":"user_left","data":{"user_id":"u2"}}"#).unwrap();
    assert_eq!(event, PushEvent::Other("user_left".to_owned()));
}

#[test]
fn malformed_frames_are_errors() {
    assert!(parse_event("not json").is_err());
    assert!(parse_event(r#"{"event":"state_update","data":{"users":"nope"}}"#).is_err());
}

#[test]
fn join_room_message_shape() {
    let raw = join_room_message("ROOM1", "u1").unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value, json!({ "event": "join_room", "data": { "room_id": "ROOM1", "user_id": "u1" } }));
}

#[test]
fn state_update_is_applied_without_notice() {
    let (listener, mut notices) = listener();
    listener.dispatch_text(&frame("state_update", false));
    assert_eq!(lock(listener.reconciler.session()).snapshot().active_task_id(), Some("t1"));
    assert!(notices.try_recv().is_err());
}

#[test]
fn reveal_votes_is_applied_and_announced_once() {
    let (listener, mut notices) = listener();
    listener.dispatch_text(&frame("reveal_votes", true));
    assert!(lock(listener.reconciler.session()).snapshot().cards_revealed());
    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "Cards revealed!");
    assert!(notices.try_recv().is_err());
}

#[test]
fn malformed_frame_leaves_snapshot_untouched() {
    let (listener, _notices) = listener();
    listener.dispatch_text(&frame("state_update", false));
    listener.dispatch_text(r#"{"event":"state_update","data":"oops"}"#);
    assert_eq!(lock(listener.reconciler.session()).snapshot().active_task_id(), Some("t1"));
}

#[test]
fn reveal_after_teardown_is_silent() {
    let (listener, mut notices) = listener();
    listener.reconciler.close();
    listener.dispatch_text(&frame("reveal_votes", true));
    assert!(!lock(listener.reconciler.session()).snapshot().cards_revealed());
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn bounded_policy_stops_after_failed_attempts() {
    let session = SessionStore::in_memory().into_shared();
    let reconciler = Reconciler::new(session);
    let (notifier, mut notices) = Notifier::channel();
    let policy = ReconnectPolicy { max_attempts: Some(2), jitter: false, ..ReconnectPolicy::default() };
    let port = {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        reserved.local_addr().unwrap().port()
    };
    let listener = PushListener::new(
        format!("ws://127.0.0.1:{port}/ws"),
        "ROOM1".to_owned(),
        "u1".to_owned(),
        policy,
        reconciler.clone(),
        notifier,
    );

    listener.run().await;

    let mut errors = 0;
    while let Ok(notice) = notices.try_recv() {
        assert_eq!(notice.message, "Connection error. Retrying...");
        errors += 1;
    }
    assert_eq!(errors, 2);
    assert!(!lock(reconciler.session()).is_connected());
}

// =============================================================================
// RECONNECT AGAINST A LIVE SOCKET
// =============================================================================

/// What the fake backend does once it has read the `join_room` announcement.
#[derive(Clone)]
enum AfterJoin {
    HangUp,
    WaitForHangUp,
    PushThenHangUp(String),
}

#[derive(Clone)]
struct FakePushServer {
    joins: mpsc::UnboundedSender<String>,
    hang_up: broadcast::Sender<()>,
    after_join: AfterJoin,
}

async fn accept(upgrade: WebSocketUpgrade, State(server): State<FakePushServer>) -> Response {
    upgrade.on_upgrade(move |socket| serve(socket, server))
}

async fn serve(mut socket: WebSocket, server: FakePushServer) {
    let mut hang_up = server.hang_up.subscribe();
    if let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
        server.joins.send(text.to_string()).ok();
    }
    match server.after_join {
        AfterJoin::HangUp => {}
        AfterJoin::WaitForHangUp => {
            hang_up.recv().await.ok();
        }
        AfterJoin::PushThenHangUp(frame) => {
            socket.send(WsMessage::Text(frame.into())).await.ok();
        }
    }
    socket.send(WsMessage::Close(None)).await.ok();
}

async fn spawn_push_server(after_join: AfterJoin) -> (String, mpsc::UnboundedReceiver<String>, broadcast::Sender<()>) {
    let (joins, join_rx) = mpsc::unbounded_channel();
    let (hang_up, _) = broadcast::channel(4);
    let server = FakePushServer { joins, hang_up: hang_up.clone(), after_join };
    let app = Router::new().route("/ws", get(accept)).with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/ws"), join_rx, hang_up)
}

fn live_listener(
    ws_url: String,
    policy: ReconnectPolicy,
) -> (PushListener, Reconciler, mpsc::UnboundedReceiver<crate::notify::Notice>) {
    let reconciler = Reconciler::new(SessionStore::in_memory().into_shared());
    let (notifier, notices) = Notifier::channel();
    let listener = PushListener::new(ws_url, "ROOM1".to_owned(), "u1".to_owned(), policy, reconciler.clone(), notifier);
    (listener, reconciler, notices)
}

async fn next_join(joins: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    let raw = tokio::time::timeout(Duration::from_secs(5), joins.recv()).await.unwrap().unwrap();
    serde_json::from_str(&raw).unwrap()
}

async fn wait_until_disconnected(reconciler: &Reconciler) {
    let dropped = tokio::time::timeout(Duration::from_secs(5), async {
        while lock(reconciler.session()).is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(dropped.is_ok(), "connection flag never dropped");
}

#[tokio::test]
async fn reconnect_reannounces_and_restores_connection_flag() {
    let (url, mut joins, hang_up) = spawn_push_server(AfterJoin::WaitForHangUp).await;
    let policy = ReconnectPolicy { initial_backoff: Duration::from_millis(300), jitter: false, ..ReconnectPolicy::default() };
    let (listener, reconciler, _notices) = live_listener(url, policy);
    let task = tokio::spawn(listener.run());

    let first = next_join(&mut joins).await;
    assert_eq!(first, json!({ "event": "join_room", "data": { "room_id": "ROOM1", "user_id": "u1" } }));
    assert!(lock(reconciler.session()).is_connected());

    hang_up.send(()).unwrap();
    wait_until_disconnected(&reconciler).await;

    let second = next_join(&mut joins).await;
    assert_eq!(second, first);
    assert!(lock(reconciler.session()).is_connected());

    reconciler.close();
    task.abort();
}

#[tokio::test]
async fn connection_dropped_before_any_frame_counts_against_the_limit() {
    let (url, mut joins, _hang_up) = spawn_push_server(AfterJoin::HangUp).await;
    let policy = ReconnectPolicy {
        initial_backoff: Duration::from_millis(10),
        max_attempts: Some(3),
        jitter: false,
        ..ReconnectPolicy::default()
    };
    let (listener, reconciler, mut notices) = live_listener(url, policy);

    let finished = tokio::time::timeout(Duration::from_secs(5), listener.run()).await;

    assert!(finished.is_ok(), "listener kept reconnecting to a backend that always hangs up");
    let mut announced = 0;
    while joins.try_recv().is_ok() {
        announced += 1;
    }
    assert_eq!(announced, 3);
    assert!(!lock(reconciler.session()).is_connected());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn connection_that_delivers_a_frame_resets_the_limit() {
    let (url, mut joins, _hang_up) = spawn_push_server(AfterJoin::PushThenHangUp(frame("state_update", false))).await;
    let policy = ReconnectPolicy {
        initial_backoff: Duration::from_millis(10),
        max_attempts: Some(1),
        jitter: false,
        ..ReconnectPolicy::default()
    };
    let (listener, reconciler, _notices) = live_listener(url, policy);
    let task = tokio::spawn(listener.run());

    for _ in 0..3 {
        next_join(&mut joins).await;
    }

    assert!(!task.is_finished());
    assert_eq!(lock(reconciler.session()).snapshot().active_task_id(), Some("t1"));
    reconciler.close();
    task.abort();
}
