//! End-to-end sync against an in-process backend.
//!
//! The fake backend serves the room state over HTTP and fans out every
//! mutation as a push frame, so the client sees both channels exactly as it
//! would against the real server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

use planpoker::actions::Dispatcher;
use planpoker::config::ClientConfig;
use planpoker::lobby::Lobby;
use planpoker::net::api::{HttpApi, RoomBackend};
use planpoker::net::types::{Card, Participant, RoomInfo, RoomSnapshot, Task, TaskStatus, Vote};
use planpoker::notify::{Notice, Notifier};
use planpoker::state::session::{SessionStore, SharedSession, lock};
use planpoker::sync::RoomSync;

// =============================================================================
// FAKE BACKEND
// =============================================================================

#[derive(Clone)]
struct Fake {
    snapshot: Arc<Mutex<RoomSnapshot>>,
    pushes: broadcast::Sender<String>,
    joins: mpsc::UnboundedSender<Value>,
}

impl Fake {
    fn push(&self, event: &str, snapshot: &RoomSnapshot) {
        let frame = json!({ "event": event, "data": snapshot }).to_string();
        self.pushes.send(frame).ok();
    }
}

fn initial_snapshot() -> RoomSnapshot {
    let task = Task {
        id: "t1".to_owned(),
        title: "Login page".to_owned(),
        status: TaskStatus::Active,
        ..Task::default()
    };
    RoomSnapshot {
        room: Some(RoomInfo {
            id: "ROOM1".to_owned(),
            name: "Sprint".to_owned(),
            active_task_id: Some("t1".to_owned()),
            ..RoomInfo::default()
        }),
        users: vec![
            Participant { id: "u1".to_owned(), name: "Ada".to_owned(), is_admin: true, ..Participant::default() },
            Participant { id: "u2".to_owned(), name: "Bob".to_owned(), ..Participant::default() },
        ],
        tasks: vec![task.clone()],
        votes: Vec::new(),
        active_task: Some(task),
    }
}

async fn state(State(fake): State<Fake>, Path(room_id): Path<String>) -> Result<Json<RoomSnapshot>, StatusCode> {
    if room_id != "ROOM1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(fake.snapshot.lock().unwrap().clone()))
}

async fn join(Path(room_id): Path<String>, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if room_id != "ROOM1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "user": { "id": "u1", "name": body["name"], "is_admin": true, "is_spectator": body["is_spectator"] },
        "room": { "id": "ROOM1", "name": "Sprint", "cards_revealed": false }
    })))
}

async fn vote(State(fake): State<Fake>, Json(body): Json<Value>) -> StatusCode {
    let user_id = body["user_id"].as_str().unwrap_or_default().to_owned();
    let snapshot = {
        let mut snapshot = fake.snapshot.lock().unwrap();
        snapshot.votes.retain(|v| v.user_id != user_id);
        snapshot.votes.push(Vote {
            user_id,
            task_id: body["task_id"].as_str().map(str::to_owned),
            value: body["value"].as_str().map(str::to_owned),
        });
        snapshot.clone()
    };
    fake.push("state_update", &snapshot);
    StatusCode::OK
}

async fn reveal(State(fake): State<Fake>) -> StatusCode {
    let snapshot = {
        let mut snapshot = fake.snapshot.lock().unwrap();
        if let Some(room) = snapshot.room.as_mut() {
            room.cards_revealed = true;
        }
        snapshot.clone()
    };
    fake.push("reveal_votes", &snapshot);
    StatusCode::OK
}

async fn ws(upgrade: WebSocketUpgrade, State(fake): State<Fake>) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, fake))
}

async fn serve_socket(mut socket: WebSocket, fake: Fake) {
    let mut pushes = fake.pushes.subscribe();
    if let Some(Ok(Message::Text(text))) = socket.recv().await {
        let announcement: Value = serde_json::from_str(text.as_str()).unwrap();
        fake.joins.send(announcement).ok();
    }
    while let Ok(frame) = pushes.recv().await {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}

async fn spawn_backend() -> (SocketAddr, Fake, mpsc::UnboundedReceiver<Value>) {
    let (pushes, _) = broadcast::channel(16);
    let (joins, join_rx) = mpsc::unbounded_channel();
    let fake = Fake { snapshot: Arc::new(Mutex::new(initial_snapshot())), pushes, joins };

    let app = Router::new()
        .route("/api/rooms/{room_id}/state", get(state))
        .route("/api/rooms/{room_id}/join", post(join))
        .route("/api/vote", post(vote))
        .route("/api/reveal", post(reveal))
        .route("/ws", get(ws))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fake, join_rx)
}

// =============================================================================
// HELPERS
// =============================================================================

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

async fn next_notice_matching(notices: &mut mpsc::UnboundedReceiver<Notice>, message: &str) {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(notice) = notices.recv().await {
            if notice.message == message {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(found, Ok(true), "notice `{message}` never arrived");
}

struct Client {
    session: SharedSession,
    sync: RoomSync,
    dispatcher: Dispatcher,
    notices: mpsc::UnboundedReceiver<Notice>,
}

async fn join_and_sync(addr: SocketAddr) -> Client {
    let mut config = ClientConfig::new(&format!("http://{addr}")).unwrap();
    // Long enough that only the first poll runs during the test.
    config.poll_interval = Duration::from_secs(60);
    let backend: Arc<dyn RoomBackend> = Arc::new(HttpApi::new(&config.base_url, config.connect_timeout).unwrap());
    let session = SessionStore::in_memory().into_shared();
    let (notifier, notices) = Notifier::channel();

    Lobby::new(backend.clone(), session.clone(), notifier.clone())
        .join_room("room1", "Ada", false)
        .await
        .unwrap();
    let sync = RoomSync::start(&config, backend.clone(), session.clone(), notifier.clone()).unwrap();
    let dispatcher = Dispatcher::new(backend, sync.fetcher(), notifier);
    Client { session, sync, dispatcher, notices }
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn both_channels_feed_the_session() {
    let (addr, fake, mut joins) = spawn_backend().await;
    let mut client = join_and_sync(addr).await;

    let announcement = tokio::time::timeout(Duration::from_secs(5), joins.recv()).await.unwrap().unwrap();
    assert_eq!(announcement, json!({ "event": "join_room", "data": { "room_id": "ROOM1", "user_id": "u1" } }));
    eventually("first poll", || lock(&client.session).snapshot().active_task_id() == Some("t1")).await;
    eventually("push connected", || lock(&client.session).is_connected()).await;

    // Another participant votes; only the push channel can deliver it.
    let other = {
        let mut snapshot = fake.snapshot.lock().unwrap();
        snapshot.votes.push(Vote {
            user_id: "u2".to_owned(),
            task_id: Some("t1".to_owned()),
            value: Some("3".to_owned()),
        });
        snapshot.clone()
    };
    fake.push("state_update", &other);
    eventually("pushed vote", || lock(&client.session).snapshot().has_vote_from("u2")).await;

    client.dispatcher.cast_vote(Card::Points(5)).await.unwrap();
    {
        let store = lock(&client.session);
        assert_eq!(store.selected_card(), Some(Card::Points(5)));
        assert_eq!(store.my_vote(), Some("5"));
        assert!(store.snapshot().all_voted());
    }

    client.dispatcher.reveal_cards().await.unwrap();
    next_notice_matching(&mut client.notices, "Cards revealed!").await;
    {
        let store = lock(&client.session);
        assert!(store.snapshot().cards_revealed());
        assert_eq!(store.selected_card(), Some(Card::Points(5)));
    }

    let sync_reconciler = client.sync.reconciler().clone();
    client.sync.shutdown().await;
    fake.push("state_update", &initial_snapshot());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sync_reconciler.is_alive());
    assert!(lock(&client.session).snapshot().cards_revealed());
    assert!(!lock(&client.session).is_connected());
}

#[tokio::test]
async fn joining_an_unknown_room_is_not_found() {
    let (addr, _fake, _joins) = spawn_backend().await;
    let backend: Arc<dyn RoomBackend> =
        Arc::new(HttpApi::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap());
    let session = SessionStore::in_memory().into_shared();
    let (notifier, mut notices) = Notifier::channel();

    let result = Lobby::new(backend, session.clone(), notifier).join_room("nope0000", "Ada", false).await;

    assert!(matches!(result, Err(planpoker::error::ClientError::NotFound { .. })));
    assert!(lock(&session).user().is_none());
    assert_eq!(notices.recv().await.unwrap().message, "Room not found");
}
