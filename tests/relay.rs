use cowrite_relay::{
    auth::{Claims, DocumentAccess, JwtIdentityProvider, OpenAccess, UnavailableAccess},
    config::Config,
    routes::create_app,
    AppState,
};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};

const SECRET: &str = "integration-secret";
const ORIGIN: &str = "http://localhost:5173";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, AppState) {
    spawn_server_with(Arc::new(OpenAccess)).await
}

async fn spawn_server_with(access: Arc<dyn DocumentAccess>) -> (SocketAddr, AppState) {
    let config = Config {
        jwt_secret: Some(SECRET.to_string()),
        frontend_origin: ORIGIN.to_string(),
        ..Config::default()
    };
    let identity = Arc::new(JwtIdentityProvider::new(config.jwt_secret.clone(), Duration::from_secs(60)));
    let state = AppState::new(config, identity, access);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn token(user_id: i64, username: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn try_connect(addr: SocketAddr, path: &str, origin: &str) -> Result<Client, tungstenite::Error> {
    let mut request = format!("ws://{addr}{path}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_str(origin).unwrap());
    connect_async(request).await.map(|(ws, _)| ws)
}

async fn connect(addr: SocketAddr, document_id: i64, user_id: i64, username: &str) -> Client {
    let path = format!("/ws/{document_id}?token={}", token(user_id, username));
    try_connect(addr, &path, ORIGIN).await.unwrap()
}

async fn next_envelope(ws: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if message.is_text() {
            return serde_json::from_str(message.to_text().unwrap()).unwrap();
        }
    }
}

async fn rejected_status(addr: SocketAddr, path: &str, origin: &str) -> u16 {
    match try_connect(addr, path, origin).await {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("handshake unexpectedly succeeded"),
    }
}

async fn wait_for_sessions(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.registry.session_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("registry never reached {expected} sessions");
}

#[tokio::test]
async fn join_relay_and_leave_sequence() {
    let (addr, state) = spawn_server().await;

    let mut alice = connect(addr, 7, 1, "alice").await;
    let confirmation = next_envelope(&mut alice).await;
    assert_eq!(confirmation, json!({"type": "join", "documentId": 7, "userId": 1, "username": "alice"}));

    let mut bob = connect(addr, 7, 2, "bob").await;
    let announced = next_envelope(&mut alice).await;
    assert_eq!(announced["type"], "join");
    assert_eq!(announced["userId"], 2);
    let own = next_envelope(&mut bob).await;
    assert_eq!(own["type"], "join");
    assert_eq!(own["userId"], 2);

    // Spoofed sender fields are replaced, payload passes through verbatim.
    let spoofed = json!({
        "type": "edit",
        "documentId": 999,
        "userId": 42,
        "username": "mallory",
        "payload": {"ops": [{"insert": "hi", "at": 0}]}
    });
    alice.send(Message::text(spoofed.to_string())).await.unwrap();
    let relayed = next_envelope(&mut bob).await;
    assert_eq!(
        relayed,
        json!({
            "type": "edit",
            "documentId": 7,
            "userId": 1,
            "username": "alice",
            "payload": {"ops": [{"insert": "hi", "at": 0}]}
        })
    );

    // A malformed frame is skipped and the connection stays usable.
    alice.send(Message::text("{{ not json".to_string())).await.unwrap();
    alice
        .send(Message::text(json!({"type": "cursor", "payload": {"pos": 2}}).to_string()))
        .await
        .unwrap();
    let cursor = next_envelope(&mut bob).await;
    assert_eq!(cursor["type"], "cursor");
    assert_eq!(cursor["payload"]["pos"], 2);

    assert_eq!(state.registry.session_count().await, 1);

    alice.close(None).await.unwrap();
    let leave = next_envelope(&mut bob).await;
    assert_eq!(leave, json!({"type": "leave", "documentId": 7, "userId": 1, "username": "alice"}));

    bob.close(None).await.unwrap();
    wait_for_sessions(&state, 0).await;
}

#[tokio::test]
async fn sessions_are_scoped_to_their_document() {
    let (addr, state) = spawn_server().await;

    let mut alice = connect(addr, 1, 1, "alice").await;
    next_envelope(&mut alice).await;
    let mut carol = connect(addr, 2, 3, "carol").await;
    next_envelope(&mut carol).await;
    assert_eq!(state.registry.session_count().await, 2);

    let mut dave = connect(addr, 2, 4, "dave").await;
    next_envelope(&mut dave).await;
    // Dave's join reaches carol only; alice's next frame is the join from
    // her own document.
    assert_eq!(next_envelope(&mut carol).await["userId"], 4);

    let mut alice2 = connect(addr, 1, 5, "alice-laptop").await;
    next_envelope(&mut alice2).await;
    assert_eq!(next_envelope(&mut alice).await["userId"], 5);
}

#[tokio::test]
async fn handshakes_are_refused_before_upgrade() {
    let (addr, state) = spawn_server().await;
    let valid = token(1, "alice");

    assert_eq!(rejected_status(addr, &format!("/ws/7?token={valid}"), "http://evil.example").await, 403);
    assert_eq!(rejected_status(addr, &format!("/ws/seven?token={valid}"), ORIGIN).await, 400);
    assert_eq!(rejected_status(addr, "/ws/7", ORIGIN).await, 401);
    assert_eq!(rejected_status(addr, "/ws/7?token=garbage", ORIGIN).await, 401);

    assert_eq!(state.registry.session_count().await, 0);
}

#[tokio::test]
async fn unreachable_database_refuses_every_document() {
    let (addr, state) = spawn_server_with(Arc::new(UnavailableAccess::new("connection refused"))).await;
    let valid = token(1, "alice");

    assert_eq!(rejected_status(addr, &format!("/ws/7?token={valid}"), ORIGIN).await, 500);
    assert_eq!(state.registry.session_count().await, 0);
}

#[tokio::test]
async fn oversized_frame_tears_down_the_sender() {
    let (addr, state) = spawn_server().await;
    let limit = state.config.max_frame_bytes;

    let mut alice = connect(addr, 8, 1, "alice").await;
    next_envelope(&mut alice).await;
    let mut bob = connect(addr, 8, 2, "bob").await;
    next_envelope(&mut alice).await;
    next_envelope(&mut bob).await;
    assert_eq!(state.registry.stats().await.connections, 2);

    // The server may drop the socket before the write completes.
    let _ = alice.send(Message::text("x".repeat(limit + 1))).await;

    let leave = next_envelope(&mut bob).await;
    assert_eq!(leave, json!({"type": "leave", "documentId": 8, "userId": 1, "username": "alice"}));
    assert!(
        tokio::time::timeout(Duration::from_millis(300), bob.next()).await.is_err(),
        "peer saw more than one frame after the leave"
    );
    assert_eq!(state.registry.stats().await.connections, 1);
    assert_eq!(state.registry.session_count().await, 1);
}
