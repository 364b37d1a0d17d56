//! Shared helpers for the integration tests: a call-room relay, a fake REST
//! backend and fake media/peer implementations.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use flow_client::call::CallSession;
use flow_client::media::{LocalMedia, MediaConstraints, MediaDevices, MediaError, SampleMediaDevices};
use flow_client::peer::{IceServerConfig, PeerConnection, PeerConnector, PeerError, PeerEvent};
use flow_client::signaling::{IceCandidate, SessionDescription};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as WsResponse};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(3);

// ============================================================================
// TOKENS
// ============================================================================

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unsigned JWT with the given expiry; every call yields a distinct token
pub fn forge_token(exp: i64) -> String {
    let header = BASE64URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = json!({
        "exp": exp,
        "token_type": "access",
        "user_id": 7,
        "jti": TOKEN_SEQ.fetch_add(1, Ordering::SeqCst),
    });
    let payload = BASE64URL.encode(payload.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// RELAY
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub room: String,
    pub from: u64,
    pub body: Value,
}

#[derive(Default)]
struct RelayState {
    next_id: AtomicU64,
    rooms: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Message>)>>>,
    frames: Mutex<Vec<RecordedFrame>>,
    connections: Mutex<Vec<(String, Option<String>)>>,
}

/// Forwards every text frame to the other members of the same room and
/// records it. Frames are never echoed back to their sender.
pub struct Relay {
    pub addr: SocketAddr,
    state: Arc<RelayState>,
}

impl Relay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(RelayState::default());

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_member(stream, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn frames(&self, room: &str) -> Vec<RecordedFrame> {
        self.state
            .frames
            .lock()
            .iter()
            .filter(|f| f.room == room)
            .cloned()
            .collect()
    }

    pub fn count(&self, room: &str, kind: &str) -> usize {
        self.frames(room)
            .iter()
            .filter(|f| f.body["type"] == kind)
            .count()
    }

    pub fn members(&self, room: &str) -> usize {
        self.state.rooms.lock().get(room).map_or(0, Vec::len)
    }

    /// (room, token) of every accepted connection
    pub fn connections(&self) -> Vec<(String, Option<String>)> {
        self.state.connections.lock().clone()
    }

    /// Closes every member connection of `room` from the relay side
    pub fn disconnect(&self, room: &str) {
        if let Some(members) = self.state.rooms.lock().remove(room) {
            for (_, tx) in members {
                let _ = tx.send(Message::Close(None));
            }
        }
    }

    pub async fn wait_for(&self, room: &str, kind: &str, at_least: usize) -> bool {
        wait_until(|| self.count(room, kind) >= at_least).await
    }

    pub async fn wait_for_members(&self, room: &str, members: usize) -> bool {
        wait_until(|| self.members(room) == members).await
    }
}

async fn serve_member(stream: tokio::net::TcpStream, state: Arc<RelayState>) {
    let mut path = String::new();
    let mut token = None;
    let callback = |req: &Request, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
        path = req.uri().path().to_string();
        token = req.uri().query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "token")
                .map(|(_, v)| v.into_owned())
        });
        Ok(resp)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let room = path
        .trim_start_matches("/ws/call/")
        .trim_end_matches('/')
        .to_string();
    state.connections.lock().push((room.clone(), token));

    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state
        .rooms
        .lock()
        .entry(room.clone())
        .or_default()
        .push((id, tx));

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => {
                let body = serde_json::from_str(&text).unwrap_or(Value::String(text.clone()));
                state.frames.lock().push(RecordedFrame {
                    room: room.clone(),
                    from: id,
                    body,
                });

                for (member, tx) in state.rooms.lock().get(&room).into_iter().flatten() {
                    if *member != id {
                        let _ = tx.send(Message::Text(text.clone()));
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(members) = state.rooms.lock().get_mut(&room) {
        members.retain(|(member, _)| *member != id);
    }
}

/// Raw relay member for injecting arbitrary frames
pub async fn raw_member(
    relay: &Relay,
    room: &str,
) -> futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
> {
    let url = format!("{}/ws/call/{}/", relay.ws_base(), room);
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (sink, _stream) = ws.split();
    sink
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Processes inputs until `done` holds; panics after `WAIT`
pub async fn drive_until(session: &mut CallSession, mut done: impl FnMut(&CallSession) -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !done(&*session) {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        tokio::time::timeout(remaining, session.process_next())
            .await
            .unwrap_or_else(|_| panic!("timed out, session is {:?}", session));
    }
}

// ============================================================================
// FAKE BACKEND
// ============================================================================

#[derive(Default)]
pub struct BackendState {
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub reject_refresh: AtomicBool,
    /// Next authenticated GET /posts/ answers 401 once
    pub unauthorized_once: AtomicBool,
    /// Lifetime of issued access tokens in seconds
    pub access_ttl: AtomicI64,
    pub bearers: Mutex<Vec<String>>,
    /// Bodies of public password-reset calls, with the path they hit
    pub reset_calls: Mutex<Vec<(String, Value)>>,
}

pub struct Backend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl Backend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        state.access_ttl.store(300, Ordering::SeqCst);

        let app = Router::new()
            .route("/login/", post(login))
            .route("/login/logout/", post(logout))
            .route("/token/generate-access-token/", post(refresh))
            .route("/call/create-room/", post(create_room))
            .route("/call/join-room/{room}/", post(join_room))
            .route("/posts/", get(posts))
            .route("/userauth/password-reset/", post(request_reset))
            .route("/userauth/password-reset/verify/{uid}/{token}/", get(verify_reset))
            .route("/userauth/password-reset/confirm/", post(confirm_reset))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }
}

fn issue_access(state: &BackendState) -> String {
    forge_token(now() + state.access_ttl.load(Ordering::SeqCst))
}

fn bearer(state: &BackendState, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .to_string();
    state.bearers.lock().push(token.clone());
    Some(token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Authentication credentials were not provided." })),
    )
        .into_response()
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);
    if body["password"] == "wrong" {
        return unauthorized();
    }
    Json(json!({
        "access": issue_access(&state),
        "refresh": forge_token(now() + 86_400),
        "user_id": 7,
        "email": body["email"],
    }))
    .into_response()
}

async fn logout(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if bearer(&state, &headers).is_none() {
        return unauthorized();
    }
    state.logouts.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "detail": "Logged out" })).into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    if state.reject_refresh.load(Ordering::SeqCst) || body["refresh"].as_str().is_none() {
        return unauthorized();
    }
    Json(json!({ "access": issue_access(&state) })).into_response()
}

async fn create_room(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if bearer(&state, &headers).is_none() {
        return unauthorized();
    }
    Json(json!({ "room_name": "room-42" })).into_response()
}

async fn join_room(
    State(state): State<Arc<BackendState>>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> Response {
    if bearer(&state, &headers).is_none() {
        return unauthorized();
    }
    Json(json!({ "room_name": room })).into_response()
}

async fn posts(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if bearer(&state, &headers).is_none() || state.unauthorized_once.swap(false, Ordering::SeqCst) {
        return unauthorized();
    }
    Json(json!([{ "id": 1, "content": "Welcome to Flow", "likes": 3 }])).into_response()
}

/// Token the fake backend accepts in reset links
pub const RESET_TOKEN: &str = "c1a-9f0e";

async fn request_reset(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.contains_key("authorization") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "unexpected credentials" }))).into_response();
    }
    state
        .reset_calls
        .lock()
        .push(("password-reset".into(), body));
    Json(json!({ "detail": "Password reset email sent." })).into_response()
}

async fn verify_reset(Path((uid, token)): Path<(String, String)>) -> Response {
    if uid == "MTI" && token == RESET_TOKEN {
        Json(json!({ "valid": true })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Invalid or expired reset link." })),
        )
            .into_response()
    }
}

async fn confirm_reset(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body["token"] != RESET_TOKEN {
        return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Invalid token" }))).into_response();
    }
    state.reset_calls.lock().push(("confirm".into(), body));
    Json(json!({ "detail": "Password has been reset." })).into_response()
}

// ============================================================================
// FAKE MEDIA / PEER
// ============================================================================

/// getUserMedia that always fails with a permission error
pub struct DeniedMediaDevices;

#[async_trait]
impl MediaDevices for DeniedMediaDevices {
    async fn get_user_media(&self, _constraints: MediaConstraints) -> Result<LocalMedia, MediaError> {
        Err(MediaError::PermissionDenied)
    }
}

pub fn sample_devices() -> Arc<dyn MediaDevices> {
    Arc::new(SampleMediaDevices::new())
}

/// In-memory peer: emits one local candidate per local description
pub struct FakePeer {
    name: String,
    events: mpsc::UnboundedSender<PeerEvent>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub closed: AtomicBool,
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_local_media(&self, _media: &LocalMedia) -> Result<(), PeerError> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        Ok(SessionDescription::offer(format!("v=0 offer from {}", self.name)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        if self.remote.lock().is_none() {
            return Err(PeerError::WebRtc("no remote offer".into()));
        }
        Ok(SessionDescription::answer(format!("v=0 answer from {}", self.name)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        *self.local.lock() = Some(description);
        let _ = self.events.send(PeerEvent::IceCandidate(IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 127.0.0.1 50000 typ host", self.name),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.remote.lock().is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out `FakePeer`s and keeps them for inspection
pub struct FakeConnector {
    name: String,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            peers: Mutex::new(Vec::new()),
        })
    }

    pub fn last(&self) -> Arc<FakePeer> {
        self.peers.lock().last().cloned().expect("no peer created")
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        _ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = Arc::new(FakePeer {
            name: self.name.clone(),
            events,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}
