use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{Domain, NewUser, UserRecord},
    error::ErrorBody,
    protocol::{UserListQuery, UserListResponse, USER_GET_PATH, USER_POST_PATH},
};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BackendMode {
    #[default]
    Healthy,
    /// Non-2xx with a JSON `{ error }` body.
    Failing,
    /// Non-2xx with an HTML body.
    BadGateway,
    /// 2xx whose `data` is not an array.
    MalformedList,
}

#[derive(Default)]
pub(crate) struct BackendState {
    pub(crate) mode: BackendMode,
    pub(crate) users: Vec<UserRecord>,
    pub(crate) get_hits: usize,
    pub(crate) post_hits: usize,
    pub(crate) slow_domain: Option<(Domain, Duration)>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    pub(crate) state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut BackendState) -> R) -> R {
        let mut guard = self.state.lock().expect("backend state");
        f(&mut guard)
    }

    pub(crate) fn set_mode(&self, mode: BackendMode) {
        self.with(|state| state.mode = mode);
    }

    pub(crate) fn hits(&self) -> (usize, usize) {
        self.with(|state| (state.get_hits, state.post_hits))
    }

    pub(crate) fn seed(&self, user: NewUser) {
        self.with(|state| {
            state.next_id += 1;
            let id = format!("rest-{}", state.next_id);
            state.users.push(UserRecord::from_new(id, user));
        });
    }
}

fn failure(mode: BackendMode) -> Option<Response> {
    match mode {
        BackendMode::Failing => Some(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("database unavailable")),
            )
                .into_response(),
        ),
        BackendMode::BadGateway => Some(
            (
                StatusCode::BAD_GATEWAY,
                "<html><body>502 Bad Gateway</body></html>",
            )
                .into_response(),
        ),
        BackendMode::Healthy | BackendMode::MalformedList => None,
    }
}

async fn handle_user_get(
    State(backend): State<MockBackend>,
    Query(query): Query<UserListQuery>,
) -> Response {
    let (mode, delay) = backend.with(|state| {
        state.get_hits += 1;
        let delay = state
            .slow_domain
            .filter(|(domain, _)| *domain == query.domain)
            .map(|(_, delay)| delay);
        (state.mode, delay)
    });
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(response) = failure(mode) {
        return response;
    }
    if mode == BackendMode::MalformedList {
        return Json(serde_json::json!({ "data": { "unexpected": true } })).into_response();
    }

    let data = backend.with(|state| {
        state
            .users
            .iter()
            .filter(|user| user.domain == query.domain)
            .cloned()
            .collect::<Vec<_>>()
    });
    Json(UserListResponse { data }).into_response()
}

async fn handle_user_post(
    State(backend): State<MockBackend>,
    Json(user): Json<NewUser>,
) -> Response {
    let mode = backend.with(|state| {
        state.post_hits += 1;
        state.mode
    });
    if let Some(response) = failure(mode) {
        return response;
    }

    let record = backend.with(|state| {
        state.next_id += 1;
        let record = UserRecord::from_new(format!("rest-{}", state.next_id), user);
        state.users.push(record.clone());
        record
    });
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "User created", "data": record })),
    )
        .into_response()
}

pub(crate) async fn spawn_backend() -> (String, MockBackend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let backend = MockBackend::default();
    let app = Router::new()
        .route(USER_GET_PATH, get(handle_user_get))
        .route(USER_POST_PATH, post(handle_user_post))
        .with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), backend)
}

/// Base URL of a port nothing listens on.
pub(crate) async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub(crate) async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub(crate) fn alice() -> NewUser {
    NewUser {
        name: "Alice".into(),
        email: "a@x.com".into(),
        domain: Domain::AShop,
    }
}
