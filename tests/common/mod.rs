#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Value};

use jurisconsultor_client::config::ClientConfig;
use jurisconsultor_client::{ApiClient, ClientError, MemorySessionStore, Session, SessionStore};

pub const EMAIL: &str = "ana@firm.cl";
pub const PASSWORD: &str = "correct-horse";

type Shared = Arc<BackendState>;

/// Knobs and counters of the mock backend
#[derive(Default)]
pub struct BackendState {
    access_tokens: Mutex<HashSet<String>>,
    refresh_tokens: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<String, usize>>,
    auth_headers: Mutex<Vec<Option<String>>>,
    projects: Mutex<Vec<Value>>,
    tasks: Mutex<Vec<Value>>,
    uploads: Mutex<Vec<(String, usize)>>,
    asks: Mutex<Vec<Value>>,
    token_forms: Mutex<Vec<HashMap<String, String>>>,

    pub refresh_calls: AtomicUsize,
    pub refresh_delay_ms: AtomicU64,
    /// Refresh endpoint answers 401
    pub reject_refresh: AtomicBool,
    /// Refresh endpoint hands out a new refresh token as well
    pub rotate_refresh: AtomicBool,
    /// Tokens issued by refresh are themselves rejected
    pub refresh_issues_dead_tokens: AtomicBool,
    /// Project updates answer 403
    pub forbid_project_updates: AtomicBool,
}

impl BackendState {
    fn hit(&self, route: &str, headers: &HeaderMap) {
        *self.hits.lock().unwrap().entry(route.to_string()).or_default() += 1;
        let auth = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().unwrap().push(auth);
    }

    pub fn hits(&self, route: &str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth_headers.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn asks(&self) -> Vec<Value> {
        self.asks.lock().unwrap().clone()
    }

    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.token_forms.lock().unwrap().clone()
    }

    pub fn project(&self, id: &str) -> Option<Value> {
        self.projects.lock().unwrap().iter().find(|p| p["_id"] == id).cloned()
    }

    pub fn is_valid_refresh(&self, token: &str) -> bool {
        self.refresh_tokens.lock().unwrap().contains(token)
    }

    /// Mint a session the backend accepts
    pub fn issue_session(&self) -> Session {
        let access = self.issue_access(true);
        let refresh = format!("refresh-{}", uuid::Uuid::new_v4());
        self.refresh_tokens.lock().unwrap().insert(refresh.clone());
        Session::new(access, Some(refresh))
    }

    /// Simulate access token expiry
    pub fn expire_access(&self, token: &str) {
        self.access_tokens.lock().unwrap().remove(token);
    }

    fn issue_access(&self, valid: bool) -> String {
        let token = format!("access-{}", uuid::Uuid::new_v4());
        if valid {
            self.access_tokens.lock().unwrap().insert(token.clone());
        }
        token
    }

    fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), Response> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match token {
            Some(token) if self.access_tokens.lock().unwrap().contains(token) => Ok(()),
            _ => Err(detail(StatusCode::UNAUTHORIZED, "Could not validate credentials")),
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn token(State(state): State<Shared>, headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    state.hit("POST /token", &headers);
    state.token_forms.lock().unwrap().push(form.clone());

    if form.get("username").map(String::as_str) != Some(EMAIL) || form.get("password").map(String::as_str) != Some(PASSWORD) {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect username or password");
    }

    let session = state.issue_session();
    Json(json!({
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
        "token_type": "bearer"
    }))
    .into_response()
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("POST /refresh", &headers);
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let presented = body["refresh_token"].as_str().unwrap_or_default().to_string();
    if state.reject_refresh.load(Ordering::SeqCst) || !state.is_valid_refresh(&presented) {
        return detail(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    }

    let access = state.issue_access(!state.refresh_issues_dead_tokens.load(Ordering::SeqCst));
    let mut response = json!({ "access_token": access, "token_type": "bearer" });

    if state.rotate_refresh.load(Ordering::SeqCst) {
        let rotated = format!("refresh-{}", uuid::Uuid::new_v4());
        let mut tokens = state.refresh_tokens.lock().unwrap();
        tokens.remove(&presented);
        tokens.insert(rotated.clone());
        response["refresh_token"] = json!(rotated);
    }

    Json(response).into_response()
}

async fn users_me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.hit("GET /users/me", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    Json(json!({
        "_id": "u1",
        "email": EMAIL,
        "full_name": "Ana Rojas",
        "role": "asunto_lead",
        "company_id": "c1"
    }))
    .into_response()
}

async fn list_projects(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit("GET /projects/", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let include_archived = query.get("include_archived").map(String::as_str) == Some("true");
    let projects: Vec<Value> = state
        .projects
        .lock()
        .unwrap()
        .iter()
        .filter(|p| include_archived || p["is_archived"] == false)
        .cloned()
        .collect();
    Json(projects).into_response()
}

async fn update_project(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.hit("PUT /projects/{id}", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    if state.forbid_project_updates.load(Ordering::SeqCst) {
        return detail(StatusCode::FORBIDDEN, "Only the project owner can archive it");
    }

    let mut projects = state.projects.lock().unwrap();
    let Some(project) = projects.iter_mut().find(|p| p["_id"] == id.as_str()) else {
        return detail(StatusCode::NOT_FOUND, "Project not found");
    };
    if let (Some(target), Some(fields)) = (project.as_object_mut(), body.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    Json(project.clone()).into_response()
}

async fn delete_project(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    state.hit("DELETE /projects/{id}", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    state.projects.lock().unwrap().retain(|p| p["_id"] != id.as_str());
    StatusCode::NO_CONTENT.into_response()
}

async fn project_tasks(State(state): State<Shared>, headers: HeaderMap, Path(project_id): Path<String>) -> Response {
    state.hit("GET /tasks/project/{id}", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let tasks: Vec<Value> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t["project_id"] == project_id.as_str())
        .cloned()
        .collect();
    Json(tasks).into_response()
}

async fn update_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.hit("PUT /tasks/{id}", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    if let Some(email) = body.get("assignee_email").and_then(Value::as_str) {
        if !email.ends_with("@firm.cl") {
            return detail(StatusCode::BAD_REQUEST, "Assignee must be a member of the project");
        }
    }

    let mut tasks = state.tasks.lock().unwrap();
    let Some(task) = tasks.iter_mut().find(|t| t["_id"] == id.as_str()) else {
        return detail(StatusCode::NOT_FOUND, "Task not found");
    };
    if let (Some(target), Some(fields)) = (task.as_object_mut(), body.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    Json(task.clone()).into_response()
}

async fn update_source(State(state): State<Shared>, headers: HeaderMap, Path(_id): Path<String>) -> Response {
    state.hit("PUT /sources/{id}", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "detail": [
                { "loc": ["body", "url"], "msg": "invalid or missing URL scheme", "type": "value_error.url.scheme" }
            ]
        })),
    )
        .into_response()
}

async fn upload_csv(State(state): State<Shared>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    state.hit("POST /sources/upload_csv", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let Ok(bytes) = field.bytes().await else {
            return detail(StatusCode::BAD_REQUEST, "Unreadable upload");
        };
        let rows = String::from_utf8_lossy(&bytes).lines().skip(1).filter(|l| !l.trim().is_empty()).count();
        state.uploads.lock().unwrap().push((file_name, bytes.len()));
        return Json(json!({ "message": format!("Successfully uploaded {} sources.", rows) })).into_response();
    }

    detail(StatusCode::UNPROCESSABLE_ENTITY, "file is required")
}

async fn ask(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("POST /ask", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    state.asks.lock().unwrap().push(body.clone());

    let question = body["question"].as_str().unwrap_or_default();
    let answer = if question.contains("proyecto inexistente") {
        "Error: project not found".to_string()
    } else {
        format!("Respuesta a: {}", question)
    };
    Json(json!({ "answer": answer })).into_response()
}

async fn system_logs(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit("GET /superadmin/logs", &headers);
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let lines: usize = query.get("lines").and_then(|l| l.parse().ok()).unwrap_or(200);
    let log: Vec<String> = (0..lines).map(|i| format!("INFO line {}\n", i)).collect();
    Json(log).into_response()
}

fn seed(state: &BackendState) {
    *state.projects.lock().unwrap() = vec![
        json!({ "_id": "p1", "name": "Sucesión Pérez", "owner_email": EMAIL, "members": [EMAIL], "is_archived": false, "created_at": "2024-05-01T12:00:00.123000" }),
        json!({ "_id": "p2", "name": "Arriendo Las Condes", "owner_email": EMAIL, "members": [EMAIL, "luis@firm.cl"], "is_archived": false, "created_at": "2024-05-02T09:30:00Z" }),
        json!({ "_id": "p3", "name": "Quiebra Comercial Sur", "owner_email": EMAIL, "members": [], "is_archived": true, "created_at": "2023-11-20T16:45:00" }),
    ];
    *state.tasks.lock().unwrap() = vec![
        json!({ "_id": "t1", "project_id": "p1", "title": "Redactar demanda", "status": "todo", "created_at": "2024-05-03T10:15:30.500000" }),
        json!({ "_id": "t2", "project_id": "p1", "title": "Notificar herederos", "status": "in_progress", "assignee_email": EMAIL, "created_at": "2024-05-03T11:00:00+00:00" }),
        json!({ "_id": "t3", "project_id": "p2", "title": "Revisar contrato", "status": "todo" }),
    ];
}

pub struct Backend {
    pub base_url: String,
    pub state: Shared,
    _handle: tokio::task::JoinHandle<()>,
}

impl Backend {
    pub async fn start() -> Result<Self> {
        let state: Shared = Arc::new(BackendState::default());
        seed(&state);

        let app = Router::new()
            .route("/token", post(token))
            .route("/refresh", post(refresh))
            .route("/users/me", get(users_me))
            .route("/projects/", get(list_projects))
            .route("/projects/:id", put(update_project).delete(delete_project))
            .route("/tasks/project/:id", get(project_tasks))
            .route("/tasks/:id", put(update_task))
            .route("/sources/:id", put(update_source))
            .route("/sources/upload_csv", post(upload_csv))
            .route("/ask", post(ask))
            .route("/superadmin/logs", get(system_logs))
            .with_state(state.clone());

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind mock backend")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });

        Ok(Self { base_url, state, _handle: handle })
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::for_base_url(&self.base_url)
    }

    pub fn client(&self, store: Arc<dyn SessionStore>) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.config(), store)?)
    }

    /// Client holding a valid session
    pub fn logged_in_client(&self) -> Result<(ApiClient, Arc<MemorySessionStore>)> {
        let store = Arc::new(MemorySessionStore::with_session(self.state.issue_session()));
        Ok((self.client(store.clone())?, store))
    }

    /// Client whose access token the backend no longer accepts; the refresh token still works
    pub fn expired_client(&self) -> Result<(ApiClient, Arc<MemorySessionStore>)> {
        let session = self.state.issue_session();
        self.state.expire_access(&session.access_token);
        let store = Arc::new(MemorySessionStore::with_session(session));
        Ok((self.client(store.clone())?, store))
    }
}

/// Store wrapper that counts writes and clears
#[derive(Default)]
pub struct CountingStore {
    inner: MemorySessionStore,
    pub sets: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CountingStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: MemorySessionStore::with_session(session),
            ..Self::default()
        }
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl SessionStore for CountingStore {
    fn get(&self) -> std::result::Result<Option<Session>, ClientError> {
        self.inner.get()
    }

    fn set(&self, session: &Session) -> std::result::Result<(), ClientError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(session)
    }

    fn clear(&self) -> std::result::Result<(), ClientError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}
