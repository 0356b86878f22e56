//! In-memory stand-in for the SpiffWorkflow backend, served under `/v1.0`.
//!
//! # Design
//! - One `Engine` behind an async `RwLock` holds groups, models, instances
//!   and tasks. Starting an instance creates a single ready task; completing
//!   it completes the instance.
//! - Every route except `/public/*` requires `Authorization: Bearer <token>`;
//!   failures use the engine's `{"message": ...}` error shape.
//! - `/forbidden` and `/broken` exist to exercise client error handling.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_TOKEN: &str = "test-token";
pub const API_PREFIX: &str = "/v1.0";
const IDENTIFIER_HEADER: &str = "SpiffWorkflow-Authentication-Identifier";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessGroup {
    pub id: String,
    pub display_name: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessModel {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub primary_file_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessInstance {
    pub id: i64,
    pub process_model_identifier: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub process_instance_id: i64,
    pub state: String,
    pub data: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub count: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: Pagination,
}

impl<T: Clone> Page<T> {
    /// Slice `items` into 1-based page `page` of `per_page` entries.
    fn of(items: &[T], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let results: Vec<T> = items
            .iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect();
        Page {
            pagination: Pagination {
                count: results.len(),
                total: items.len(),
                pages: items.len().div_ceil(per_page),
            },
            results,
        }
    }
}

pub struct Engine {
    groups: Vec<ProcessGroup>,
    models: Vec<ProcessModel>,
    instances: BTreeMap<i64, ProcessInstance>,
    tasks: BTreeMap<Uuid, Task>,
    next_instance_id: i64,
}

impl Engine {
    /// One `org` group holding two models.
    pub fn seeded() -> Self {
        let model = |id: &str, name: &str| ProcessModel {
            id: id.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            primary_file_name: Some(format!("{}.bpmn", id.rsplit('/').next().unwrap_or(id))),
        };
        Self {
            groups: vec![ProcessGroup {
                id: "org".to_string(),
                display_name: "Organisation".to_string(),
                description: String::new(),
            }],
            models: vec![model("org/model-a", "Model A"), model("org/model-b", "Model B")],
            instances: BTreeMap::new(),
            tasks: BTreeMap::new(),
            next_instance_id: 1,
        }
    }

    fn start(&mut self, model_id: &str) -> Option<ProcessInstance> {
        self.models.iter().find(|m| m.id == model_id)?;
        let instance = ProcessInstance {
            id: self.next_instance_id,
            process_model_identifier: model_id.to_string(),
            status: "user_input_required".to_string(),
        };
        self.next_instance_id += 1;
        let task_id = Uuid::new_v4();
        self.tasks.insert(
            task_id,
            Task {
                id: task_id.to_string(),
                name: "approve".to_string(),
                process_instance_id: instance.id,
                state: "READY".to_string(),
                data: json!({}),
            },
        );
        self.instances.insert(instance.id, instance.clone());
        Some(instance)
    }

    fn complete(&mut self, instance_id: i64, task_id: Uuid, form: Value) -> Option<Task> {
        let task = self.tasks.get_mut(&task_id)?;
        if task.process_instance_id != instance_id {
            return None;
        }
        task.state = "COMPLETED".to_string();
        task.data = form;
        let task = task.clone();

        let outstanding = self
            .tasks
            .values()
            .any(|t| t.process_instance_id == instance_id && t.state == "READY");
        if let Some(instance) = self.instances.get_mut(&instance_id) {
            if !outstanding {
                instance.status = "complete".to_string();
            }
        }
        Some(task)
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<RwLock<Engine>>,
    token: Arc<str>,
}

/// Error reply in the engine's shape.
struct Failure(StatusCode, String);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

fn not_found(what: &str) -> Failure {
    Failure(StatusCode::NOT_FOUND, format!("{what} not found"))
}

pub fn app() -> Router {
    app_with_token(DEFAULT_TOKEN)
}

pub fn app_with_token(token: &str) -> Router {
    let state = AppState {
        engine: Arc::new(RwLock::new(Engine::seeded())),
        token: Arc::from(token),
    };

    let protected = Router::new()
        .route("/process-groups", get(list_groups))
        .route("/process-groups/{*id}", get(get_group))
        .route("/process-models", get(list_models))
        .route("/process-models/{*path}", get(get_model).post(start_instance))
        .route("/process-instances", post(list_instances))
        .route("/process-instances/{id}", get(get_instance))
        .route("/process-instances/{id}/tasks/{task_id}", put(complete_task))
        .route("/tasks", get(list_tasks))
        .route("/whoami", get(whoami))
        .route("/forbidden", get(forbidden))
        .route("/broken", get(broken))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let public = Router::new().route("/public/health", get(health));

    Router::new()
        .nest(API_PREFIX, protected.merge(public))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        warn!(path = %request.uri().path(), "rejecting unauthenticated request");
        return Failure(StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            .into_response();
    }
    next.run(request).await
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn list_groups(State(state): State<AppState>) -> Json<Page<ProcessGroup>> {
    let engine = state.engine.read().await;
    Json(Page::of(&engine.groups, 1, engine.groups.len()))
}

async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessGroup>, Failure> {
    let id = id.trim_start_matches('/');
    let engine = state.engine.read().await;
    engine
        .groups
        .iter()
        .find(|g| g.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("process group"))
}

async fn list_models(State(state): State<AppState>) -> Json<Page<ProcessModel>> {
    let engine = state.engine.read().await;
    Json(Page::of(&engine.models, 1, engine.models.len()))
}

async fn get_model(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<ProcessModel>, Failure> {
    let id = path.trim_start_matches('/');
    let engine = state.engine.read().await;
    engine
        .models
        .iter()
        .find(|m| m.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("process model"))
}

/// `POST /process-models/{model id}/process-instances`
async fn start_instance(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<(StatusCode, Json<ProcessInstance>), Failure> {
    let model_id = path
        .trim_start_matches('/')
        .strip_suffix("/process-instances")
        .ok_or_else(|| not_found("route"))?;
    let instance = state
        .engine
        .write()
        .await
        .start(model_id)
        .ok_or_else(|| not_found("process model"))?;
    info!(id = instance.id, model = model_id, "started process instance");
    Ok((StatusCode::CREATED, Json(instance)))
}

#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn first_page() -> usize {
    1
}

fn default_per_page() -> usize {
    100
}

/// Filters arrive in `report_metadata`; `status` and
/// `process_model_identifier` are honoured, anything else is ignored.
async fn list_instances(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
    body: Bytes,
) -> Result<Json<Page<ProcessInstance>>, Failure> {
    let body: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Failure(StatusCode::BAD_REQUEST, format!("invalid body: {e}")))?
    };
    let filters = &body["report_metadata"];
    let wanted = |field: &str, actual: &str| {
        filters
            .get(field)
            .and_then(Value::as_str)
            .map_or(true, |expected| expected == actual)
    };

    let engine = state.engine.read().await;
    let matching: Vec<ProcessInstance> = engine
        .instances
        .values()
        .filter(|i| wanted("status", &i.status))
        .filter(|i| wanted("process_model_identifier", &i.process_model_identifier))
        .cloned()
        .collect();
    Ok(Json(Page::of(&matching, paging.page, paging.per_page)))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessInstance>, Failure> {
    let engine = state.engine.read().await;
    engine
        .instances
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("process instance"))
}

async fn complete_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(i64, Uuid)>,
    body: Bytes,
) -> Result<Json<Task>, Failure> {
    let form = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Failure(StatusCode::BAD_REQUEST, format!("invalid form data: {e}")))?
    };
    let task = state
        .engine
        .write()
        .await
        .complete(id, task_id, form)
        .ok_or_else(|| not_found("task"))?;
    info!(instance = id, task = %task_id, "completed task");
    Ok(Json(task))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Page<Task>> {
    let engine = state.engine.read().await;
    let tasks: Vec<Task> = engine.tasks.values().cloned().collect();
    Json(Page::of(&tasks, 1, tasks.len()))
}

/// Echoes the authentication identifier the client sent.
async fn whoami(headers: HeaderMap) -> Json<Value> {
    let identifier = headers
        .get(IDENTIFIER_HEADER)
        .and_then(|value| value.to_str().ok());
    Json(json!({ "authentication_identifier": identifier }))
}

async fn forbidden() -> Failure {
    Failure(
        StatusCode::FORBIDDEN,
        "You are not allowed to view this".to_string(),
    )
}

async fn broken() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body>Bad Gateway</body></html>",
    )
}
