use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use client_core::{
    forms::{LayerDraft, WorkspaceDraft},
    lifecycle::{LayerWatcher, WatchOptions, WatchOutcome},
    store::REINGEST_IN_PROGRESS,
    views, ApiClient, ApiConfig, ClientError, Store,
};
use serde_json::{json, Value};
use shared::{
    domain::{AccountStatus, LayerId, LayerStatus, UserId, WorkspaceId},
    plan::PlanTier,
    protocol::{Account, CreateLayerRequest, CreateWorkspaceRequest, Layer, LoginRequest, Workspace},
};
use tokio::{net::TcpListener, sync::Mutex};

const TOKEN: &str = "acceptance-token";

type ApiError = (StatusCode, Json<Value>);

#[derive(Default)]
struct Backend {
    workspaces: Vec<Workspace>,
    layers: HashMap<WorkspaceId, Vec<Layer>>,
    /// Per-layer statuses handed out on successive list calls.
    progressions: HashMap<LayerId, Vec<LayerStatus>>,
    create_layer_requests: usize,
    list_layer_requests: usize,
}

#[derive(Clone)]
struct AppState {
    account: Account,
    backend: Arc<Mutex<Backend>>,
}

fn error(status: StatusCode, detail: &str) -> ApiError {
    (status, Json(json!({ "detail": detail })))
}

fn authorize(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = format!("Bearer {TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(error(StatusCode::UNAUTHORIZED, "Could not validate credentials")),
    }
}

fn with_count(backend: &Backend, workspace: &Workspace) -> Workspace {
    let mut workspace = workspace.clone();
    workspace.layer_count = backend
        .layers
        .get(&workspace.id)
        .map(|layers| layers.len() as u32)
        .unwrap_or(0);
    workspace
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    if body.email != state.account.email || body.password != "correct horse" {
        return Err(error(StatusCode::UNAUTHORIZED, "Incorrect email or password"));
    }
    Ok(Json(json!({ "access_token": TOKEN, "token_type": "bearer" })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Account>, ApiError> {
    authorize(&headers)?;
    Ok(Json(state.account.clone()))
}

async fn logout(headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&headers)?;
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

async fn list_workspaces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Workspace>>, ApiError> {
    authorize(&headers)?;
    let backend = state.backend.lock().await;
    Ok(Json(
        backend
            .workspaces
            .iter()
            .map(|workspace| with_count(&backend, workspace))
            .collect(),
    ))
}

async fn create_workspace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), ApiError> {
    authorize(&headers)?;
    let now = Utc::now();
    let workspace = Workspace {
        id: WorkspaceId::new(),
        user_id: state.account.id,
        name: body.name,
        description: body.description,
        tigergraph_graphname: None,
        created_at: now,
        updated_at: now,
        layer_count: 0,
    };
    state.backend.lock().await.workspaces.push(workspace.clone());
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<WorkspaceId>,
    headers: HeaderMap,
) -> Result<Json<Workspace>, ApiError> {
    authorize(&headers)?;
    let backend = state.backend.lock().await;
    backend
        .workspaces
        .iter()
        .find(|workspace| workspace.id == id)
        .map(|workspace| Json(with_count(&backend, workspace)))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Workspace not found"))
}

async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<WorkspaceId>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize(&headers)?;
    let mut backend = state.backend.lock().await;
    let before = backend.workspaces.len();
    backend.workspaces.retain(|workspace| workspace.id != id);
    if backend.workspaces.len() == before {
        return Err(error(StatusCode::NOT_FOUND, "Workspace not found"));
    }
    backend.layers.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_layers(
    State(state): State<AppState>,
    Path(id): Path<WorkspaceId>,
    headers: HeaderMap,
) -> Result<Json<Vec<Layer>>, ApiError> {
    authorize(&headers)?;
    let mut guard = state.backend.lock().await;
    let backend = &mut *guard;
    backend.list_layer_requests += 1;
    let layers = backend.layers.entry(id).or_default();
    for layer in layers.iter_mut() {
        if let Some(steps) = backend.progressions.get_mut(&layer.id) {
            if !steps.is_empty() {
                layer.status = steps.remove(0);
            }
        }
    }
    Ok(Json(layers.clone()))
}

async fn create_layer(
    State(state): State<AppState>,
    Path(id): Path<WorkspaceId>,
    headers: HeaderMap,
    Json(body): Json<CreateLayerRequest>,
) -> Result<(StatusCode, Json<Layer>), ApiError> {
    authorize(&headers)?;
    let mut backend = state.backend.lock().await;
    backend.create_layer_requests += 1;
    if !backend.workspaces.iter().any(|workspace| workspace.id == id) {
        return Err(error(StatusCode::NOT_FOUND, "Workspace not found"));
    }
    let now = Utc::now();
    let layer = Layer {
        id: LayerId::new(),
        workspace_id: id,
        name: body.name,
        layer_type: body.layer_type,
        tags: body.tags,
        bbox: body.bbox,
        resolution: body.resolution,
        status: LayerStatus::Pending,
        error_message: None,
        feature_count: 0,
        ingestion_started_at: None,
        ingestion_completed_at: None,
        metadata: None,
        created_at: now,
        updated_at: now,
    };
    backend.layers.entry(id).or_default().push(layer.clone());
    Ok((StatusCode::CREATED, Json(layer)))
}

async fn get_layer(
    State(state): State<AppState>,
    Path((id, layer_id)): Path<(WorkspaceId, LayerId)>,
    headers: HeaderMap,
) -> Result<Json<Layer>, ApiError> {
    authorize(&headers)?;
    let backend = state.backend.lock().await;
    backend
        .layers
        .get(&id)
        .and_then(|layers| layers.iter().find(|layer| layer.id == layer_id))
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Layer not found"))
}

async fn delete_layer(
    State(state): State<AppState>,
    Path((id, layer_id)): Path<(WorkspaceId, LayerId)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize(&headers)?;
    let mut backend = state.backend.lock().await;
    let layers = backend.layers.entry(id).or_default();
    let before = layers.len();
    layers.retain(|layer| layer.id != layer_id);
    if layers.len() == before {
        return Err(error(StatusCode::NOT_FOUND, "Layer not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn reingest_layer(
    State(state): State<AppState>,
    Path((id, layer_id)): Path<(WorkspaceId, LayerId)>,
    headers: HeaderMap,
) -> Result<Json<Layer>, ApiError> {
    authorize(&headers)?;
    let mut backend = state.backend.lock().await;
    let layer = backend
        .layers
        .get_mut(&id)
        .and_then(|layers| layers.iter_mut().find(|layer| layer.id == layer_id))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Layer not found"))?;
    layer.status = LayerStatus::Pending;
    layer.error_message = None;
    Ok(Json(layer.clone()))
}

async fn spawn_backend() -> (Store, Arc<Mutex<Backend>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = AppState {
        account: Account {
            id: UserId::new(),
            email: "ada@example.com".into(),
            full_name: "Ada Lovelace".into(),
            plan: PlanTier::Professional,
            status: AccountStatus::Active,
            is_verified: true,
            created_at: Utc::now(),
            last_login: None,
        },
        backend: Arc::new(Mutex::new(Backend::default())),
    };
    let backend = state.backend.clone();
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/api/v1/workspaces/:id",
            get(get_workspace).delete(delete_workspace),
        )
        .route(
            "/api/v1/workspaces/:id/layers",
            get(list_layers).post(create_layer),
        )
        .route(
            "/api/v1/workspaces/:id/layers/:layer_id",
            get(get_layer).delete(delete_layer),
        )
        .route(
            "/api/v1/workspaces/:id/layers/:layer_id/reingest",
            post(reingest_layer),
        )
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = ApiConfig::new(&format!("http://{addr}/api/v1"))
        .expect("config")
        .with_timeout(Duration::from_secs(5));
    let api = Arc::new(ApiClient::new(config).expect("client"));
    (Store::new(api, Duration::from_secs(60)), backend)
}

fn hospitals() -> LayerDraft {
    LayerDraft {
        name: "Hospitals".into(),
        layer_type: "amenity".into(),
        tags: [("amenity".to_string(), "hospital".to_string())].into(),
        bbox: [52.4, 13.2, 52.6, 13.5],
        resolution: 9,
    }
}

#[tokio::test]
async fn berlin_hospitals_round_trip_over_http() {
    let (store, backend) = spawn_backend().await;
    let session = store
        .login("ada@example.com", "correct horse")
        .await
        .expect("login");

    let berlin = store
        .create_workspace(&session, &WorkspaceDraft::new("Berlin"))
        .await
        .expect("create workspace");
    let overview = views::load_overview(&store, &session).await.expect("overview");
    assert_eq!(overview.workspace_count, 1);
    assert_eq!(overview.recent[0].layer_count, 0);

    let rejected = store
        .create_layer(
            &session,
            berlin.id,
            &LayerDraft {
                resolution: 5,
                ..hospitals()
            },
        )
        .await
        .expect_err("resolution 5 is rejected");
    assert!(matches!(rejected, ClientError::Validation(_)));
    assert_eq!(backend.lock().await.create_layer_requests, 0);

    let layer = store
        .create_layer(&session, berlin.id, &hospitals())
        .await
        .expect("create layer");
    assert_eq!(backend.lock().await.create_layer_requests, 1);

    let overview = views::load_overview(&store, &session).await.expect("overview");
    assert_eq!(overview.total_layers, 1);
    let detail = views::load_workspace_detail(&store, &session, berlin.id)
        .await
        .expect("detail");
    assert_eq!(detail.workspace.layer_count, 1);
    assert_eq!(detail.layers.len(), 1);
    assert!(matches!(
        detail.layers[0].status,
        LayerStatus::Pending | LayerStatus::Processing
    ));

    store
        .delete_layer(&session, berlin.id, layer.id)
        .await
        .expect("delete layer");
    let detail = views::load_workspace_detail(&store, &session, berlin.id)
        .await
        .expect("detail");
    assert_eq!(detail.workspace.layer_count, 0);
    assert!(detail.layers.is_empty());
    let overview = views::load_overview(&store, &session).await.expect("overview");
    assert_eq!(overview.total_layers, 0);

    store.logout(session).await.expect("logout");
    assert!(store.cache().is_empty().await);
}

#[tokio::test]
async fn watcher_follows_ingestion_and_guards_reingest() {
    let (store, backend) = spawn_backend().await;
    let session = store
        .login("ada@example.com", "correct horse")
        .await
        .expect("login");
    let berlin = store
        .create_workspace(&session, &WorkspaceDraft::new("Berlin"))
        .await
        .expect("create workspace");
    let layer = store
        .create_layer(&session, berlin.id, &hospitals())
        .await
        .expect("create layer");
    backend.lock().await.progressions.insert(
        layer.id,
        vec![
            LayerStatus::Processing,
            LayerStatus::Processing,
            LayerStatus::Failed,
        ],
    );

    let layers = store.layers(&session, berlin.id).await.expect("layers");
    assert_eq!(layers[0].status, LayerStatus::Processing);
    let err = store
        .reingest_layer(&session, berlin.id, layer.id)
        .await
        .expect_err("processing layer");
    assert!(err.to_string().contains(REINGEST_IN_PROGRESS));

    let mut updates = 0;
    let outcome = LayerWatcher::new(&store, &session, berlin.id)
        .with_options(WatchOptions {
            interval: Duration::from_millis(10),
            max_polls: Some(10),
        })
        .run(|_| updates += 1)
        .await
        .expect("watch");
    let WatchOutcome::Settled(layers) = outcome else {
        panic!("layers should settle");
    };
    assert_eq!(layers[0].status, LayerStatus::Failed);
    assert_eq!(updates, 3);
    assert_eq!(backend.lock().await.list_layer_requests, 3);

    let reingested = store
        .reingest_layer(&session, berlin.id, layer.id)
        .await
        .expect("failed layer can be reingested");
    assert_eq!(reingested.status, LayerStatus::Pending);
}

#[tokio::test]
async fn deleted_workspace_is_not_found_afterwards() {
    let (store, _backend) = spawn_backend().await;
    let session = store
        .login("ada@example.com", "correct horse")
        .await
        .expect("login");
    let berlin = store
        .create_workspace(&session, &WorkspaceDraft::new("Berlin"))
        .await
        .expect("create workspace");
    store.workspace(&session, berlin.id).await.expect("cached");

    store
        .delete_workspace(&session, berlin.id)
        .await
        .expect("delete");
    let err = store
        .workspace(&session, berlin.id)
        .await
        .expect_err("gone");
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (store, _backend) = spawn_backend().await;
    let err = store
        .login("ada@example.com", "nope")
        .await
        .expect_err("bad password");
    assert!(err.requires_reauth());
}
