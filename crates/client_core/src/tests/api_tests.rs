use std::sync::Arc;

use super::*;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{domain::LayerStatus, error::ErrorCode};
use tokio::{net::TcpListener, sync::Mutex};

const TOKEN: &str = "token-abc";

#[derive(Clone, Default)]
struct ServerState {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

#[derive(Debug, Clone)]
struct SeenRequest {
    path: String,
    authorization: Option<String>,
    body: Option<Value>,
}

impl ServerState {
    async fn record(&self, path: String, headers: &HeaderMap, body: Option<Value>) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.seen.lock().await.push(SeenRequest {
            path,
            authorization,
            body,
        });
    }
}

fn account_json() -> Value {
    json!({
        "id": "5a1e0f7c-2222-4a52-9d0e-0c3f4d9b8e11",
        "email": "ada@example.com",
        "full_name": "Ada Lovelace",
        "plan": "professional",
        "status": "active",
        "is_verified": true,
        "created_at": "2024-12-01T08:30:00",
        "last_login": null
    })
}

fn layer_json(workspace_id: &str, layer_id: &str, status: &str) -> Value {
    json!({
        "id": layer_id,
        "workspace_id": workspace_id,
        "name": "Hospitals",
        "layer_type": "amenity",
        "tags": {"amenity": "hospital"},
        "bbox": [52.4, 13.2, 52.6, 13.5],
        "resolution": 9,
        "status": status,
        "error_message": null,
        "feature_count": 0,
        "created_at": "2024-12-01T08:30:00",
        "updated_at": "2024-12-01T08:30:00"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {TOKEN}").as_str())
}

async fn handle_login(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state
        .record("/api/v1/auth/login".into(), &headers, Some(body.clone()))
        .await;
    if body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({"access_token": TOKEN, "token_type": "bearer"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect email or password"})),
        )
    }
}

async fn handle_me(State(state): State<ServerState>, headers: HeaderMap) -> impl IntoResponse {
    state.record("/api/v1/auth/me".into(), &headers, None).await;
    if authorized(&headers) {
        (StatusCode::OK, Json(account_json()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        )
    }
}

async fn handle_create_layer(
    State(state): State<ServerState>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state
        .record(
            format!("/api/v1/workspaces/{workspace_id}/layers"),
            &headers,
            Some(body.clone()),
        )
        .await;
    if body["resolution"].as_u64() == Some(15) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "Layer limit reached (50/50). Upgrade your plan to create more layers."})),
        );
    }
    (
        StatusCode::CREATED,
        Json(layer_json(
            &workspace_id,
            "7f1d2c3b-1111-4a52-9d0e-0c3f4d9b8e11",
            "pending",
        )),
    )
}

async fn handle_reingest(
    State(state): State<ServerState>,
    Path((workspace_id, layer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state
        .record(
            format!("/api/v1/workspaces/{workspace_id}/layers/{layer_id}/reingest"),
            &headers,
            None,
        )
        .await;
    Json(layer_json(&workspace_id, &layer_id, "pending"))
}

async fn handle_delete_workspace(
    State(state): State<ServerState>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state
        .record(format!("/api/v1/workspaces/{workspace_id}"), &headers, None)
        .await;
    StatusCode::NO_CONTENT
}

async fn handle_missing_workspace() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Workspace not found"})),
    )
}

async fn handle_invalid_layers() -> impl IntoResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"detail": [
            {"loc": ["body", "bbox"], "msg": "min_lat must be less than max_lat", "type": "value_error"}
        ]})),
    )
}

async fn handle_broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn handle_garbage() -> impl IntoResponse {
    (StatusCode::OK, "not json")
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "healthy", "app": "GeoQB", "version": "1.0.0", "environment": "test"}))
}

async fn spawn_api_server() -> (ApiClient, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/auth/login", post(handle_login))
        .route("/api/v1/auth/me", get(handle_me))
        .route(
            "/api/v1/workspaces/:workspace_id",
            axum::routing::delete(handle_delete_workspace).get(handle_missing_workspace),
        )
        .route(
            "/api/v1/workspaces/:workspace_id/layers",
            post(handle_create_layer).get(handle_invalid_layers),
        )
        .route(
            "/api/v1/workspaces/:workspace_id/layers/:layer_id/reingest",
            post(handle_reingest),
        )
        .route("/api/v1/broken", get(handle_broken))
        .route("/api/v1/workspaces", get(handle_garbage))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let config = ApiConfig::new(&format!("http://{addr}/api/v1")).expect("config");
    (ApiClient::new(config).expect("client"), state)
}

fn token() -> AccessToken {
    AccessToken::new(TOKEN)
}

fn hospitals_request() -> CreateLayerRequest {
    CreateLayerRequest {
        name: "Hospitals".into(),
        layer_type: "amenity".into(),
        tags: [("amenity".to_string(), "hospital".to_string())].into(),
        bbox: shared::domain::BoundingBox::new(52.4, 13.2, 52.6, 13.5),
        resolution: 9,
    }
}

#[test]
fn rejects_non_http_base_urls() {
    let config = ApiConfig::new("ftp://example.com/api").expect("parses");
    assert!(matches!(
        ApiClient::new(config),
        Err(ClientError::Validation(_))
    ));
    assert!(ApiConfig::new("not a url").is_err());
}

#[test]
fn endpoint_appends_segments_to_versioned_prefix() {
    let client = ApiClient::new(ApiConfig::new("https://api.geoqb.io/api/v1/").expect("config"))
        .expect("client");
    let url = client.endpoint(&["workspaces", "abc", "layers"]);
    assert_eq!(url.as_str(), "https://api.geoqb.io/api/v1/workspaces/abc/layers");
}

#[tokio::test]
async fn login_and_current_user_carry_bearer_token() {
    let (client, state) = spawn_api_server().await;

    let tokens = client
        .login(&LoginRequest {
            email: "ada@example.com".into(),
            password: "secret".into(),
        })
        .await
        .expect("login");
    assert_eq!(tokens.access_token, TOKEN);
    assert_eq!(tokens.token_type, "bearer");

    let account = client
        .current_user(&AccessToken::new(tokens.access_token))
        .await
        .expect("me");
    assert_eq!(account.full_name, "Ada Lovelace");
    assert_eq!(account.plan, shared::plan::PlanTier::Professional);

    let seen = state.seen.lock().await.clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].authorization, None);
    assert_eq!(seen[1].authorization.as_deref(), Some("Bearer token-abc"));
}

#[tokio::test]
async fn bad_credentials_and_missing_token_map_to_unauthorized() {
    let (client, _state) = spawn_api_server().await;

    let err = client
        .login(&LoginRequest {
            email: "ada@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .expect_err("login must fail");
    assert!(err.requires_reauth());

    let err = client
        .current_user(&AccessToken::new("expired"))
        .await
        .expect_err("me must fail");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[tokio::test]
async fn create_layer_posts_wire_shape() {
    let (client, state) = spawn_api_server().await;
    let workspace_id = WorkspaceId::new();

    let layer = client
        .create_layer(&token(), workspace_id, &hospitals_request())
        .await
        .expect("create layer");
    assert_eq!(layer.workspace_id, workspace_id);
    assert_eq!(layer.status, LayerStatus::Pending);

    let seen = state.seen.lock().await.clone();
    let request = seen.last().expect("request recorded");
    assert_eq!(request.path, format!("/api/v1/workspaces/{workspace_id}/layers"));
    assert_eq!(
        request.body,
        Some(json!({
            "name": "Hospitals",
            "layer_type": "amenity",
            "tags": {"amenity": "hospital"},
            "bbox": [52.4, 13.2, 52.6, 13.5],
            "resolution": 9
        }))
    );
}

#[tokio::test]
async fn quota_rejection_maps_to_forbidden() {
    let (client, _state) = spawn_api_server().await;
    let request = CreateLayerRequest {
        resolution: 15,
        ..hospitals_request()
    };

    let err = client
        .create_layer(&token(), WorkspaceId::new(), &request)
        .await
        .expect_err("quota");
    match err {
        ClientError::Forbidden(message) => assert!(message.starts_with("Layer limit reached")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn reingest_and_delete_hit_nested_paths() {
    let (client, state) = spawn_api_server().await;
    let workspace_id = WorkspaceId::new();
    let layer_id = LayerId::new();

    let layer = client
        .reingest_layer(&token(), workspace_id, layer_id)
        .await
        .expect("reingest");
    assert_eq!(layer.id, layer_id);
    client
        .delete_workspace(&token(), workspace_id)
        .await
        .expect("delete");

    let paths: Vec<String> = state
        .seen
        .lock()
        .await
        .iter()
        .map(|request| request.path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            format!("/api/v1/workspaces/{workspace_id}/layers/{layer_id}/reingest"),
            format!("/api/v1/workspaces/{workspace_id}"),
        ]
    );
}

#[tokio::test]
async fn error_statuses_map_to_error_kinds() {
    let (client, _state) = spawn_api_server().await;
    let workspace_id = WorkspaceId::new();

    let err = client
        .get_workspace(&token(), workspace_id)
        .await
        .expect_err("missing");
    assert!(matches!(&err, ClientError::NotFound(message) if message == "Workspace not found"));

    let err = client
        .list_layers(&token(), workspace_id)
        .await
        .expect_err("invalid");
    let ClientError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert!(errors.has_field("bbox"));

    let err = client
        .send_empty(client.request(Method::GET, &["broken"], None))
        .await
        .expect_err("broken");
    assert!(matches!(err, ClientError::Server { status: Some(500), .. }));

    let err = client
        .list_workspaces(&token())
        .await
        .expect_err("undecodable");
    assert_eq!(err.code(), ErrorCode::Server);
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = ApiClient::new(
        ApiConfig::new(&format!("http://{addr}/api/v1"))
            .expect("config")
            .with_timeout(Duration::from_secs(2)),
    )
    .expect("client");
    let err = client.list_workspaces(&token()).await.expect_err("offline");
    assert_eq!(err.code(), ErrorCode::Network);
}

#[tokio::test]
async fn health_is_served_outside_versioned_prefix() {
    let (client, _state) = spawn_api_server().await;
    let health = client.health().await.expect("health");
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn truncated_error_body_still_maps_status() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 503 Service Unavailable\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"detail\":",
            )
            .await;
        let _ = socket.shutdown().await;
    });

    let client = ApiClient::new(
        ApiConfig::new(&format!("http://{addr}/api/v1"))
            .expect("config")
            .with_timeout(Duration::from_secs(2)),
    )
    .expect("client");
    let err = client.list_workspaces(&token()).await.expect_err("503");
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, Some(503));
            assert_eq!(message, "HTTP 503");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
