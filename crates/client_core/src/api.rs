use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{LayerId, WorkspaceId},
    protocol::{
        Account, CreateLayerRequest, CreateWorkspaceRequest, HealthStatus, Layer, LoginRequest,
        SignupRequest, TokenResponse, UpdateLayerRequest, UpdateWorkspaceRequest,
        Workspace,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ClientError, FormErrors},
    session::AccessToken,
};

pub type ApiResult<T> = Result<T, ClientError>;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed operations against the GeoQB HTTP API.
#[async_trait]
pub trait GeoApi: Send + Sync {
    async fn signup(&self, request: &SignupRequest) -> ApiResult<Account>;
    async fn login(&self, request: &LoginRequest) -> ApiResult<TokenResponse>;
    async fn current_user(&self, token: &AccessToken) -> ApiResult<Account>;
    async fn logout(&self, token: &AccessToken) -> ApiResult<()>;

    async fn list_workspaces(&self, token: &AccessToken) -> ApiResult<Vec<Workspace>>;
    async fn get_workspace(&self, token: &AccessToken, id: WorkspaceId) -> ApiResult<Workspace>;
    async fn create_workspace(
        &self,
        token: &AccessToken,
        request: &CreateWorkspaceRequest,
    ) -> ApiResult<Workspace>;
    async fn update_workspace(
        &self,
        token: &AccessToken,
        id: WorkspaceId,
        request: &UpdateWorkspaceRequest,
    ) -> ApiResult<Workspace>;
    async fn delete_workspace(&self, token: &AccessToken, id: WorkspaceId) -> ApiResult<()>;

    async fn list_layers(&self, token: &AccessToken, workspace_id: WorkspaceId)
        -> ApiResult<Vec<Layer>>;
    async fn get_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer>;
    async fn create_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        request: &CreateLayerRequest,
    ) -> ApiResult<Layer>;
    async fn update_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
        request: &UpdateLayerRequest,
    ) -> ApiResult<Layer>;
    async fn delete_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<()>;
    async fn reingest_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer>;
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API root including the version prefix, e.g. `https://api.geoqb.io/api/v1`.
    pub base_url: Url,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| {
            ClientError::Validation(FormErrors::general(format!(
                "invalid API url {base_url:?}: {err}"
            )))
        })?;
        Ok(Self {
            base_url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        if !matches!(config.base_url.scheme(), "http" | "https") || config.base_url.cannot_be_a_base()
        {
            return Err(ClientError::Validation(FormErrors::general(
                format!("API url must be an absolute http(s) url: {}", config.base_url),
            )));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ClientError::Network(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str], token: Option<&AccessToken>) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!(method = %method, url = %url, "api: request");
        let builder = self.http.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(status = status.as_u16(), url = %url, error = %err, "api: failed to read error body");
                String::new()
            }
        };
        let err = ClientError::from_response(status.as_u16(), &body);
        warn!(status = status.as_u16(), url = %url, error = %err, "api: request failed");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.send(builder).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> ApiResult<()> {
        self.send(builder).await?;
        Ok(())
    }

    /// Liveness probe served at the API origin, outside the versioned prefix.
    pub async fn health(&self) -> ApiResult<HealthStatus> {
        let mut url = self.base_url.clone();
        url.set_path("/health");
        url.set_query(None);
        self.send_json(self.http.get(url)).await
    }
}

#[async_trait]
impl GeoApi for ApiClient {
    async fn signup(&self, request: &SignupRequest) -> ApiResult<Account> {
        self.send_json(self.request(Method::POST, &["auth", "signup"], None).json(request))
            .await
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<TokenResponse> {
        self.send_json(self.request(Method::POST, &["auth", "login"], None).json(request))
            .await
    }

    async fn current_user(&self, token: &AccessToken) -> ApiResult<Account> {
        self.send_json(self.request(Method::GET, &["auth", "me"], Some(token)))
            .await
    }

    async fn logout(&self, token: &AccessToken) -> ApiResult<()> {
        self.send_empty(self.request(Method::POST, &["auth", "logout"], Some(token)))
            .await
    }

    async fn list_workspaces(&self, token: &AccessToken) -> ApiResult<Vec<Workspace>> {
        self.send_json(self.request(Method::GET, &["workspaces"], Some(token)))
            .await
    }

    async fn get_workspace(&self, token: &AccessToken, id: WorkspaceId) -> ApiResult<Workspace> {
        let id = id.to_string();
        self.send_json(self.request(Method::GET, &["workspaces", &id], Some(token)))
            .await
    }

    async fn create_workspace(
        &self,
        token: &AccessToken,
        request: &CreateWorkspaceRequest,
    ) -> ApiResult<Workspace> {
        self.send_json(
            self.request(Method::POST, &["workspaces"], Some(token))
                .json(request),
        )
        .await
    }

    async fn update_workspace(
        &self,
        token: &AccessToken,
        id: WorkspaceId,
        request: &UpdateWorkspaceRequest,
    ) -> ApiResult<Workspace> {
        let id = id.to_string();
        self.send_json(
            self.request(Method::PATCH, &["workspaces", &id], Some(token))
                .json(request),
        )
        .await
    }

    async fn delete_workspace(&self, token: &AccessToken, id: WorkspaceId) -> ApiResult<()> {
        let id = id.to_string();
        self.send_empty(self.request(Method::DELETE, &["workspaces", &id], Some(token)))
            .await
    }

    async fn list_layers(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
    ) -> ApiResult<Vec<Layer>> {
        let workspace_id = workspace_id.to_string();
        self.send_json(self.request(
            Method::GET,
            &["workspaces", &workspace_id, "layers"],
            Some(token),
        ))
        .await
    }

    async fn get_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer> {
        let (workspace_id, layer_id) = (workspace_id.to_string(), layer_id.to_string());
        self.send_json(self.request(
            Method::GET,
            &["workspaces", &workspace_id, "layers", &layer_id],
            Some(token),
        ))
        .await
    }

    async fn create_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        request: &CreateLayerRequest,
    ) -> ApiResult<Layer> {
        let workspace_id = workspace_id.to_string();
        self.send_json(
            self.request(
                Method::POST,
                &["workspaces", &workspace_id, "layers"],
                Some(token),
            )
            .json(request),
        )
        .await
    }

    async fn update_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
        request: &UpdateLayerRequest,
    ) -> ApiResult<Layer> {
        let (workspace_id, layer_id) = (workspace_id.to_string(), layer_id.to_string());
        self.send_json(
            self.request(
                Method::PATCH,
                &["workspaces", &workspace_id, "layers", &layer_id],
                Some(token),
            )
            .json(request),
        )
        .await
    }

    async fn delete_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<()> {
        let (workspace_id, layer_id) = (workspace_id.to_string(), layer_id.to_string());
        self.send_empty(self.request(
            Method::DELETE,
            &["workspaces", &workspace_id, "layers", &layer_id],
            Some(token),
        ))
        .await
    }

    async fn reingest_layer(
        &self,
        token: &AccessToken,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer> {
        let (workspace_id, layer_id) = (workspace_id.to_string(), layer_id.to_string());
        self.send_json(self.request(
            Method::POST,
            &["workspaces", &workspace_id, "layers", &layer_id, "reingest"],
            Some(token),
        ))
        .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
