use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{AccountStatus, BoundingBox, LayerId, LayerStatus, UserId, WorkspaceId},
    plan::PlanTier,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub plan: PlanTier,
    pub status: AccountStatus,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(with = "crate::time::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        with = "crate::time::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tigergraph_graphname: Option<String>,
    #[serde(with = "crate::time::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time::flexible")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub layer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWorkspaceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub type TagFilter = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub layer_type: String,
    pub tags: TagFilter,
    pub bbox: BoundingBox,
    pub resolution: u8,
    pub status: LayerStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub feature_count: u64,
    #[serde(
        default,
        with = "crate::time::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingestion_started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "crate::time::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingestion_completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(with = "crate::time::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time::flexible")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLayerRequest {
    pub name: String,
    pub layer_type: String,
    pub tags: TagFilter,
    pub bbox: BoundingBox,
    pub resolution: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLayerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}
