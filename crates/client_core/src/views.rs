//! View models assembled from store reads. Front ends render these; they never
//! talk to the API client directly.

use chrono::{DateTime, Utc};
use shared::{
    domain::{LayerId, LayerStatus, WorkspaceId},
    plan::PlanTier,
    protocol::{Layer, Workspace},
};

use crate::{
    api::ApiResult,
    lifecycle::{self, LayerActions, StatusBadge, StatusCounts},
    session::Session,
    store::Store,
};

/// Workspaces shown on the overview before "view all".
pub const RECENT_WORKSPACES: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceRow {
    pub id: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub layer_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workspace> for WorkspaceRow {
    fn from(workspace: &Workspace) -> Self {
        Self {
            id: workspace.id,
            name: workspace.name.clone(),
            description: workspace.description.clone(),
            layer_count: workspace.layer_count,
            updated_at: workspace.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardOverview {
    pub full_name: String,
    pub plan: PlanTier,
    pub workspace_count: usize,
    pub total_layers: u32,
    pub layer_limit: u32,
    pub monthly_query_limit: u32,
    pub show_upgrade_prompt: bool,
    pub recent: Vec<WorkspaceRow>,
}

impl DashboardOverview {
    pub fn build(plan: PlanTier, full_name: &str, workspaces: &[Workspace]) -> Self {
        let capabilities = plan.capabilities();
        let total_layers = workspaces.iter().map(|workspace| workspace.layer_count).sum();
        Self {
            full_name: full_name.to_string(),
            plan,
            workspace_count: workspaces.len(),
            total_layers,
            layer_limit: capabilities.layer_limit,
            monthly_query_limit: capabilities.monthly_query_limit,
            show_upgrade_prompt: plan == PlanTier::Free,
            recent: workspaces
                .iter()
                .take(RECENT_WORKSPACES)
                .map(WorkspaceRow::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerRow {
    pub id: LayerId,
    pub name: String,
    pub layer_type: String,
    pub status: LayerStatus,
    pub badge: StatusBadge,
    pub actions: LayerActions,
    pub error_message: Option<String>,
    pub feature_count: u64,
    pub resolution_label: String,
    pub tags: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Layer> for LayerRow {
    fn from(layer: &Layer) -> Self {
        Self {
            id: layer.id,
            name: layer.name.clone(),
            layer_type: layer.layer_type.clone(),
            status: layer.status,
            badge: lifecycle::badge(layer.status),
            actions: lifecycle::actions(layer.status),
            error_message: lifecycle::failure_message(layer).map(str::to_string),
            feature_count: layer.feature_count,
            resolution_label: format!("H3-{}", layer.resolution),
            tags: layer
                .tags
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", "),
            created_at: layer.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceDetail {
    pub workspace: WorkspaceRow,
    pub counts: StatusCounts,
    pub total_features: u64,
    pub layers: Vec<LayerRow>,
}

impl WorkspaceDetail {
    pub fn build(workspace: &Workspace, layers: &[Layer]) -> Self {
        Self {
            workspace: WorkspaceRow::from(workspace),
            counts: StatusCounts::tally(layers),
            total_features: layers.iter().map(|layer| layer.feature_count).sum(),
            layers: layers.iter().map(LayerRow::from).collect(),
        }
    }
}

pub async fn load_overview(store: &Store, session: &Session) -> ApiResult<DashboardOverview> {
    let account = store.current_user(session).await?;
    let workspaces = store.workspaces(session).await?;
    Ok(DashboardOverview::build(
        account.plan,
        &account.full_name,
        &workspaces,
    ))
}

pub async fn load_workspace_rows(store: &Store, session: &Session) -> ApiResult<Vec<WorkspaceRow>> {
    Ok(store
        .workspaces(session)
        .await?
        .iter()
        .map(WorkspaceRow::from)
        .collect())
}

pub async fn load_workspace_detail(
    store: &Store,
    session: &Session,
    workspace_id: WorkspaceId,
) -> ApiResult<WorkspaceDetail> {
    let workspace = store.workspace(session, workspace_id).await?;
    let layers = store.layers(session, workspace_id).await?;
    Ok(WorkspaceDetail::build(&workspace, &layers))
}
