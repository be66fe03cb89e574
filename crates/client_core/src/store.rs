//! Coordinator between the API client and the query cache.
//!
//! Reads go through the cache; mutations go to the backend and, once they
//! succeed, invalidate the keys they affect. An `Unauthorized` answer from any
//! call drops every cached entry.

use std::{future::Future, sync::Arc, time::Duration};

use shared::{
    domain::{LayerId, LayerStatus, WorkspaceId},
    protocol::{Account, Layer, Workspace},
};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiResult, GeoApi},
    cache::{Cacheable, CacheSubscription, KeyScope, Mutation, QueryCache, QueryKey},
    error::{ClientError, FormErrors},
    forms::{self, LayerDraft, SignupDraft, WorkspaceDraft, WorkspaceEdit},
    session::{AccessToken, Session},
};

pub const REINGEST_IN_PROGRESS: &str = "layer ingestion is already in progress";

#[derive(Clone)]
pub struct Store {
    api: Arc<dyn GeoApi>,
    cache: Arc<QueryCache>,
}

impl Store {
    pub fn new(api: Arc<dyn GeoApi>, cache_ttl: Duration) -> Self {
        Self {
            api,
            cache: Arc::new(QueryCache::new(cache_ttl)),
        }
    }

    pub fn with_cache(api: Arc<dyn GeoApi>, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn subscribe(&self, keys: impl IntoIterator<Item = QueryKey>) -> CacheSubscription {
        self.cache.subscribe(keys)
    }

    pub fn subscribe_scopes(&self, scopes: impl IntoIterator<Item = KeyScope>) -> CacheSubscription {
        self.cache.subscribe_scopes(scopes)
    }

    /// Forces the next read of every key in `scope` to hit the backend.
    pub async fn refresh(&self, scope: KeyScope) -> usize {
        self.cache.invalidate(vec![scope], None).await
    }

    async fn guard<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(ClientError::Unauthorized) = &result {
            warn!("store: backend rejected credentials, dropping cached state");
            self.cache.invalidate(vec![KeyScope::All], None).await;
        }
        result
    }

    async fn read<T, F, Fut>(&self, key: QueryKey, fetch: F) -> ApiResult<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            debug!(?key, "store: cache hit");
            return Ok(hit);
        }
        let ticket = self.cache.begin_fetch(key).await;
        let value = self.guard(fetch().await).await?;
        self.cache
            .complete_fetch(ticket, value.clone().into_cached())
            .await;
        Ok(value)
    }

    async fn mutate<T, Fut>(&self, fut: Fut) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        self.guard(fut.await).await
    }

    pub async fn signup(&self, draft: &SignupDraft) -> ApiResult<Account> {
        let request = draft.validate()?;
        let account = self.api.signup(&request).await?;
        info!(user_id = %account.id, "auth: account created");
        Ok(account)
    }

    /// Exchanges credentials for a token and resolves the signed-in account.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        let request = forms::validate_login(email, password)?;
        let tokens = self.api.login(&request).await?;
        let token = AccessToken::new(tokens.access_token);
        let account = self.api.current_user(&token).await?;
        self.cache.invalidate(vec![KeyScope::All], None).await;
        self.seed_current_user(&account).await;
        let session = Session::new(token, account);
        info!(user_id = %session.account().id, plan = %session.plan(), "auth: signed in");
        Ok(session)
    }

    /// Rebuilds a session from a stored token. The account is re-read from the
    /// backend, so plan changes made since login are picked up.
    pub async fn restore(&self, token: AccessToken) -> ApiResult<Session> {
        let account = self.guard(self.api.current_user(&token).await).await?;
        self.seed_current_user(&account).await;
        debug!(user_id = %account.id, plan = %account.plan, "auth: session restored");
        Ok(Session::new(token, account))
    }

    async fn seed_current_user(&self, account: &Account) {
        let ticket = self.cache.begin_fetch(QueryKey::CurrentUser).await;
        self.cache
            .complete_fetch(ticket, account.clone().into_cached())
            .await;
    }

    /// Ends the session. Cached state is cleared even when the backend call fails.
    pub async fn logout(&self, session: Session) -> ApiResult<()> {
        self.cache.invalidate_for(Mutation::Logout).await;
        let result = self.api.logout(session.token()).await;
        match &result {
            Ok(()) => info!(user_id = %session.account().id, "auth: signed out"),
            Err(err) => warn!(error = %err, "auth: backend logout failed, local session discarded"),
        }
        result
    }

    pub async fn current_user(&self, session: &Session) -> ApiResult<Account> {
        self.read(QueryKey::CurrentUser, || {
            self.api.current_user(session.token())
        })
        .await
    }

    pub async fn workspaces(&self, session: &Session) -> ApiResult<Vec<Workspace>> {
        self.read(QueryKey::Workspaces, || {
            self.api.list_workspaces(session.token())
        })
        .await
    }

    pub async fn workspace(&self, session: &Session, id: WorkspaceId) -> ApiResult<Workspace> {
        self.read(QueryKey::Workspace(id), || {
            self.api.get_workspace(session.token(), id)
        })
        .await
    }

    pub async fn layers(&self, session: &Session, workspace_id: WorkspaceId) -> ApiResult<Vec<Layer>> {
        self.read(QueryKey::Layers(workspace_id), || {
            self.api.list_layers(session.token(), workspace_id)
        })
        .await
    }

    pub async fn layer(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer> {
        self.read(QueryKey::Layer(workspace_id, layer_id), || {
            self.api.get_layer(session.token(), workspace_id, layer_id)
        })
        .await
    }

    pub async fn create_workspace(
        &self,
        session: &Session,
        draft: &WorkspaceDraft,
    ) -> ApiResult<Workspace> {
        let request = draft.validate()?;
        let workspace = self
            .mutate(self.api.create_workspace(session.token(), &request))
            .await?;
        self.cache.invalidate_for(Mutation::CreateWorkspace).await;
        info!(workspace_id = %workspace.id, name = %workspace.name, "workspace: created");
        Ok(workspace)
    }

    pub async fn update_workspace(
        &self,
        session: &Session,
        id: WorkspaceId,
        edit: &WorkspaceEdit,
    ) -> ApiResult<Workspace> {
        let request = edit.validate()?;
        let workspace = self
            .mutate(self.api.update_workspace(session.token(), id, &request))
            .await?;
        self.cache.invalidate_for(Mutation::UpdateWorkspace(id)).await;
        info!(workspace_id = %id, "workspace: updated");
        Ok(workspace)
    }

    pub async fn delete_workspace(&self, session: &Session, id: WorkspaceId) -> ApiResult<()> {
        self.mutate(self.api.delete_workspace(session.token(), id))
            .await?;
        self.cache.invalidate_for(Mutation::DeleteWorkspace(id)).await;
        info!(workspace_id = %id, "workspace: deleted");
        Ok(())
    }

    /// Validates and submits a new layer. Invalid drafts never reach the
    /// backend; the plan quota is only checked advisorily and the backend
    /// answers `Forbidden` when it is really exhausted.
    pub async fn create_layer(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        draft: &LayerDraft,
    ) -> ApiResult<Layer> {
        let request = draft.validate()?;
        self.warn_on_layer_quota(session).await?;
        let layer = self
            .mutate(self.api.create_layer(session.token(), workspace_id, &request))
            .await?;
        self.cache
            .invalidate_for(Mutation::CreateLayer(workspace_id))
            .await;
        info!(
            workspace_id = %workspace_id,
            layer_id = %layer.id,
            status = %layer.status,
            "layer: created"
        );
        Ok(layer)
    }

    /// Logs when the account looks to be at its layer limit. The plan comes
    /// from the current account, not the login-time snapshot in the session.
    async fn warn_on_layer_quota(&self, session: &Session) -> ApiResult<()> {
        let plan = self.current_user(session).await?.plan;
        let total: u32 = self
            .workspaces(session)
            .await?
            .iter()
            .map(|workspace| workspace.layer_count)
            .sum();
        if !plan.can_create_layer(total) {
            let limit = plan.capabilities().layer_limit;
            warn!(%plan, total, limit, "layer: plan limit looks reached, submitting anyway");
        }
        Ok(())
    }

    pub async fn rename_layer(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
        name: &str,
    ) -> ApiResult<Layer> {
        let request = forms::validate_layer_rename(name)?;
        let layer = self
            .mutate(
                self.api
                    .update_layer(session.token(), workspace_id, layer_id, &request),
            )
            .await?;
        self.cache
            .invalidate_for(Mutation::UpdateLayer(workspace_id, layer_id))
            .await;
        info!(workspace_id = %workspace_id, layer_id = %layer_id, "layer: renamed");
        Ok(layer)
    }

    pub async fn delete_layer(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<()> {
        self.mutate(self.api.delete_layer(session.token(), workspace_id, layer_id))
            .await?;
        self.cache
            .invalidate_for(Mutation::DeleteLayer(workspace_id, layer_id))
            .await;
        info!(workspace_id = %workspace_id, layer_id = %layer_id, "layer: deleted");
        Ok(())
    }

    /// Re-runs ingestion. Refused without a backend call while the last known
    /// status is `processing`.
    pub async fn reingest_layer(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<Layer> {
        let status = self.known_status(session, workspace_id, layer_id).await?;
        if status == LayerStatus::Processing {
            debug!(layer_id = %layer_id, "layer: reingest refused while processing");
            return Err(ClientError::Validation(FormErrors::general(REINGEST_IN_PROGRESS)));
        }
        let layer = self
            .mutate(self.api.reingest_layer(session.token(), workspace_id, layer_id))
            .await?;
        self.cache
            .invalidate_for(Mutation::ReingestLayer(workspace_id, layer_id))
            .await;
        info!(
            workspace_id = %workspace_id,
            layer_id = %layer_id,
            previous = %status,
            "layer: reingest requested"
        );
        Ok(layer)
    }

    async fn known_status(
        &self,
        session: &Session,
        workspace_id: WorkspaceId,
        layer_id: LayerId,
    ) -> ApiResult<LayerStatus> {
        if let Some(layers) = self
            .cache
            .get::<Vec<Layer>>(&QueryKey::Layers(workspace_id))
            .await
        {
            if let Some(layer) = layers.iter().find(|layer| layer.id == layer_id) {
                return Ok(layer.status);
            }
        }
        Ok(self.layer(session, workspace_id, layer_id).await?.status)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
