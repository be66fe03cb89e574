//! Display affordances and allowed actions derived from a layer's status, plus
//! a watcher that keeps re-fetching a workspace's layers while any of them is
//! still being ingested.

use std::{fmt, time::Duration};

use shared::{
    domain::{LayerStatus, WorkspaceId},
    protocol::Layer,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{api::ApiResult, cache::KeyScope, session::Session, store::Store};

pub const FAILED_FALLBACK_MESSAGE: &str = "Ingestion failed without an error message";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Clock,
    Spinner,
    Check,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Neutral,
    Info,
    Success,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBadge {
    pub icon: StatusIcon,
    pub tone: StatusTone,
    pub label: &'static str,
}

impl fmt::Display for StatusBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = match self.icon {
            StatusIcon::Clock => "…",
            StatusIcon::Spinner => "↻",
            StatusIcon::Check => "✓",
            StatusIcon::Alert => "!",
        };
        write!(f, "{glyph} {}", self.label)
    }
}

pub fn badge(status: LayerStatus) -> StatusBadge {
    let (icon, tone) = match status {
        LayerStatus::Pending => (StatusIcon::Clock, StatusTone::Neutral),
        LayerStatus::Processing => (StatusIcon::Spinner, StatusTone::Info),
        LayerStatus::Completed => (StatusIcon::Check, StatusTone::Success),
        LayerStatus::Failed => (StatusIcon::Alert, StatusTone::Danger),
    };
    StatusBadge {
        icon,
        tone,
        label: status.as_str(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerActions {
    pub can_reingest: bool,
    pub can_delete: bool,
}

pub fn actions(status: LayerStatus) -> LayerActions {
    LayerActions {
        can_reingest: status != LayerStatus::Processing,
        can_delete: true,
    }
}

/// Message to show for a layer, `Some` for every failed layer.
pub fn failure_message(layer: &Layer) -> Option<&str> {
    if layer.status != LayerStatus::Failed {
        return None;
    }
    Some(
        layer
            .error_message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(FAILED_FALLBACK_MESSAGE),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally<'a>(layers: impl IntoIterator<Item = &'a Layer>) -> Self {
        let mut counts = Self::default();
        for layer in layers {
            match layer.status {
                LayerStatus::Pending => counts.pending += 1,
                LayerStatus::Processing => counts.processing += 1,
                LayerStatus::Completed => counts.completed += 1,
                LayerStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn transient(&self) -> usize {
        self.pending + self.processing
    }
}

pub fn has_transient(layers: &[Layer]) -> bool {
    layers.iter().any(|layer| !layer.status.is_terminal())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    /// `None` polls until every layer settles.
    pub max_polls: Option<u32>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// Every layer reached `completed` or `failed`.
    Settled(Vec<Layer>),
    /// The poll budget ran out while some layer was still transient.
    GaveUp(Vec<Layer>),
}

impl WatchOutcome {
    pub fn layers(&self) -> &[Layer] {
        match self {
            WatchOutcome::Settled(layers) | WatchOutcome::GaveUp(layers) => layers,
        }
    }
}

pub struct LayerWatcher<'a> {
    store: &'a Store,
    session: &'a Session,
    workspace_id: WorkspaceId,
    options: WatchOptions,
}

impl<'a> LayerWatcher<'a> {
    pub fn new(store: &'a Store, session: &'a Session, workspace_id: WorkspaceId) -> Self {
        Self {
            store,
            session,
            workspace_id,
            options: WatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Polls the layer list, reporting every fetched list to `on_update`, until
    /// no layer is transient or the poll budget is spent. Fetch errors end the
    /// watch and are returned.
    pub async fn run<F>(&self, mut on_update: F) -> ApiResult<WatchOutcome>
    where
        F: FnMut(&[Layer]),
    {
        let mut layers = self.store.layers(self.session, self.workspace_id).await?;
        on_update(&layers);

        let mut ticker = interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut polls = 0u32;
        while has_transient(&layers) {
            if self.options.max_polls.is_some_and(|max| polls >= max) {
                info!(
                    workspace_id = %self.workspace_id,
                    polls,
                    transient = StatusCounts::tally(&layers).transient(),
                    "watch: giving up with layers still ingesting"
                );
                return Ok(WatchOutcome::GaveUp(layers));
            }
            ticker.tick().await;
            polls += 1;
            self.store.refresh(KeyScope::LayersOf(self.workspace_id)).await;
            layers = self.store.layers(self.session, self.workspace_id).await?;
            debug!(
                workspace_id = %self.workspace_id,
                polls,
                transient = StatusCounts::tally(&layers).transient(),
                "watch: layers refreshed"
            );
            on_update(&layers);
        }
        Ok(WatchOutcome::Settled(layers))
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
