//! Plain-text rendering of view models.

use std::fmt::Write as _;

use client_core::{
    lifecycle::{self, StatusCounts},
    views::{DashboardOverview, LayerRow, WorkspaceDetail, WorkspaceRow},
    ClientError, ErrorDisposition,
};
use shared::{
    plan::PlanTier,
    protocol::{Account, HealthStatus, Layer},
};

pub fn account(account: &Account) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} <{}>", account.full_name, account.email);
    let _ = writeln!(out, "  id:       {}", account.id);
    let _ = writeln!(out, "  plan:     {}", account.plan);
    let _ = writeln!(out, "  status:   {:?}", account.status);
    let _ = writeln!(out, "  verified: {}", if account.is_verified { "yes" } else { "no" });
    let _ = write!(out, "  joined:   {}", account.created_at.format("%Y-%m-%d"));
    out
}

pub fn overview(overview: &DashboardOverview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Welcome back, {}!", overview.full_name);
    let _ = writeln!(out);
    let _ = writeln!(out, "  Workspaces      {}", overview.workspace_count);
    let _ = writeln!(
        out,
        "  Total layers    {} / {}",
        overview.total_layers, overview.layer_limit
    );
    let _ = writeln!(
        out,
        "  Query quota     {} per month",
        overview.monthly_query_limit
    );
    let _ = writeln!(out, "  Current plan    {}", overview.plan);
    if let Some(next) = overview.plan.upgrade().filter(|_| overview.show_upgrade_prompt) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Upgrade to {next} for more layers and workspaces: run `geoqb plans`."
        );
    }
    let _ = writeln!(out);
    if overview.recent.is_empty() {
        let _ = write!(out, "No workspaces yet. Create one with `geoqb workspaces create <name>`.");
    } else {
        let _ = writeln!(out, "Your workspaces:");
        let _ = write!(out, "{}", workspaces(&overview.recent));
    }
    out.trim_end().to_string()
}

pub fn workspaces(rows: &[WorkspaceRow]) -> String {
    if rows.is_empty() {
        return "No workspaces.".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(
            out,
            "{}  {:<24} {:>3} layers  updated {}",
            row.id,
            row.name,
            row.layer_count,
            row.updated_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(description) = &row.description {
            let _ = writeln!(out, "    {description}");
        }
    }
    out.trim_end().to_string()
}

pub fn workspace_detail(detail: &WorkspaceDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", detail.workspace.name, detail.workspace.id);
    if let Some(description) = &detail.workspace.description {
        let _ = writeln!(out, "{description}");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Layers {}   Features {}   Processing {}",
        detail.counts.total(),
        detail.total_features,
        detail.counts.processing
    );
    let _ = writeln!(out);
    let _ = write!(out, "{}", layer_rows(&detail.layers));
    out.trim_end().to_string()
}

pub fn layer_rows(rows: &[LayerRow]) -> String {
    if rows.is_empty() {
        return "No layers yet. Add one with `geoqb layers add`.".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(
            out,
            "{}  {:<20} [{}]  {}  {} features  {}",
            row.id, row.name, row.badge, row.layer_type, row.feature_count, row.resolution_label
        );
        let _ = writeln!(out, "    tags: {}", row.tags);
        if let Some(message) = &row.error_message {
            let _ = writeln!(out, "    error: {message}");
        }
        if row.actions.can_reingest {
            let _ = writeln!(out, "    actions: reingest, delete");
        } else {
            let _ = writeln!(out, "    actions: delete");
        }
    }
    out
}

pub fn layer(layer: &Layer) -> String {
    let row = LayerRow::from(layer);
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", row.name, row.id);
    let _ = writeln!(out, "  status:     {}", row.badge);
    let _ = writeln!(out, "  type:       {}", row.layer_type);
    let _ = writeln!(out, "  tags:       {}", row.tags);
    let _ = writeln!(out, "  bbox:       {}", layer.bbox);
    let _ = writeln!(out, "  resolution: {}", row.resolution_label);
    let _ = writeln!(out, "  features:   {}", row.feature_count);
    if let Some(started) = layer.ingestion_started_at {
        let _ = writeln!(out, "  started:    {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = layer.ingestion_completed_at {
        let _ = writeln!(out, "  completed:  {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(message) = &row.error_message {
        let _ = writeln!(out, "  error:      {message}");
    }
    out.trim_end().to_string()
}

/// One-line progress summary printed on each watcher refresh.
pub fn watch_progress(layers: &[Layer]) -> String {
    let counts = StatusCounts::tally(layers);
    let mut line = format!(
        "{} pending, {} processing, {} completed, {} failed",
        counts.pending, counts.processing, counts.completed, counts.failed
    );
    for layer in layers {
        if let Some(message) = lifecycle::failure_message(layer) {
            let _ = write!(line, "\n  {} failed: {message}", layer.name);
        }
    }
    line
}

pub fn plans(current: Option<PlanTier>) -> String {
    let mut out = String::new();
    for tier in PlanTier::ALL {
        let offer = tier.offer();
        let price = tier.capabilities().monthly_price_usd;
        let marker = if Some(tier) == current {
            " (current plan)"
        } else if offer.highlighted {
            " (most popular)"
        } else {
            ""
        };
        let _ = writeln!(out, "{} - ${price}/month{marker}", tier.display_name());
        let _ = writeln!(out, "  {}", offer.description);
        for feature in offer.features {
            let _ = writeln!(out, "  + {feature}");
        }
        for limitation in offer.limitations {
            let _ = writeln!(out, "  - {limitation}");
        }
        let _ = writeln!(out);
    }
    out.trim_end().to_string()
}

pub fn health(health: &HealthStatus) -> String {
    let mut line = health.status.clone();
    if let Some(app) = &health.app {
        let _ = write!(line, "  {app}");
    }
    if let Some(version) = &health.version {
        let _ = write!(line, " {version}");
    }
    if let Some(environment) = &health.environment {
        let _ = write!(line, " ({environment})");
    }
    line
}

pub fn error(err: &ClientError) -> String {
    match err.disposition() {
        ErrorDisposition::RedirectToLogin => {
            "Your session is missing or has expired. Run `geoqb login` to sign in.".to_string()
        }
        ErrorDisposition::InlineFields(fields) => {
            let mut out = String::from("Please fix the following:");
            for field in fields {
                match &field.field {
                    Some(name) => {
                        let _ = write!(out, "\n  {name}: {}", field.message);
                    }
                    None => {
                        let _ = write!(out, "\n  {}", field.message);
                    }
                }
            }
            out
        }
        ErrorDisposition::Inline(message) => message,
        ErrorDisposition::NotFoundState => format!("Not found. ({err})"),
        ErrorDisposition::RetryPrompt(prompt) => format!("{prompt}\n  ({err})"),
    }
}
