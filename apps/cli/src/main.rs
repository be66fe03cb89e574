use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use client_core::{
    forms::{self, LayerDraft, SignupDraft, WorkspaceDraft, WorkspaceEdit},
    lifecycle::{LayerWatcher, WatchOptions, WatchOutcome},
    views, ApiClient, ApiConfig, ClientError, Session, Store,
};
use shared::{
    domain::{LayerId, WorkspaceId, DEFAULT_RESOLUTION},
    protocol::TagFilter,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod session_file;

use config::Settings;

#[derive(Parser, Debug)]
#[command(name = "geoqb", version, about = "Manage GeoQB workspaces and spatial layers")]
struct Cli {
    /// Config file (defaults to ./geoqb.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the API base url, e.g. https://api.geoqb.io/api/v1
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// Dashboard summary: workspaces, layer usage and plan.
    Overview,
    /// List plan tiers and their limits.
    Plans,
    #[command(subcommand)]
    Workspaces(WorkspaceCommand),
    #[command(subcommand)]
    Layers(LayerCommand),
    /// Check that the backend is reachable.
    Health,
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommand {
    List,
    Show {
        id: WorkspaceId,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Rename {
        id: WorkspaceId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: WorkspaceId,
    },
}

#[derive(Subcommand, Debug)]
enum LayerCommand {
    List {
        #[arg(long)]
        workspace: WorkspaceId,
    },
    Show {
        #[arg(long)]
        workspace: WorkspaceId,
        id: LayerId,
    },
    Add(AddLayer),
    Rename {
        #[arg(long)]
        workspace: WorkspaceId,
        id: LayerId,
        name: String,
    },
    Delete {
        #[arg(long)]
        workspace: WorkspaceId,
        id: LayerId,
    },
    Reingest {
        #[arg(long)]
        workspace: WorkspaceId,
        id: LayerId,
    },
    /// Poll a workspace until every layer finishes ingesting.
    Watch {
        #[arg(long)]
        workspace: WorkspaceId,
        /// Seconds between polls; defaults to the configured interval.
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        max_polls: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct AddLayer {
    #[arg(long)]
    workspace: WorkspaceId,
    #[arg(long)]
    name: String,
    /// OSM category, e.g. amenity, building, highway.
    #[arg(long = "type")]
    layer_type: String,
    /// OSM tag filter as key=value; repeatable.
    #[arg(long = "tag", required = true)]
    tags: Vec<String>,
    /// min_lat,min_lon,max_lat,max_lon
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,
    /// H3 resolution (6-15).
    #[arg(long, default_value_t = i64::from(DEFAULT_RESOLUTION), allow_hyphen_values = true)]
    resolution: i64,
}

impl AddLayer {
    fn draft(&self) -> Result<LayerDraft, client_core::FormErrors> {
        let mut tags = TagFilter::new();
        for raw in &self.tags {
            let (key, value) = forms::parse_tag(raw)?;
            tags.insert(key, value);
        }
        Ok(LayerDraft {
            name: self.name.clone(),
            layer_type: self.layer_type.clone(),
            tags,
            bbox: forms::parse_bbox(&self.bbox)?,
            resolution: self.resolution,
        })
    }
}

struct App {
    settings: Settings,
    store: Store,
    api: Arc<ApiClient>,
}

impl App {
    fn new(settings: Settings) -> Result<Self> {
        let config = ApiConfig::new(&settings.api_url)?.with_timeout(settings.timeout());
        let api = Arc::new(ApiClient::new(config)?);
        let store = Store::new(api.clone(), settings.cache_ttl());
        Ok(Self {
            settings,
            store,
            api,
        })
    }

    /// Loads the stored session and re-validates it, so the account (and its
    /// plan) reflect the backend rather than the login-time snapshot.
    async fn session(&self) -> Result<Session> {
        let stored = session_file::load(&self.settings.session_file)?
            .ok_or_else(|| anyhow::Error::new(ClientError::Unauthorized))?;
        let session = self.store.restore(stored.token().clone()).await?;
        if session.account() != stored.account() {
            debug!(plan = %session.plan(), "cli: stored account changed, rewriting session");
            session_file::save(&self.settings.session_file, &session)?;
        }
        Ok(session)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match config::load_settings(cli.config.as_deref()) {
        Ok(mut settings) => {
            if let Some(api_url) = &cli.api_url {
                settings.api_url = api_url.clone();
            }
            settings
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    debug!(api_url = %settings.api_url, session_file = %settings.session_file.display(), "cli: settings loaded");

    let session_path = settings.session_file.clone();
    let app = match App::new(settings) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&app, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ClientError>() {
                Some(client_err) => {
                    if client_err.requires_reauth() {
                        if let Err(remove_err) = session_file::remove(&session_path) {
                            warn!(error = %remove_err, "cli: failed to clear stale session");
                        }
                    }
                    eprintln!("{}", render::error(client_err));
                }
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Signup {
            email,
            full_name,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let account = app
                .store
                .signup(&SignupDraft {
                    email,
                    password,
                    full_name,
                })
                .await?;
            println!("Account created for {}. Run `geoqb login` to sign in.", account.email);
        }
        Command::Login { email, password } => {
            let password = password_or_prompt(password)?;
            let session = match app.store.login(&email, &password).await {
                Err(ClientError::Unauthorized) => anyhow::bail!("incorrect email or password"),
                other => other?,
            };
            session_file::save(&app.settings.session_file, &session)?;
            println!(
                "Signed in as {} ({} plan).",
                session.account().full_name,
                session.plan()
            );
        }
        Command::Logout => match session_file::load(&app.settings.session_file)? {
            Some(session) => {
                session_file::remove(&app.settings.session_file)?;
                let result = app.store.logout(session).await;
                println!("Signed out.");
                if let Err(err) = result {
                    if !err.requires_reauth() {
                        warn!(error = %err, "cli: backend logout failed");
                    }
                }
            }
            None => println!("Not signed in."),
        },
        Command::Whoami => {
            let session = app.session().await?;
            let account = app.store.current_user(&session).await?;
            println!("{}", render::account(&account));
        }
        Command::Overview => {
            let session = app.session().await?;
            let overview = views::load_overview(&app.store, &session).await?;
            println!("{}", render::overview(&overview));
        }
        Command::Plans => {
            let current = session_file::load(&app.settings.session_file)
                .ok()
                .flatten()
                .map(|session| session.plan());
            println!("{}", render::plans(current));
        }
        Command::Workspaces(command) => run_workspaces(app, command).await?,
        Command::Layers(command) => run_layers(app, command).await?,
        Command::Health => {
            let health = app.api.health().await?;
            println!("{}", render::health(&health));
        }
    }
    Ok(())
}

async fn run_workspaces(app: &App, command: WorkspaceCommand) -> Result<()> {
    let session = app.session().await?;
    match command {
        WorkspaceCommand::List => {
            let rows = views::load_workspace_rows(&app.store, &session).await?;
            println!("{}", render::workspaces(&rows));
        }
        WorkspaceCommand::Show { id } => {
            let detail = views::load_workspace_detail(&app.store, &session, id).await?;
            println!("{}", render::workspace_detail(&detail));
        }
        WorkspaceCommand::Create { name, description } => {
            let draft = WorkspaceDraft {
                name,
                description,
            };
            let workspace = app.store.create_workspace(&session, &draft).await?;
            println!("Created workspace {} ({}).", workspace.name, workspace.id);
        }
        WorkspaceCommand::Rename {
            id,
            name,
            description,
        } => {
            let edit = WorkspaceEdit { name, description };
            let workspace = app.store.update_workspace(&session, id, &edit).await?;
            println!("Updated workspace {} ({}).", workspace.name, workspace.id);
        }
        WorkspaceCommand::Delete { id } => {
            app.store.delete_workspace(&session, id).await?;
            println!("Deleted workspace {id} and all of its layers.");
        }
    }
    Ok(())
}

async fn run_layers(app: &App, command: LayerCommand) -> Result<()> {
    let session = app.session().await?;
    match command {
        LayerCommand::List { workspace } => {
            let detail = views::load_workspace_detail(&app.store, &session, workspace).await?;
            println!("{}", render::workspace_detail(&detail));
        }
        LayerCommand::Show { workspace, id } => {
            let layer = app.store.layer(&session, workspace, id).await?;
            println!("{}", render::layer(&layer));
        }
        LayerCommand::Add(add) => {
            let draft = add.draft().map_err(ClientError::from)?;
            let layer = app.store.create_layer(&session, add.workspace, &draft).await?;
            println!(
                "Created layer {} ({}), status {}. Follow ingestion with `geoqb layers watch --workspace {}`.",
                layer.name, layer.id, layer.status, add.workspace
            );
        }
        LayerCommand::Rename {
            workspace,
            id,
            name,
        } => {
            let layer = app.store.rename_layer(&session, workspace, id, &name).await?;
            println!("Renamed layer to {}.", layer.name);
        }
        LayerCommand::Delete { workspace, id } => {
            app.store.delete_layer(&session, workspace, id).await?;
            println!("Deleted layer {id}.");
        }
        LayerCommand::Reingest { workspace, id } => {
            let layer = app.store.reingest_layer(&session, workspace, id).await?;
            println!("Re-ingestion queued for {}, status {}.", layer.name, layer.status);
        }
        LayerCommand::Watch {
            workspace,
            interval,
            max_polls,
        } => {
            let options = WatchOptions {
                interval: interval
                    .filter(|secs| *secs > 0)
                    .map(std::time::Duration::from_secs)
                    .unwrap_or_else(|| app.settings.poll_interval()),
                max_polls,
            };
            let outcome = LayerWatcher::new(&app.store, &session, workspace)
                .with_options(options)
                .run(|layers| println!("{}", render::watch_progress(layers)))
                .await?;
            match outcome {
                WatchOutcome::Settled(_) => println!("All layers settled."),
                WatchOutcome::GaveUp(_) => println!("Stopped polling; some layers are still ingesting."),
            }
        }
    }
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
