use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use client_core::api::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use client_core::cache::DEFAULT_CACHE_TTL;
use client_core::lifecycle::DEFAULT_POLL_INTERVAL;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "geoqb.toml";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub session_file: PathBuf,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub poll_interval_secs: u64,
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            session_file: default_session_file(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            log: "warn".into(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Keys accepted in `geoqb.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_url: Option<String>,
    session_file: Option<PathBuf>,
    timeout_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    log: Option<String>,
}

fn default_session_file() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("geoqb").join(SESSION_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(".geoqb").join(SESSION_FILE_NAME))
}

/// Defaults, then the config file, then environment variables.
///
/// An explicitly named config file must exist; the default `geoqb.toml` in the
/// working directory is optional.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let raw = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && config_path.is_none() => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {}", path.display()))
        }
    };
    let mut settings = Settings::default();
    if let Some(raw) = raw {
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file_cfg.session_file {
        settings.session_file = v;
    }
    if let Some(v) = file_cfg.timeout_secs {
        settings.timeout_secs = v;
    }
    if let Some(v) = file_cfg.cache_ttl_secs {
        settings.cache_ttl_secs = v;
    }
    if let Some(v) = file_cfg.poll_interval_secs {
        settings.poll_interval_secs = v;
    }
    if let Some(v) = file_cfg.log {
        settings.log = v;
    }
    Ok(())
}

/// `GEOQB_*` variables, overridden by their `APP__*` aliases.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    let lookup = |name: &str| var(&format!("APP__{name}")).or_else(|| var(&format!("GEOQB_{name}")));

    if let Some(v) = lookup("API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }
    if let Some(v) = lookup("TIMEOUT_SECS") {
        settings.timeout_secs = parse_secs("TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("CACHE_TTL_SECS") {
        settings.cache_ttl_secs = parse_secs("CACHE_TTL_SECS", &v)?;
    }
    if let Some(v) = lookup("POLL_INTERVAL_SECS") {
        settings.poll_interval_secs = parse_secs("POLL_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = lookup("LOG") {
        settings.log = v;
    }
    Ok(())
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("GEOQB_{name} must be a whole number of seconds, got {raw:?}"))
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.timeout_secs == 0 {
        bail!("timeout_secs must be greater than zero");
    }
    if settings.poll_interval_secs == 0 {
        bail!("poll_interval_secs must be greater than zero");
    }
    if settings.api_url.trim().is_empty() {
        bail!("api_url must not be empty");
    }
    Ok(())
}
