//! Persists the signed-in session between CLI invocations.

use std::{fs, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use client_core::Session;
use tracing::debug;

pub fn load(path: &Path) -> Result<Option<Session>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read session {}", path.display()))
        }
    };
    let session = serde_json::from_str::<Session>(&raw)
        .with_context(|| format!("corrupt session file {}; run `geoqb logout`", path.display()))?;
    Ok(Some(session))
}

pub fn save(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(session)?;
    fs::write(path, raw).with_context(|| format!("failed to write session {}", path.display()))?;
    restrict_permissions(path)?;
    debug!(path = %path.display(), "session: saved");
    Ok(())
}

/// Returns whether a session file existed.
pub fn remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "session: removed");
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove session {}", path.display())),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::Utc;
    use client_core::AccessToken;
    use shared::{
        domain::{AccountStatus, UserId},
        plan::PlanTier,
        protocol::Account,
    };

    use super::*;

    fn temp_path() -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("geoqb_session_test_{suffix}"))
            .join("session.json")
    }

    #[test]
    fn save_load_remove_cycle() {
        let path = temp_path();
        assert!(load(&path).expect("load missing").is_none());

        let session = Session::new(
            AccessToken::new("token-abc"),
            Account {
                id: UserId::new(),
                email: "ada@example.com".into(),
                full_name: "Ada Lovelace".into(),
                plan: PlanTier::Business,
                status: AccountStatus::Active,
                is_verified: true,
                created_at: Utc::now(),
                last_login: None,
            },
        );
        save(&path, &session).expect("save");

        let loaded = load(&path).expect("load").expect("present");
        assert_eq!(loaded.token().as_str(), "token-abc");
        assert_eq!(loaded.plan(), PlanTier::Business);

        assert!(remove(&path).expect("remove"));
        assert!(!remove(&path).expect("remove again"));
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn corrupt_file_is_reported() {
        let path = temp_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("dir");
        }
        fs::write(&path, "{not json").expect("write");
        assert!(load(&path).is_err());
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
