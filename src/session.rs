use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{TokenBundle, UserProfile};
use crate::error::AdlensError;
use crate::report::SiteMetrics;
use crate::report::adsense::Account;

/// Everything cached between runs. Every field is optional: a default
/// session simply means "no prior session".
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Session {
    pub profile: Option<UserProfile>,
    pub tokens: Option<TokenBundle>,
    pub accounts: Vec<Account>,
    pub selected_account: Option<String>,
    pub report: Vec<SiteMetrics>,
    pub report_fetched_at: Option<DateTime<Utc>>,
    pub insights: Vec<String>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.tokens.is_some()
    }
}

/// Best-effort JSON file cache.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing, unreadable or corrupt file is treated as no
    /// prior session.
    pub fn load(&self) -> Session {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached session");
                return Session::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read cached session, starting fresh");
                return Session::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "cached session is corrupt, starting fresh");
            Session::default()
        })
    }

    /// Write via a sibling temp file and rename, so a crash never leaves a
    /// half-written cache. The file holds tokens, so on Unix it is readable
    /// by the owner only.
    pub fn save(&self, session: &Session) -> Result<(), AdlensError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| AdlensError::Session(format!("cannot create {}: {e}", dir.display())))?;
        }

        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| AdlensError::Session(format!("cannot encode session: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &json)
            .map_err(|e| AdlensError::Session(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AdlensError::Session(format!("cannot replace {}: {e}", self.path.display())))
    }

    pub fn clear(&self) -> Result<(), AdlensError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AdlensError::Session(format!(
                "cannot remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // `mode` only applies on creation; a leftover temp file keeps its bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_no_prior_session() {
        let (_dir, store) = store();
        let session = store.load();
        assert!(!session.is_connected());
        assert!(session.report.is_empty());
    }

    #[test]
    fn corrupt_file_is_no_prior_session() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().selected_account.is_none());
    }

    #[test]
    fn save_then_load() {
        let (_dir, store) = store();
        let session = Session {
            tokens: Some(serde_json::from_str(r#"{"access_token":"tok"}"#).unwrap()),
            selected_account: Some("accounts/pub-1".to_owned()),
            report: vec![SiteMetrics::new("example.com", 12.5, 1000, 5000, 25, None)],
            insights: vec!["one".to_owned()],
            ..Session::default()
        };
        store.save(&session).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.tokens.as_ref().map(|t| t.bearer()), Some("tok"));
        assert_eq!(loaded.selected_account.as_deref(), Some("accounts/pub-1"));
        assert_eq!(loaded.report, session.report);
        assert_eq!(loaded.insights, session.insights);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(store.path(), r#"{"insights": ["cached"]}"#).unwrap();
        let session = store.load();
        assert_eq!(session.insights, vec!["cached"]);
        assert!(session.tokens.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(store.path().with_extension("json.tmp"), "stale").unwrap();

        store.save(&Session::default()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, store) = store();
        store.save(&Session::default()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }
}
