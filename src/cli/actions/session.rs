use crate::config::EngineConfig;
use crate::session::{Session, SessionStore};
use anyhow::{Context, Result};
use tracing::info;

/// Print the stored session for `identity`, listing setting keys only.
///
/// # Errors
/// Returns an error if the session is missing, corrupt or belongs to another identity.
pub fn show(identity: &str, config: &EngineConfig) -> Result<()> {
    let store = SessionStore::new(config.session_file_path());
    let session = store
        .restore(identity)
        .with_context(|| format!("cannot load session for {identity}"))?;

    print!("{}", render(&store, &session));

    Ok(())
}

/// Remove the stored session file.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn clear(config: &EngineConfig) -> Result<()> {
    let store = SessionStore::new(config.session_file_path());
    store.clear()?;
    info!(path = %store.path().display(), "session cleared");
    Ok(())
}

fn render(store: &SessionStore, session: &Session) -> String {
    let mut out = format!(
        "path: {}\nidentity: {}\nsettings:\n",
        store.path().display(),
        session.identity()
    );
    for key in session.settings().keys() {
        out.push_str("  ");
        out.push_str(key);
        out.push_str(": ***\n");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    #[test]
    fn render_lists_keys_without_values() {
        let mut settings = Map::new();
        settings.insert("cookies".to_string(), json!({"sessionid": "s3cret"}));
        settings.insert("uuids".to_string(), json!({"device_id": "abc"}));
        let store = SessionStore::new("/tmp/session.json");

        let rendered = render(&store, &Session::new("alice", settings));

        assert!(rendered.contains("identity: alice"));
        assert!(rendered.contains("  cookies: ***"));
        assert!(rendered.contains("  uuids: ***"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn show_fails_for_other_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        SessionStore::new(&path)
            .persist(&Session::new("alice", Map::new()))
            .unwrap();
        let config = EngineConfig::new().with_session_file_path(&path);

        assert!(show("bob", &config).is_err());
        assert!(show("alice", &config).is_ok());
    }

    #[test]
    fn clear_removes_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        SessionStore::new(&path)
            .persist(&Session::new("alice", Map::new()))
            .unwrap();
        let config = EngineConfig::new().with_session_file_path(&path);

        clear(&config).unwrap();
        assert!(!path.exists());
    }
}
