//! Session persistence
//!
//! One JSON file per participant under the configured state directory, so
//! a session survives a page reload or process restart. Saves are explicit
//! at transition points rather than on every mutation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::session::SessionState;

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, participant_id: &str) -> PathBuf {
        // Participant ids come from the recruitment platform; strip
        // anything that could escape the state directory.
        let safe: String = participant_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.dir.join(format!("session-{}.json", safe))
    }

    pub fn save(&self, participant_id: &str, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(participant_id);
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&path, json)?;
        tracing::debug!(participant_id, path = %path.display(), "session saved");
        Ok(())
    }

    /// Load the persisted state for a participant, `None` when no prior
    /// session exists. A corrupt file is treated as absent after a warning
    /// so a bad write never locks the participant out.
    pub fn load(&self, participant_id: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(participant_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                tracing::warn!(participant_id, %err, "discarding corrupt session file");
                Ok(None)
            }
        }
    }

    pub fn clear(&self, participant_id: &str) -> Result<()> {
        let path = self.path_for(participant_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStatus, DEFAULT_MAX_MARKETS};
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let mut state = SessionState::new(DEFAULT_MAX_MARKETS);
        state.authenticated(false);
        store.save("p-1", &state).unwrap();

        let loaded = store.load("p-1").unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_states_are_keyed_by_participant() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let mut a = SessionState::new(DEFAULT_MAX_MARKETS);
        a.authenticated(true);
        let b = SessionState::new(DEFAULT_MAX_MARKETS);
        store.save("alice", &a).unwrap();
        store.save("bob", &b).unwrap();

        assert_eq!(
            store.load("alice").unwrap().unwrap().status,
            SessionStatus::Waiting
        );
        assert_eq!(
            store.load("bob").unwrap().unwrap().status,
            SessionStatus::Unauthenticated
        );
    }

    #[test]
    fn test_missing_participant_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("nobody").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save("p-1", &SessionState::default()).unwrap();
        fs::write(store.path_for("p-1"), "{not json").unwrap();
        assert!(store.load("p-1").unwrap().is_none());
    }

    #[test]
    fn test_participant_id_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let path = store.path_for("../../etc/passwd");
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.file_name().unwrap(), "session-etcpasswd.json");
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save("p-1", &SessionState::default()).unwrap();
        store.clear("p-1").unwrap();
        assert!(store.load("p-1").unwrap().is_none());
        // Clearing again is fine
        store.clear("p-1").unwrap();
    }
}
