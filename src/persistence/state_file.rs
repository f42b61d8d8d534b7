//! Alert state persisted as a JSON file between runs

use crate::domain::AlertState;
use crate::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JSON snapshot of [`AlertState`] on disk
#[derive(Debug, Clone)]
pub struct AlertStateFile {
    path: PathBuf,
}

impl AlertStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state; a missing file is an empty state
    pub fn load(&self) -> Result<AlertState> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let state: AlertState = serde_json::from_str(&raw)?;
                debug!(path = %self.path.display(), records = state.len(), "alert state loaded");
                Ok(state)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved alert state, starting empty");
                Ok(AlertState::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the whole snapshot. Goes through a temp file and rename so a
    /// crash mid-write leaves the previous snapshot intact.
    pub fn save(&self, state: &AlertState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), records = state.len(), "alert state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertRecord;
    use chrono::Utc;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = AlertStateFile::new(dir.path().join("absent.json"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = AlertStateFile::new(dir.path().join("nested/alert_state.json"));

        let mut state = AlertState::new();
        state.insert(
            "ns1-clusterA".into(),
            AlertRecord::failing("ns1", "clusterA", "Authorization: Fail".into(), Utc::now()),
        );
        file.save(&state).unwrap();

        assert_eq!(file.load().unwrap(), state);
        assert!(!dir.path().join("nested/alert_state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert_state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(AlertStateFile::new(path).load().is_err());
    }
}
