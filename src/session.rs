//! Persistence of the conversation session id across restarts.
//!
//! The console keeps exactly one session identifier. It is stored as a
//! single line in `<state_dir>/session_id`.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::SessionConfig;

const SESSION_FILE: &str = "session_id";

/// Filesystem-backed store for the one session identifier.
#[derive(Debug, Clone)]
pub struct SessionIdStore {
    path: PathBuf,
}

impl SessionIdStore {
    /// Store rooted at `state_dir`. The directory is created on first save.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.state_dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved id, or `None` when nothing was stored yet.
    pub fn load(&self) -> Result<Option<String>, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(format!(
                    "failed to read session id {}: {e}",
                    self.path.display()
                ))
            }
        };
        let id = raw.trim();
        if id.is_empty() {
            return Ok(None);
        }
        validate_session_id(id)?;
        Ok(Some(id.to_string()))
    }

    pub fn save(&self, session_id: &str) -> Result<(), String> {
        validate_session_id(session_id)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                format!("failed to create state directory {}: {e}", parent.display())
            })?;
        }
        // Sibling temp file then rename, so a crash never leaves a torn id.
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, format!("{}\n", session_id.trim())).map_err(|e| {
            format!(
                "failed to write temporary session file {}: {e}",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            format!(
                "failed to move session file into place {}: {e}",
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Forget the stored id. Missing files are not an error.
    pub fn clear(&self) -> Result<(), String> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!(
                "failed to remove session id {}: {e}",
                self.path.display()
            )),
        }
    }
}

/// Reject ids that are unsafe to persist or echo back to the backend.
pub fn validate_session_id(session_id: &str) -> Result<(), String> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err("session id cannot be empty".to_string());
    }
    if trimmed == "." || trimmed == ".." {
        return Err("session id cannot be '.' or '..'".to_string());
    }
    if trimmed
        .chars()
        .any(|ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.'))
    {
        return Err(
            "session id can only contain ASCII letters, numbers, '.', '-', '_'".to_string(),
        );
    }
    Ok(())
}

/// Generate an opaque hex id (`xxxx-xxxx-xxxx-xxxx`).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    let hex = format!("{:016x}", u64::from_be_bytes(bytes));
    format!(
        "{}-{}-{}-{}",
        &hex[0..4],
        &hex[4..8],
        &hex[8..12],
        &hex[12..16]
    )
}
