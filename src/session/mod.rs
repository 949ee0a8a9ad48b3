//! Session persistence.
//!
//! Both tokens live in a single [`Session`] record so they are always written
//! and cleared together. Stores are opaque: nothing here looks inside a token.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            saved_at: Utc::now(),
        }
    }

    /// Same session with a new access token. The refresh token is replaced
    /// only when the server rotated it.
    pub fn refreshed(&self, access_token: String, rotated_refresh: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token: rotated_refresh.or_else(|| self.refresh_token.clone()),
            saved_at: Utc::now(),
        }
    }
}

/// Durable holder for the current session
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Result<Option<Session>>;

    /// Overwrites both tokens
    fn set(&self, session: &Session) -> Result<()>;

    /// Removes both tokens
    fn clear(&self) -> Result<()>;
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<Session>> {
        let guard = self
            .session
            .read()
            .map_err(|_| ClientError::storage("session lock poisoned"))?;
        Ok(guard.clone())
    }

    fn set(&self, session: &Session) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| ClientError::storage("session lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| ClientError::storage("session lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// JSON file store that survives restarts
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt file is treated as no session; the next login rewrites it
                tracing::warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn set(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(session)?;
        write_private(&self.path, content.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `content` to a sibling temp file readable by the owner only, then
/// rename it over `path`. Readers see the old file or the new one, never half.
pub(crate) fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    // A leftover temp file would keep its old mode
    match fs::remove_file(&tmp) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}
