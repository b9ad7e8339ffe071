use std::fs;
use std::io;
use std::path::Path;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::cache::ChallengeCache;

/// Who the client is talking as, and to which server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub base_url: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Session {
    pub fn new(base_url: impl Into<String>) -> Self {
        Session {
            base_url: base_url.into(),
            user_id: None,
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to access session file: {0}")]
    Io(#[from] io::Error),
    #[error("session file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Application state owned by the client's composition root. Only the session survives
/// a restart; the cache always starts empty and is refilled from the server.
#[derive(Debug)]
pub struct ClientState {
    pub session: Session,
    pub cache: ChallengeCache,
}

impl ClientState {
    pub fn new(session: Session) -> Self {
        ClientState {
            session,
            cache: ChallengeCache::new(),
        }
    }

    /// Read the persisted session from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let session: Session = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), "session loaded");
        Ok(ClientState::new(session))
    }

    /// Like [`load`](Self::load), but starts a fresh session when nothing was saved yet.
    pub fn load_or_new<P: AsRef<Path>>(path: P, base_url: &str) -> Result<Self, SessionError> {
        match Self::load(path) {
            Ok(state) => Ok(state),
            Err(SessionError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(ClientState::new(Session::new(base_url)))
            }
            Err(e) => Err(e),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SessionError> {
        let raw = serde_json::to_string_pretty(&self.session)?;
        fs::write(path.as_ref(), raw)?;
        tracing::debug!(path = %path.as_ref().display(), "session saved");
        Ok(())
    }

    /// Forget credentials and everything cached under them.
    pub fn sign_out(&mut self) {
        self.session.user_id = None;
        self.session.token = None;
        self.cache.clear();
    }
}
