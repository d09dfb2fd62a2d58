use super::{Session, SessionStore, SessionStoreError, VoiceExchange};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Stores each session as `<dir>/<id>.json`.
///
/// Writes through one store are serialized, so appends from concurrent requests are never lost.
/// Separate stores pointed at the same directory do not coordinate.
pub struct JsonFileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSessionStore {
    /// Use `dir` as the session directory; it is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Identifiers are restricted to `[A-Za-z0-9_-]`, so they cannot escape the directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }

    /// Caller must hold `write_lock`; the staging path is shared per session.
    async fn write(&self, session: &Session) -> Result<(), SessionStoreError> {
        let path = self.path_for(&session.id).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid session id {:?}", session.id),
            )
        })?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(session)?;
        // Readers never observe a partially written document.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &path).await?;
        tracing::debug!(session_id = %session.id, turns = session.chat_history.len(), "Session saved");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn find(&self, id: &str) -> Result<Option<Session>, SessionStoreError> {
        let Some(path) = self.path_for(id) else {
            tracing::debug!(session_id = id, "Rejected malformed session id");
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(session).await
    }

    async fn append_exchange(
        &self,
        id: &str,
        exchange: VoiceExchange,
    ) -> Result<Option<Session>, SessionStoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut session) = self.find(id).await? else {
            return Ok(None);
        };
        session.apply(exchange);
        self.write(&session).await?;
        Ok(Some(session))
    }
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session.
    pub async fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find(&self, id: &str) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.insert(session.clone()).await;
        Ok(())
    }

    async fn append_exchange(
        &self,
        id: &str,
        exchange: VoiceExchange,
    ) -> Result<Option<Session>, SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.get_mut(id).map(|session| {
            session.apply(exchange);
            session.clone()
        }))
    }
}
