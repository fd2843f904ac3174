//! State store and session repository implementations.
//!
//! - [`MemoryStateStore`] - process-local, for tests and embedding hosts that
//!   persist elsewhere
//! - [`JsonFileStateStore`] - a single JSON document on disk, rewritten
//!   atomically (write to a sibling temp file, then rename) on every save
//! - [`MemorySessionRepository`] - process-local session records
//!
//! # Thread Safety
//!
//! All types are `Send + Sync`. Locks are held only around map access and are
//! never held across an `.await`, except the JSON store's async mutex, which
//! deliberately serializes whole-file rewrites.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use lt_core::{
    FxHashMap, NewSession, Session, SessionError, SessionId, SessionRepository, SourceId,
    SourceWatchState, StateStore, StoreError, fx_hash_map,
};
use parking_lot::Mutex;
use tracing::debug;

/// In-memory [`StateStore`].
///
/// # Examples
///
/// ```
/// use lt_core::{SourceId, SourceWatchState};
/// use lt_tail::MemoryStateStore;
///
/// let store = MemoryStateStore::new();
/// store.insert(SourceWatchState::new(SourceId::new("alpha"), "logs/alpha.log"));
/// assert!(store.get(&SourceId::new("alpha")).is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<FxHashMap<SourceId, SourceWatchState>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, state: SourceWatchState) {
        self.states.lock().insert(state.source_id.clone(), state);
    }

    /// Returns a clone of the entry for `source`.
    #[must_use]
    pub fn get(&self, source: &SourceId) -> Option<SourceWatchState> {
        self.states.lock().get(source).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, source: &SourceId) -> Result<Option<SourceWatchState>, StoreError> {
        Ok(self.get(source))
    }

    async fn save(&self, state: &SourceWatchState) -> Result<(), StoreError> {
        self.insert(state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SourceWatchState>, StoreError> {
        let mut all: Vec<_> = self.states.lock().values().cloned().collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(all)
    }
}

/// [`StateStore`] backed by one JSON file.
///
/// The whole registry is cached in memory and rewritten on each save. The
/// rewrite goes to `<file>.tmp` first and is renamed over the original, so a
/// crash mid-write never leaves a torn document behind.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: Utf8PathBuf,
    states: tokio::sync::Mutex<FxHashMap<SourceId, SourceWatchState>>,
}

impl JsonFileStateStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Serde`] if it is not a valid registry document.
    pub async fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let states = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => fx_hash_map(),
            Ok(bytes) => {
                let entries: Vec<SourceWatchState> = serde_json::from_slice(&bytes)?;
                entries
                    .into_iter()
                    .map(|s| (s.source_id.clone(), s))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => fx_hash_map(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path, entries = states.len(), "Opened state store");

        Ok(Self {
            path,
            states: tokio::sync::Mutex::new(states),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    async fn write_all(&self, states: &FxHashMap<SourceId, SourceWatchState>) -> Result<(), StoreError> {
        let mut entries: Vec<&SourceWatchState> = states.values().collect();
        entries.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        let json = serde_json::to_vec_pretty(&entries)?;

        let tmp = Utf8PathBuf::from(format!("{}.tmp", self.path));
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self, source: &SourceId) -> Result<Option<SourceWatchState>, StoreError> {
        Ok(self.states.lock().await.get(source).cloned())
    }

    async fn save(&self, state: &SourceWatchState) -> Result<(), StoreError> {
        let mut states = self.states.lock().await;
        let previous = states.insert(state.source_id.clone(), state.clone());
        if let Err(err) = self.write_all(&states).await {
            // Keep memory consistent with disk.
            match previous {
                Some(prev) => states.insert(prev.source_id.clone(), prev),
                None => states.remove(&state.source_id),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SourceWatchState>, StoreError> {
        let mut all: Vec<_> = self.states.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(all)
    }
}

/// In-memory [`SessionRepository`] holding at most one open session per source.
#[derive(Debug)]
pub struct MemorySessionRepository {
    open: Mutex<FxHashMap<SourceId, Session>>,
    next_id: AtomicU64,
}

impl Default for MemorySessionRepository {
    fn default() -> Self {
        Self {
            open: Mutex::new(fx_hash_map()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MemorySessionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the open session for `source`, returning it.
    pub fn close(&self, source: &SourceId) -> Option<Session> {
        self.open.lock().remove(source)
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn open_session(&self, source: &SourceId) -> Result<Option<Session>, SessionError> {
        Ok(self.open.lock().get(source).cloned())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, SessionError> {
        let mut open = self.open.lock();
        if open.contains_key(&session.source_id) {
            return Err(SessionError(format!(
                "source '{}' already has an open session",
                session.source_id
            )));
        }
        let created = Session {
            id: SessionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            source_id: session.source_id,
            map: session.map,
            scenario: session.scenario,
            started_at: session.started_at,
            side: session.side,
        };
        open.insert(created.source_id.clone(), created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lt_core::Side;
    use tempfile::TempDir;

    fn temp_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        let mut state = SourceWatchState::new(SourceId::new("alpha"), "alpha.log");
        state.offset = 42;
        store.save(&state).await.unwrap();

        let loaded = store.load(&SourceId::new("alpha")).await.unwrap().unwrap();
        assert_eq!(loaded.offset, 42);
        assert!(store.load(&SourceId::new("bravo")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "state.json");

        let store = JsonFileStateStore::open(path.clone()).await.unwrap();
        let mut state = SourceWatchState::new(SourceId::new("alpha"), "logs/alpha.log")
            .with_query_address("127.0.0.1:27015");
        state.offset = 4096;
        state.creation_marker = Some(Utc::now());
        store.save(&state).await.unwrap();
        store
            .save(&SourceWatchState::new(SourceId::new("bravo"), "logs/bravo.log"))
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStateStore::open(path).await.unwrap();
        let loaded = reopened.load(&SourceId::new("alpha")).await.unwrap().unwrap();
        assert_eq!(loaded, state);

        let ids: Vec<_> = reopened
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.source_id.to_string())
            .collect();
        assert_eq!(ids, vec!["alpha", "bravo"]);
    }

    #[tokio::test]
    async fn test_json_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp_path(&dir, "absent.json")).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileStateStore::open(path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[tokio::test]
    async fn test_session_repository_single_open_session() {
        let repo = MemorySessionRepository::new();
        let source = SourceId::new("alpha");
        let new = NewSession {
            source_id: source.clone(),
            map: "Town".to_owned(),
            scenario: "Scenario_Town_Checkpoint_Security".to_owned(),
            started_at: Utc::now(),
            side: Side::Security,
        };

        let created = repo.create_session(new.clone()).await.unwrap();
        assert_eq!(repo.open_session(&source).await.unwrap(), Some(created.clone()));
        assert!(repo.create_session(new).await.is_err());
        assert_eq!(repo.open_count(), 1);

        assert_eq!(repo.close(&source), Some(created));
        assert_eq!(repo.open_count(), 0);
    }
}
