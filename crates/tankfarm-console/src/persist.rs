//! Debounced auto-save to a local file and the backend.
//!
//! A save runs only when the validation gate is open. The local write is
//! synchronous and happens first; the remote write runs on its own thread
//! and is never awaited by the caller. Neither failure is surfaced to the
//! user: both are logged and counted.

#![allow(missing_docs)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use tankfarm_core::form::ApplyReport;
use tankfarm_core::{FormState, PersistedFormState};

use crate::error::ConsoleError;

/// Local snapshot storage.
pub trait LocalStore: Send + Sync {
    /// `None` when nothing was saved yet.
    fn read(&self) -> Result<Option<PersistedFormState>, ConsoleError>;
    fn write(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError>;
}

/// Backend snapshot storage.
pub trait RemoteStore: Send + Sync {
    fn save(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError>;
    /// `None` when the backend has nothing saved.
    fn load(&self) -> Result<Option<PersistedFormState>, ConsoleError>;
}

/// JSON file written through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    path: PathBuf,
}

impl FileLocalStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalStore for FileLocalStore {
    fn read(&self) -> Result<Option<PersistedFormState>, ConsoleError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConsoleError::Storage(
                    format!("{}: {err}", self.path.display()).into(),
                ))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let snapshot: PersistedFormState = serde_json::from_str(&text).map_err(|err| {
            ConsoleError::Storage(format!("{}: {err}", self.path.display()).into())
        })?;
        Ok((!snapshot.is_empty()).then_some(snapshot))
    }

    fn write(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError> {
        let storage = |err: std::io::Error| {
            ConsoleError::Storage(format!("{}: {err}", self.path.display()).into())
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        let text = serde_json::to_string_pretty(snapshot)
            .map_err(|err| ConsoleError::Storage(err.to_string().into()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = fs::File::create(&tmp).map_err(storage)?;
            file.write_all(text.as_bytes()).map_err(storage)?;
            file.sync_all().map_err(storage)?;
        }
        fs::rename(&tmp, &self.path).map_err(storage)
    }
}

/// In-memory store; `failing()` rejects every write.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    slot: Mutex<Option<PersistedFormState>>,
    fail_writes: bool,
    writes: AtomicU64,
}

impl MemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: PersistedFormState) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<PersistedFormState> {
        self.slot.lock().clone()
    }

    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl LocalStore for MemoryLocalStore {
    fn read(&self) -> Result<Option<PersistedFormState>, ConsoleError> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes {
            return Err(ConsoleError::Storage("storage quota exceeded".into()));
        }
        *self.slot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn read(&self) -> Result<Option<PersistedFormState>, ConsoleError> {
        (**self).read()
    }

    fn write(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError> {
        (**self).write(snapshot)
    }
}

/// Trailing-edge debounce. Each `schedule` pushes the deadline out; `fire`
/// reports true once per armed deadline.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl SaveDebouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct PersistStats {
    attempts: AtomicU64,
    local_failures: AtomicU64,
    remote_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistCounts {
    pub attempts: u64,
    pub local_failures: u64,
    pub remote_failures: u64,
}

/// Outcome of one `persist` call. The remote write may still be running.
#[derive(Debug)]
pub struct PersistReceipt {
    pub saved_at: i64,
    pub local: Result<(), ConsoleError>,
    remote: Option<thread::JoinHandle<bool>>,
}

impl PersistReceipt {
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Block until the remote write finishes. `None` when there was no
    /// remote write; `Some(false)` when it failed.
    pub fn wait_remote(self) -> Option<bool> {
        self.remote.map(|handle| handle.join().unwrap_or(false))
    }
}

#[derive(Debug)]
pub enum SaveOutcome {
    /// Gate closed; carries the rejection shown to the user.
    Blocked(String),
    Persisted(PersistReceipt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Nothing,
    Local,
    Remote,
    /// Remote copy was older than the local one and was ignored.
    LocalNewer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub report: Option<ApplyReport>,
    /// `savedAt` of the snapshot that ended up applied.
    pub saved_at: Option<i64>,
    /// Remote failure that left the local state in place.
    pub remote_error: Option<ConsoleError>,
}

/// Wall clock in unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub struct PersistenceCoordinator {
    local: Box<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    debouncer: SaveDebouncer,
    stats: Arc<PersistStats>,
    clock: Clock,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("remote_configured", &self.remote.is_some())
            .field("debouncer", &self.debouncer)
            .field("counts", &self.counts())
            .finish()
    }
}

impl PersistenceCoordinator {
    pub fn new(
        local: Box<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        debounce: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            debouncer: SaveDebouncer::new(debounce),
            stats: Arc::new(PersistStats::default()),
            clock: Arc::new(now_millis),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule_save(&mut self, now: Instant) {
        tracing::trace!("save scheduled");
        self.debouncer.schedule(now);
    }

    #[must_use]
    pub fn save_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Run the pending save once its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant, form: &FormState) -> Option<SaveOutcome> {
        if !self.debouncer.fire(now) {
            return None;
        }
        Some(self.save(form))
    }

    /// Validate, then persist. Skips the debounce.
    pub fn save(&self, form: &FormState) -> SaveOutcome {
        let gate = form.gate();
        if let Some(message) = gate.rejection_message() {
            tracing::debug!(%message, "auto-save blocked by validation");
            return SaveOutcome::Blocked(message);
        }
        SaveOutcome::Persisted(self.persist(form.collect()))
    }

    /// Stamp and write `snapshot` locally, then hand it to the remote store
    /// on a background thread.
    pub fn persist(&self, snapshot: PersistedFormState) -> PersistReceipt {
        let saved_at = (self.clock)();
        let snapshot = snapshot.stamped(saved_at);
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        let local = self.local.write(&snapshot);
        if let Err(err) = &local {
            self.stats.local_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "local save failed");
        }

        let remote = self.remote.as_ref().map(|remote| {
            let remote = Arc::clone(remote);
            let stats = Arc::clone(&self.stats);
            thread::spawn(move || match remote.save(&snapshot) {
                Ok(()) => {
                    tracing::debug!(saved_at, "remote save done");
                    true
                }
                Err(err) => {
                    stats.remote_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "remote save failed");
                    false
                }
            })
        });

        tracing::debug!(saved_at, counts = ?self.counts(), "persisted");
        PersistReceipt {
            saved_at,
            local,
            remote,
        }
    }

    /// Apply the local snapshot, then the remote one unless the local copy
    /// is strictly newer.
    pub fn load(&self, form: &mut FormState) -> LoadOutcome {
        let local = match self.local.read() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "local state unreadable");
                None
            }
        };
        let mut outcome = LoadOutcome {
            source: LoadSource::Nothing,
            report: None,
            saved_at: None,
            remote_error: None,
        };
        if let Some(snapshot) = &local {
            outcome.report = Some(form.apply(snapshot));
            outcome.source = LoadSource::Local;
            outcome.saved_at = snapshot.saved_at;
            tracing::info!(saved_at = ?snapshot.saved_at, "applied local state");
        }

        let Some(remote) = &self.remote else {
            return outcome;
        };
        match remote.load() {
            Ok(Some(snapshot)) => {
                let local_newer = match (local.as_ref().and_then(|s| s.saved_at), snapshot.saved_at) {
                    (Some(local_at), Some(remote_at)) => local_at > remote_at,
                    _ => false,
                };
                if local_newer {
                    tracing::info!("remote state older than local; keeping local");
                    outcome.source = LoadSource::LocalNewer;
                } else {
                    outcome.report = Some(form.apply(&snapshot));
                    outcome.source = LoadSource::Remote;
                    outcome.saved_at = snapshot.saved_at;
                    tracing::info!(saved_at = ?snapshot.saved_at, "applied remote state");
                }
            }
            Ok(None) => tracing::info!("remote state empty"),
            Err(err) => {
                tracing::warn!(error = %err, "remote load failed; local state stays");
                outcome.remote_error = Some(err);
            }
        }
        outcome
    }

    #[must_use]
    pub fn counts(&self) -> PersistCounts {
        PersistCounts {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            local_failures: self.stats.local_failures.load(Ordering::Relaxed),
            remote_failures: self.stats.remote_failures.load(Ordering::Relaxed),
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
