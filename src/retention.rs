//! Time-based reclamation of session directories and merged artifacts.
//!
//! Deletions are kept in a [`RetentionQueue`] indexed by path and ordered by
//! expiry. Nothing is deleted when an entry is scheduled; a periodic
//! [`sweep`](RetentionQueue::sweep) removes whatever is due. Because the sweep
//! takes the current time as an argument, expiry behaviour can be tested
//! without waiting.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::error::{PrintMergeError, Result};

/// Number of deletion attempts before an entry is dropped from the queue.
pub const MAX_DELETE_ATTEMPTS: u32 = 5;

/// How long each kind of resource is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Window after which a session's uploaded inputs are removed.
    pub session: TimeDelta,
    /// Window after which a merged artifact is removed.
    pub artifact: TimeDelta,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            session: TimeDelta::minutes(5),
            artifact: TimeDelta::hours(1),
        }
    }
}

impl RetentionPolicy {
    /// Build a policy from whole seconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a window is zero or too large to represent.
    pub fn from_secs(session: u64, artifact: u64) -> Result<Self> {
        Ok(Self {
            session: window_from_secs("session", session)?,
            artifact: window_from_secs("artifact", artifact)?,
        })
    }

    /// Retention window for the given kind of resource.
    pub fn window(&self, kind: ResourceKind) -> TimeDelta {
        match kind {
            ResourceKind::SessionDir => self.session,
            ResourceKind::Artifact => self.artifact,
        }
    }
}

fn window_from_secs(name: &str, secs: u64) -> Result<TimeDelta> {
    if secs == 0 {
        return Err(PrintMergeError::invalid_config(format!(
            "The {name} retention window must be at least one second"
        )));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| {
            PrintMergeError::invalid_config(format!(
                "The {name} retention window of {secs} seconds is too large"
            ))
        })
}

/// What a scheduled path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A per-request upload directory.
    SessionDir,
    /// A merged output document.
    Artifact,
}

/// A pending deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDeletion {
    pub kind: ResourceKind,
    /// File or directory to remove.
    pub path: PathBuf,
    /// Earliest time the path may be removed.
    pub expires_at: DateTime<Utc>,
    /// Failed deletion attempts so far.
    pub attempts: u32,
}

/// Outcome of one [`RetentionQueue::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed from disk.
    pub deleted: usize,
    /// Entries whose path no longer existed.
    pub already_gone: usize,
    /// Entries that could not be removed and stay queued for a retry.
    pub failed: usize,
    /// Entries dropped after [`MAX_DELETE_ATTEMPTS`] failures.
    pub abandoned: usize,
}

impl SweepReport {
    /// Whether the sweep touched anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

type ExpiryKey = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct QueueState {
    by_expiry: BTreeMap<ExpiryKey, ScheduledDeletion>,
    by_path: HashMap<PathBuf, ExpiryKey>,
    next_seq: u64,
}

impl QueueState {
    fn insert(&mut self, entry: ScheduledDeletion) {
        if let Some(old) = self.by_path.remove(&entry.path) {
            self.by_expiry.remove(&old);
        }
        let key = (entry.expires_at, self.next_seq);
        self.next_seq += 1;
        self.by_path.insert(entry.path.clone(), key);
        self.by_expiry.insert(key, entry);
    }

    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledDeletion> {
        let mut due = Vec::new();
        while let Some(entry) = self.by_expiry.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let entry = entry.remove();
            self.by_path.remove(&entry.path);
            due.push(entry);
        }
        due
    }
}

/// Shared queue of deferred deletions.
///
/// The lock is only held while the index is updated, never while files are
/// being removed.
#[derive(Debug, Default)]
pub struct RetentionQueue {
    state: Mutex<QueueState>,
}

impl RetentionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `path` for deletion at `expires_at`.
    ///
    /// Scheduling a path that is already queued replaces its expiry.
    pub async fn schedule(&self, kind: ResourceKind, path: PathBuf, expires_at: DateTime<Utc>) {
        tracing::debug!(?kind, path = %path.display(), %expires_at, "Deletion scheduled");
        self.state.lock().await.insert(ScheduledDeletion {
            kind,
            path,
            expires_at,
            attempts: 0,
        });
    }

    /// Expiry of a queued path, if any.
    pub async fn expiry_of(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .by_path
            .get(path)
            .map(|(expires_at, _)| *expires_at)
    }

    /// All queued deletions, earliest first.
    pub async fn pending(&self) -> Vec<ScheduledDeletion> {
        self.state.lock().await.by_expiry.values().cloned().collect()
    }

    /// Number of queued deletions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.by_expiry.len()
    }

    /// Whether nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete every entry due at `now`.
    ///
    /// Paths that are already gone count as removed. Entries that fail are
    /// re-queued and retried on the next sweep until they have failed
    /// [`MAX_DELETE_ATTEMPTS`] times.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let due = self.state.lock().await.take_due(now);
        let mut report = SweepReport::default();
        let mut retry = Vec::new();

        for mut entry in due {
            match remove_path(&entry.path).await {
                Ok(true) => {
                    tracing::info!(kind = ?entry.kind, path = %entry.path.display(), "Expired resource deleted");
                    report.deleted += 1;
                }
                Ok(false) => report.already_gone += 1,
                Err(e) => {
                    entry.attempts += 1;
                    if entry.attempts >= MAX_DELETE_ATTEMPTS {
                        tracing::error!(
                            kind = ?entry.kind,
                            path = %entry.path.display(),
                            attempts = entry.attempts,
                            error = %e,
                            "Giving up on expired resource"
                        );
                        report.abandoned += 1;
                    } else {
                        tracing::warn!(
                            kind = ?entry.kind,
                            path = %entry.path.display(),
                            attempts = entry.attempts,
                            error = %e,
                            "Failed to delete expired resource, will retry"
                        );
                        report.failed += 1;
                        retry.push(entry);
                    }
                }
            }
        }

        if !retry.is_empty() {
            let mut state = self.state.lock().await;
            for entry in retry {
                // A newer schedule for the same path wins over the retry.
                if !state.by_path.contains_key(&entry.path) {
                    state.insert(entry);
                }
            }
        }

        report
    }
}

/// Remove a file or directory tree. Returns `Ok(false)` if nothing was there.
async fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Run [`RetentionQueue::sweep`] every `every` until the handle is aborted.
pub fn spawn_sweeper(queue: Arc<RetentionQueue>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = queue.sweep(Utc::now()).await;
            if !report.is_empty() {
                tracing::info!(
                    deleted = report.deleted,
                    already_gone = report.already_gone,
                    failed = report.failed,
                    abandoned = report.abandoned,
                    "Retention sweep completed"
                );
            }
        }
    })
}

/// Schedule everything left over from a previous run.
///
/// Scans the uploads root and the outputs directory one level deep and
/// schedules each entry at its modification time plus the matching window.
/// Entries that are long overdue are removed by the first sweep. Missing
/// directories are skipped.
///
/// Returns the number of scheduled entries.
#[tracing::instrument(skip(queue, policy))]
pub async fn recover(
    queue: &RetentionQueue,
    uploads_dir: &Path,
    outputs_dir: &Path,
    policy: &RetentionPolicy,
) -> Result<usize> {
    let roots = [
        (uploads_dir.to_path_buf(), ResourceKind::SessionDir),
        (outputs_dir.to_path_buf(), ResourceKind::Artifact),
    ];

    let leftovers = tokio::task::spawn_blocking(move || {
        let mut found = Vec::new();
        for (root, kind) in roots {
            if !root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(Utc::now);
                found.push((kind, entry.into_path(), modified));
            }
        }
        found
    })
    .await?;

    let count = leftovers.len();
    for (kind, path, modified) in leftovers {
        queue
            .schedule(kind, path, modified + policy.window(kind))
            .await;
    }

    if count > 0 {
        tracing::info!(count, "Recovered leftover files from a previous run");
    }
    Ok(count)
}
