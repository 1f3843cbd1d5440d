//! # Scan Coordinator
//!
//! Reconciles the catalog with a directory tree of audio files.
//!
//! ## Overview
//!
//! The `ScanCoordinator` walks a root directory, extracts tags from every
//! audio file that is new or changed, writes the results to the catalog and
//! flags rows whose files have disappeared. Rows are never deleted by a scan.
//!
//! ## Workflow
//!
//! 1. Enumerate regular files under the root, keeping allowlisted extensions
//! 2. For each candidate, decide whether it needs extraction:
//!    - rows flagged missing are always re-extracted
//!    - in incremental mode, files whose mtime is not newer than
//!      `last_scanned` are skipped
//! 3. Extract concurrently (bounded by a semaphore) and upsert the results
//! 4. Flag every present row under the root whose file no longer exists
//! 5. Emit the completion event with aggregate counters
//!
//! A file that fails extraction is logged and left exactly as it was.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ScanCoordinator, ScanMode};
//! use tokio_util::sync::CancellationToken;
//!
//! let report = coordinator
//!     .reconcile(Path::new("/srv/music"), ScanMode::Incremental, CancellationToken::new())
//!     .await?;
//! println!("{} new, {} missing", report.newly_added, report.missing_count);
//! ```

use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::models::UpsertOutcome;
use core_library::repositories::MusicFileRepository;
use core_metadata::extractor::{TagExtractor, SUPPORTED_EXTENSIONS};
use core_runtime::config::ScanSettings;
use core_runtime::events::{CoreEvent, EventBus, ScanEvent};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, UNIX_EPOCH};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

/// Scan coordinator configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum number of files whose tags are read at the same time
    pub max_concurrent_extractions: usize,

    /// Audio file extensions to include, without the dot
    pub audio_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: ScanSettings::default().max_concurrent_extractions,
            audio_extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ScanConfig {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            max_concurrent_extractions: settings.max_concurrent_extractions,
            ..Self::default()
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.audio_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Only new, changed or reappeared files are extracted
    Incremental,
    /// Every candidate is extracted again
    Full,
}

/// Counters of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Allowlisted files found under the root
    pub files_scanned: u64,
    /// Successful catalog writes
    pub files_indexed: u64,
    pub newly_added: u64,
    pub updated: u64,
    /// Files skipped by the incremental mtime check
    pub unchanged: u64,
    /// Files whose extraction failed
    pub failed: u64,
    /// Rows newly flagged missing by this pass
    pub missing_count: u64,
    pub duration_ms: u64,
}

/// A file found by the walk
#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    /// Catalog key of the file
    key: String,
    /// Modification time in unix seconds, when the platform reports one
    modified: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Added,
    Updated,
    Unchanged,
    Failed,
    Cancelled,
}

/// Removes its root from the active set when the scan ends, however it ends.
struct ActiveScan {
    roots: Arc<Mutex<HashSet<PathBuf>>>,
    root: PathBuf,
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        lock(&self.roots).remove(&self.root);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives catalog reconciliation for one or more roots.
pub struct ScanCoordinator {
    config: ScanConfig,
    files: Arc<dyn MusicFileRepository>,
    extractor: Arc<dyn TagExtractor>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    /// Shared by all running scans so concurrent roots respect one bound
    extraction_slots: Arc<Semaphore>,
    active_scans: Arc<Mutex<HashSet<PathBuf>>>,
    path_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ScanCoordinator {
    pub fn new(
        config: ScanConfig,
        files: Arc<dyn MusicFileRepository>,
        extractor: Arc<dyn TagExtractor>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let slots = config.max_concurrent_extractions.max(1);
        Self {
            config,
            files,
            extractor,
            event_bus,
            clock,
            extraction_slots: Arc::new(Semaphore::new(slots)),
            active_scans: Arc::new(Mutex::new(HashSet::new())),
            path_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bring the catalog in line with the files under `root`.
    ///
    /// `root` is canonicalized once up front. The walk, the catalog keys and
    /// the prune prefix all use the canonical form, so different spellings of
    /// one directory index the same rows.
    ///
    /// # Errors
    ///
    /// - [`SyncError::RootNotFound`] if `root` is not a directory
    /// - [`SyncError::ScanInProgress`] if the same root is already being scanned
    /// - [`SyncError::Cancelled`] if `cancel` fires; writes made before that stay
    /// - [`SyncError::Library`] on storage failure
    #[instrument(skip(self, root, cancel), fields(root = %root.display()))]
    pub async fn reconcile(
        &self,
        root: &Path,
        mode: ScanMode,
        cancel: CancellationToken,
    ) -> Result<ScanReport> {
        let root_label = root.display().to_string();

        let root = match tokio::fs::canonicalize(root).await {
            Ok(canonical) => canonical,
            Err(_) => return Err(SyncError::RootNotFound { root: root_label }),
        };
        match tokio::fs::metadata(&root).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Err(SyncError::RootNotFound { root: root_label }),
        }

        let _active = self.begin_scan(&root)?;

        info!(?mode, canonical_root = %root.display(), "Starting scan");
        let started = Instant::now();
        self.emit(ScanEvent::Started {
            root: root_label.clone(),
            full: mode == ScanMode::Full,
        });

        match self.run_scan(&root, mode, &cancel).await {
            Ok(mut report) => {
                report.duration_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    files_scanned = report.files_scanned,
                    newly_added = report.newly_added,
                    updated = report.updated,
                    missing = report.missing_count,
                    duration_ms = report.duration_ms,
                    "Scan completed"
                );
                self.emit(ScanEvent::Completed {
                    root: root_label,
                    files_scanned: report.files_scanned,
                    files_indexed: report.files_indexed,
                    newly_added: report.newly_added,
                    updated: report.updated,
                    missing_count: report.missing_count,
                    duration_ms: report.duration_ms,
                });
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                info!("Scan cancelled");
                self.emit(ScanEvent::Cancelled { root: root_label });
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                error!(error = %e, "Scan failed");
                self.emit(ScanEvent::Failed {
                    root: root_label,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Whether a scan of `root` is running right now.
    pub async fn is_scanning(&self, root: &Path) -> bool {
        let key = Self::scan_key(root).await;
        lock(&self.active_scans).contains(&key)
    }

    /// `root` must already be canonical.
    fn begin_scan(&self, root: &Path) -> Result<ActiveScan> {
        let key = root.to_path_buf();
        let mut active = lock(&self.active_scans);
        if !active.insert(key.clone()) {
            warn!("Scan already in progress");
            return Err(SyncError::ScanInProgress {
                root: root.display().to_string(),
            });
        }
        Ok(ActiveScan {
            roots: Arc::clone(&self.active_scans),
            root: key,
        })
    }

    /// Spellings of the same directory share one key.
    async fn scan_key(root: &Path) -> PathBuf {
        tokio::fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf())
    }

    async fn run_scan(
        &self,
        root: &Path,
        mode: ScanMode,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        // Phase 1: Enumerate
        info!("Phase 1: Enumerating audio files");
        let candidates = self.enumerate(root, cancel).await?;
        let mut report = ScanReport {
            files_scanned: candidates.len() as u64,
            ..ScanReport::default()
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Phase 2: Extract and persist
        info!("Phase 2: Reconciling {} candidates", candidates.len());
        let mut outcomes = stream::iter(candidates)
            .map(|candidate| self.reconcile_file(candidate, mode, cancel))
            .buffer_unordered(self.config.max_concurrent_extractions.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                FileOutcome::Added => {
                    report.files_indexed += 1;
                    report.newly_added += 1;
                }
                FileOutcome::Updated => {
                    report.files_indexed += 1;
                    report.updated += 1;
                }
                FileOutcome::Unchanged => report.unchanged += 1,
                FileOutcome::Failed => report.failed += 1,
                FileOutcome::Cancelled => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Phase 3: Flag files that disappeared
        info!("Phase 3: Flagging missing files");
        report.missing_count = self.flag_missing(root, cancel).await?;

        Ok(report)
    }

    async fn enumerate(&self, root: &Path, cancel: &CancellationToken) -> Result<Vec<Candidate>> {
        let root = root.to_path_buf();
        let config = self.config.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let mut candidates = Vec::new();
            let walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();

            for entry in walker {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable directory entry");
                        continue;
                    }
                };

                if !entry.file_type().is_file() || !config.accepts(entry.path()) {
                    continue;
                }

                let Some(key) = entry.path().to_str().map(str::to_string) else {
                    warn!(path = %entry.path().display(), "Skipping path that is not valid UTF-8");
                    continue;
                };

                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .and_then(|d| i64::try_from(d.as_secs()).ok());

                candidates.push(Candidate {
                    path: entry.into_path(),
                    key,
                    modified,
                });
            }

            debug!(count = candidates.len(), "Enumeration finished");
            Ok(candidates)
        })
        .await
        .map_err(|e| SyncError::Walk(e.to_string()))?
    }

    async fn reconcile_file(
        &self,
        candidate: Candidate,
        mode: ScanMode,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        if cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }

        let path_lock = self.path_lock(&candidate.key);
        let outcome = {
            let _guard = path_lock.lock().await;
            self.reconcile_locked(&candidate, mode, cancel).await
        };
        drop(path_lock);
        self.release_path_lock(&candidate.key);

        outcome
    }

    async fn reconcile_locked(
        &self,
        candidate: &Candidate,
        mode: ScanMode,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        if let Some(existing) = self.files.find_by_path(&candidate.key).await? {
            if existing.missing {
                debug!(path = %candidate.key, "Missing file reappeared");
            } else if mode == ScanMode::Incremental
                && candidate
                    .modified
                    .is_some_and(|modified| modified <= existing.last_scanned)
            {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let extracted = {
            let _permit = self
                .extraction_slots
                .acquire()
                .await
                .map_err(|_| SyncError::Cancelled)?;

            tokio::select! {
                _ = cancel.cancelled() => return Ok(FileOutcome::Cancelled),
                result = self.extractor.extract(&candidate.path) => result,
            }
        };

        let metadata = match extracted {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %candidate.key, error = %e, "Metadata extraction failed, file left untouched");
                self.emit(ScanEvent::FileSkipped {
                    path: candidate.key.clone(),
                    reason: e.to_string(),
                });
                return Ok(FileOutcome::Failed);
            }
        };

        let file = metadata.into_new_music_file(candidate.key.clone());
        let outcome = match self.files.upsert(&file, self.clock.unix_timestamp()).await? {
            UpsertOutcome::Inserted(id) => {
                debug!(id, path = %candidate.key, "Indexed new file");
                FileOutcome::Added
            }
            UpsertOutcome::Updated(id) => {
                debug!(id, path = %candidate.key, "Re-indexed file");
                FileOutcome::Updated
            }
        };

        Ok(outcome)
    }

    async fn flag_missing(&self, root: &Path, cancel: &CancellationToken) -> Result<u64> {
        let present = self.files.present_under(&root_prefix(root)).await?;
        let mut flagged = 0;

        for (id, path) in present {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            // Errors other than "not found" (permissions, I/O) do not flag.
            if matches!(tokio::fs::try_exists(&path).await, Ok(false)) {
                let path_lock = self.path_lock(&path);
                {
                    let _guard = path_lock.lock().await;
                    self.files.mark_missing(id, self.clock.unix_timestamp()).await?;
                }
                drop(path_lock);
                self.release_path_lock(&path);

                debug!(id, path = %path, "Flagged missing");
                flagged += 1;
            }
        }

        Ok(flagged)
    }

    fn path_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = lock(&self.path_locks);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn release_path_lock(&self, key: &str) {
        let mut locks = lock(&self.path_locks);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    fn emit(&self, event: ScanEvent) {
        self.event_bus.emit(CoreEvent::Scan(event)).ok();
    }
}

/// `root` with exactly one trailing separator, so `/music` does not match
/// `/music2/...`.
fn root_prefix(root: &Path) -> String {
    let mut prefix = root.to_string_lossy().into_owned();
    if !prefix.ends_with(MAIN_SEPARATOR) {
        prefix.push(MAIN_SEPARATOR);
    }
    prefix
}
