//! Per-backup state machine

use std::sync::Arc;

use crate::backup::{BackupError, BackupHandle, BackupSource, Record};
use crate::export::ExportSummary;

use super::error::ActionError;

/// Load progress of one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    LoadFailed(String),
}

/// Export progress of one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Idle,
    Exporting { percent: u8 },
    Exported(ExportSummary),
    ExportFailed(String),
}

impl ExportStatus {
    pub fn is_exporting(&self) -> bool {
        matches!(self, ExportStatus::Exporting { .. })
    }
}

/// Matching file count and size for one app
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub files: usize,
    pub total_bytes: u64,
}

impl FileStats {
    /// Count records whose domain equals `domain` exactly
    pub fn collect(records: &[Record], domain: &str) -> Self {
        records
            .iter()
            .filter(|r| r.domain == domain)
            .fold(FileStats::default(), |acc, r| FileStats {
                files: acc.files + 1,
                total_bytes: acc.total_bytes + r.length,
            })
    }
}

/// Who holds the backup handle
enum HandleSlot {
    /// Never opened, or lost with a crashed worker
    Closed,
    /// Opened, owned here, not loaded
    Idle(Box<dyn BackupHandle>),
    /// Moved to a load worker
    InFlight,
    /// Loaded; shared read-only with export workers
    Shared(Arc<dyn BackupHandle>),
}

/// UI-relevant state of one discovered backup.
///
/// Only ever mutated by commands running on the event loop.
pub struct BackupItem {
    source: BackupSource,
    slot: HandleSlot,
    encrypted: bool,
    load: LoadStatus,
    export: ExportStatus,
    password_error: Option<String>,
    stats: FileStats,
}

impl BackupItem {
    fn new(source: BackupSource, slot: HandleSlot, encrypted: bool, load: LoadStatus) -> Self {
        Self {
            source,
            slot,
            encrypted,
            load,
            export: ExportStatus::Idle,
            password_error: None,
            stats: FileStats::default(),
        }
    }

    /// Opening the handle failed
    pub(crate) fn open_failed(source: BackupSource, error: &BackupError) -> Self {
        Self::new(
            source,
            HandleSlot::Closed,
            false,
            LoadStatus::LoadFailed(error.to_string()),
        )
    }

    /// Encrypted backup waiting for its password
    pub(crate) fn locked(source: BackupSource, handle: Box<dyn BackupHandle>) -> Self {
        Self::new(source, HandleSlot::Idle(handle), true, LoadStatus::NotLoaded)
    }

    /// Backup whose handle finished loading
    pub(crate) fn loaded(source: BackupSource, handle: Box<dyn BackupHandle>, domain: &str) -> Self {
        let encrypted = handle.is_encrypted();
        let mut item = Self::new(source, HandleSlot::InFlight, encrypted, LoadStatus::Loading);
        item.finish_load(handle, Ok(()), domain);
        item
    }

    /// Backup whose load failed; the handle is kept
    pub(crate) fn load_failed(
        source: BackupSource,
        handle: Box<dyn BackupHandle>,
        error: &BackupError,
    ) -> Self {
        let encrypted = handle.is_encrypted();
        Self::new(
            source,
            HandleSlot::Idle(handle),
            encrypted,
            LoadStatus::LoadFailed(error.to_string()),
        )
    }

    pub fn source(&self) -> &BackupSource {
        &self.source
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load
    }

    pub fn export_status(&self) -> &ExportStatus {
        &self.export
    }

    pub fn password_error(&self) -> Option<&str> {
        self.password_error.as_deref()
    }

    /// Encrypted and still waiting for a correct password
    pub fn is_awaiting_password(&self) -> bool {
        self.encrypted && self.load == LoadStatus::NotLoaded
    }

    pub fn is_loaded(&self) -> bool {
        self.load == LoadStatus::Loaded
    }

    /// Matching files for the current app; zero unless loaded
    pub fn file_count(&self) -> usize {
        self.stats.files
    }

    /// Matching bytes for the current app; zero unless loaded
    pub fn total_bytes(&self) -> u64 {
        self.stats.total_bytes
    }

    pub fn stats(&self) -> FileStats {
        self.stats
    }

    /// Apply a candidate password to the idle handle.
    ///
    /// Returns `Ok(false)` and records the error when the password is wrong.
    pub(crate) fn apply_password(&mut self, candidate: &str) -> Result<bool, ActionError> {
        if !self.encrypted {
            return Err(ActionError::NotEncrypted);
        }
        let handle = match &mut self.slot {
            HandleSlot::Idle(handle) => handle,
            HandleSlot::InFlight => return Err(ActionError::Busy),
            HandleSlot::Shared(_) => return Err(ActionError::AlreadyLoaded),
            HandleSlot::Closed => return Err(ActionError::NotLoaded),
        };

        match handle.set_password(candidate) {
            Ok(()) => {
                self.password_error = None;
                Ok(true)
            }
            Err(e) => {
                self.password_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    /// Move the handle out for a load worker
    pub(crate) fn begin_load(&mut self) -> Option<Box<dyn BackupHandle>> {
        match std::mem::replace(&mut self.slot, HandleSlot::InFlight) {
            HandleSlot::Idle(handle) => {
                self.load = LoadStatus::Loading;
                Some(handle)
            }
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// Take the handle back from a load worker
    pub(crate) fn finish_load(
        &mut self,
        handle: Box<dyn BackupHandle>,
        result: Result<(), BackupError>,
        domain: &str,
    ) {
        match result {
            Ok(()) => {
                self.slot = HandleSlot::Shared(Arc::from(handle));
                self.load = LoadStatus::Loaded;
                self.recompute(domain);
            }
            Err(e) => {
                self.slot = HandleSlot::Idle(handle);
                self.load = LoadStatus::LoadFailed(e.to_string());
            }
        }
    }

    /// The load worker died with the handle
    pub(crate) fn load_lost(&mut self, reason: String) {
        self.slot = HandleSlot::Closed;
        self.load = LoadStatus::LoadFailed(reason);
    }

    /// Recompute statistics for `domain`; no-op unless loaded
    pub(crate) fn recompute(&mut self, domain: &str) {
        if let (LoadStatus::Loaded, HandleSlot::Shared(handle)) = (&self.load, &self.slot) {
            self.stats = FileStats::collect(handle.records(), domain);
        }
    }

    /// Enter Exporting and hand out the loaded handle
    pub(crate) fn begin_export(&mut self) -> Result<Arc<dyn BackupHandle>, ActionError> {
        let handle = match (&self.load, &self.slot) {
            (LoadStatus::Loaded, HandleSlot::Shared(handle)) => handle.clone(),
            _ => return Err(ActionError::NotLoaded),
        };
        if self.export.is_exporting() {
            return Err(ActionError::ExportAlreadyRunning);
        }
        if self.stats.files == 0 {
            return Err(ActionError::NothingToExport);
        }

        self.export = ExportStatus::Exporting { percent: 0 };
        Ok(handle)
    }

    /// Progress never moves backwards within one run
    pub(crate) fn export_progress(&mut self, percent: u8) {
        if let ExportStatus::Exporting { percent: current } = &mut self.export {
            *current = (*current).max(percent.min(100));
        }
    }

    pub(crate) fn finish_export(&mut self, result: Result<ExportSummary, String>) {
        if !self.export.is_exporting() {
            return;
        }
        self.export = match result {
            Ok(summary) => ExportStatus::Exported(summary),
            Err(e) => ExportStatus::ExportFailed(e),
        };
    }
}

impl std::fmt::Debug for BackupItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupItem")
            .field("source", &self.source)
            .field("encrypted", &self.encrypted)
            .field("load", &self.load)
            .field("export", &self.export)
            .field("stats", &self.stats)
            .finish()
    }
}
