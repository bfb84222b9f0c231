//! Application state and the user operations that drive it
//!
//! Everything here runs on the event loop. Workers never touch `AppState`
//! directly; they queue commands that call back into it.

mod error;
mod item;

use std::sync::Arc;

use crate::backup::{ArchiveSink, BackupError, BackupHandle, BackupProvider, DestinationPicker};
use crate::config::Config;
use crate::dispatch::{Dispatcher, WorkerError};
use crate::export::{write_archive, ExportError, ExportPlan, ExportSummary};
use crate::orchestrator::{self, Discovered};

pub use error::ActionError;
pub use item::{BackupItem, ExportStatus, FileStats, LoadStatus};

/// Index of a backup in [`AppState::items`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub usize);

/// Startup enumeration progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Enumerating,
    /// Enumeration finished; an empty list means no backups were found
    Ready,
    Failed(String),
}

/// Result of an unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlock {
    /// Empty password, nothing attempted
    Ignored,
    /// Wrong password, see [`BackupItem::password_error`]
    Rejected,
    /// Password accepted, load dispatched
    Loading,
}

/// Where an export writes its archive
enum Destination {
    Sink(Box<dyn ArchiveSink>),
    Picker(Arc<dyn DestinationPicker>),
}

impl Destination {
    fn open(self, suggested_name: &str) -> Result<Box<dyn ArchiveSink>, BackupError> {
        match self {
            Destination::Sink(sink) => Ok(sink),
            Destination::Picker(picker) => picker.create_file(suggested_name),
        }
    }
}

pub struct AppState {
    config: Config,
    dispatcher: Dispatcher<AppState>,
    provider: Arc<dyn BackupProvider>,
    picker: Option<Arc<dyn DestinationPicker>>,
    /// Selected bundle identifier. Written only by `set_filter`.
    filter: String,
    phase: Phase,
    items: Vec<BackupItem>,
    /// Bumped whenever `items` is replaced. Worker reports carry the value
    /// they were dispatched under and are dropped when it no longer matches.
    generation: u64,
    notice: Option<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        dispatcher: Dispatcher<AppState>,
        provider: Arc<dyn BackupProvider>,
        picker: Option<Arc<dyn DestinationPicker>>,
    ) -> Self {
        let filter = config.default_app.clone();
        Self {
            config,
            dispatcher,
            provider,
            picker,
            filter,
            phase: Phase::Enumerating,
            items: Vec::new(),
            generation: 0,
            notice: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn items(&self) -> &[BackupItem] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&BackupItem> {
        self.items.get(id.0)
    }

    /// Currently selected bundle identifier
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Record domain selected by the current filter
    pub fn domain(&self) -> String {
        format!("{}{}", self.config.export.domain_prefix, self.filter)
    }

    /// Last rejected user action, for display
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut BackupItem, ActionError> {
        self.items
            .get_mut(id.0)
            .ok_or(ActionError::UnknownItem(id.0))
    }

    /// Item a worker report refers to, unless the list was replaced since
    fn reported_item(&mut self, id: ItemId, generation: u64) -> Option<&mut BackupItem> {
        if generation != self.generation {
            tracing::debug!(item = id.0, generation, "Dropping report for a replaced backup list");
            return None;
        }
        self.items.get_mut(id.0)
    }

    /// Kick off backup discovery.
    ///
    /// Replaces the current list; loads and exports still running for the
    /// old list finish on their own but no longer update any item.
    pub fn start_enumeration(&mut self) {
        self.generation += 1;
        self.phase = Phase::Enumerating;
        self.items.clear();
        orchestrator::spawn_enumeration(&self.dispatcher, self.provider.clone(), self.generation);
    }

    /// Install the discovery batch
    pub(crate) fn apply_discovery(
        &mut self,
        generation: u64,
        outcome: Result<Result<Vec<Discovered>, BackupError>, WorkerError>,
    ) {
        if generation != self.generation {
            tracing::debug!(generation, "Dropping superseded discovery batch");
            return;
        }
        let discovered = match outcome {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(e)) => return self.fail_enumeration(e.to_string()),
            Err(e) => return self.fail_enumeration(e.to_string()),
        };

        let domain = self.domain();
        self.items = discovered
            .into_iter()
            .map(|d| match d {
                Discovered::OpenFailed { source, error } => BackupItem::open_failed(source, &error),
                Discovered::Locked { source, handle } => BackupItem::locked(source, handle),
                Discovered::Loaded { source, handle } => BackupItem::loaded(source, handle, &domain),
                Discovered::LoadFailed {
                    source,
                    handle,
                    error,
                } => BackupItem::load_failed(source, handle, &error),
            })
            .collect();
        self.phase = Phase::Ready;
        tracing::info!(count = self.items.len(), "Backups ready");
    }

    fn fail_enumeration(&mut self, message: String) {
        tracing::error!(error = %message, "Backup enumeration failed");
        self.items.clear();
        self.phase = Phase::Failed(message);
    }

    /// Select another app and recompute statistics of every loaded backup.
    ///
    /// Returns `Ok(false)` when the value is unchanged.
    pub fn set_filter(&mut self, app: &str) -> Result<bool, ActionError> {
        if app.is_empty() {
            return Err(ActionError::EmptyFilter);
        }
        if app == self.filter {
            return Ok(false);
        }

        self.filter = app.to_string();
        let domain = self.domain();
        for item in &mut self.items {
            item.recompute(&domain);
        }
        tracing::info!(app, "Selected app changed");
        Ok(true)
    }

    /// Try `password` on an encrypted backup and load it on success
    pub fn unlock(&mut self, id: ItemId, password: &str) -> Result<Unlock, ActionError> {
        if password.is_empty() {
            return Ok(Unlock::Ignored);
        }

        let item = self.item_mut(id)?;
        if !item.apply_password(password)? {
            tracing::info!(backup = %item.source().file_name, "Wrong password");
            return Ok(Unlock::Rejected);
        }
        let handle = item.begin_load().ok_or(ActionError::Busy)?;

        let generation = self.generation;
        self.dispatcher.spawn(
            "load",
            move |_| load_handle(handle),
            move |state, outcome| state.finish_load(id, generation, outcome),
        );
        Ok(Unlock::Loading)
    }

    fn finish_load(
        &mut self,
        id: ItemId,
        generation: u64,
        outcome: Result<(Box<dyn BackupHandle>, Result<(), BackupError>), WorkerError>,
    ) {
        // Stats use the filter in effect now, not when the load started
        let domain = self.domain();
        let Some(item) = self.reported_item(id, generation) else {
            return;
        };
        match outcome {
            Ok((handle, result)) => {
                if let Err(e) = &result {
                    tracing::warn!(backup = %item.source().file_name, error = %e, "Load failed");
                }
                item.finish_load(handle, result, &domain);
            }
            Err(e) => item.load_lost(e.to_string()),
        }
    }

    /// Export the selected app of a loaded backup through the configured
    /// destination picker
    pub fn export(&mut self, id: ItemId) -> Result<(), ActionError> {
        let picker = self.picker.clone().ok_or(ActionError::NoDestination)?;
        self.start_export(id, Destination::Picker(picker))
    }

    /// Export the selected app of a loaded backup into `sink`
    pub fn export_to(&mut self, id: ItemId, sink: Box<dyn ArchiveSink>) -> Result<(), ActionError> {
        self.start_export(id, Destination::Sink(sink))
    }

    fn start_export(&mut self, id: ItemId, destination: Destination) -> Result<(), ActionError> {
        let item = self.items.get_mut(id.0).ok_or(ActionError::UnknownItem(id.0))?;
        let handle = item.begin_export()?;

        let plan = ExportPlan::new(
            &self.config.export,
            item.source(),
            &self.filter,
            item.file_count(),
            chrono::Local::now().date_naive(),
        );
        tracing::info!(
            backup = %item.source().file_name,
            folder = %plan.folder,
            files = plan.expected_files,
            "Export started"
        );

        let generation = self.generation;
        self.dispatcher.spawn(
            "export",
            move |queue| -> Result<ExportSummary, ExportError> {
                let sink = destination.open(&plan.archive_name())?;
                write_archive(handle.as_ref(), &plan, sink, |percent| {
                    queue.send(move |state: &mut AppState| {
                        state.export_progress(id, generation, percent)
                    });
                })
            },
            move |state, outcome| state.finish_export(id, generation, outcome),
        );
        Ok(())
    }

    fn export_progress(&mut self, id: ItemId, generation: u64, percent: u8) {
        if let Some(item) = self.reported_item(id, generation) {
            item.export_progress(percent);
        }
    }

    fn finish_export(
        &mut self,
        id: ItemId,
        generation: u64,
        outcome: Result<Result<ExportSummary, ExportError>, WorkerError>,
    ) {
        let Some(item) = self.reported_item(id, generation) else {
            return;
        };
        let result = match outcome {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ExportError::from(e)),
        };
        match &result {
            Ok(summary) => tracing::info!(
                backup = %item.source().file_name,
                bytes = summary.bytes_written,
                "Export finished"
            ),
            Err(e) => tracing::error!(
                backup = %item.source().file_name,
                error = %e,
                "Export failed"
            ),
        }
        item.finish_export(result.map_err(|e| e.to_string()));
    }
}

fn load_handle(
    mut handle: Box<dyn BackupHandle>,
) -> (Box<dyn BackupHandle>, Result<(), BackupError>) {
    let result = handle.load();
    (handle, result)
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("filter", &self.filter)
            .field("phase", &self.phase)
            .field("items", &self.items)
            .field("notice", &self.notice)
            .finish()
    }
}
