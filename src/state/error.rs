use thiserror::Error;

/// A user operation that was refused without touching state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("No backup at index {0}")]
    UnknownItem(usize),
    #[error("Backup is not encrypted")]
    NotEncrypted,
    #[error("Backup is already loaded")]
    AlreadyLoaded,
    #[error("Backup is busy loading")]
    Busy,
    #[error("Backup is not loaded")]
    NotLoaded,
    #[error("Export already running")]
    ExportAlreadyRunning,
    #[error("No files for the selected app")]
    NothingToExport,
    #[error("App identifier must not be empty")]
    EmptyFilter,
    #[error("No destination picker configured")]
    NoDestination,
}
