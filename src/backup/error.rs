use thiserror::Error;

/// Failures reported by the backup-reading collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    #[error("Failed to enumerate backups: {0}")]
    Enumerate(String),
    #[error("Failed to open backup {id}: {reason}")]
    Open { id: String, reason: String },
    #[error("Wrong password")]
    WrongPassword,
    #[error("Failed to load backup: {0}")]
    Load(String),
    #[error("Failed to read {path}: {reason}")]
    Content { path: String, reason: String },
    #[error("Failed to create destination file {name}: {reason}")]
    Destination { name: String, reason: String },
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::Io(err.to_string())
    }
}
