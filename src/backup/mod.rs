//! Contract with the backup-reading library and the destination picker
//!
//! Nothing in this crate parses a backup on disk. Enumeration, manifest and
//! keybag decryption, record listing and per-file decryption all live behind
//! [`BackupProvider`] and [`BackupHandle`].

pub mod error;
pub mod mock;

use std::io::{Read, Seek, Write};

pub use error::BackupError;

/// One discovered backup
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BackupSource {
    /// Device name as recorded in the backup
    pub device_name: String,
    /// Backup identifier (directory name of the backup)
    pub file_name: String,
}

impl BackupSource {
    pub fn new(device_name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            file_name: file_name.into(),
        }
    }

    /// Label shown next to each backup, "device - identifier"
    pub fn label(&self) -> String {
        format!("{} - {}", self.device_name, self.file_name)
    }
}

/// One logical file entry inside a loaded backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub domain: String,
    /// Path relative to the domain root
    pub path: String,
    /// Content length in bytes; zero for directories and placeholders
    pub length: u64,
}

impl Record {
    pub fn new(domain: impl Into<String>, path: impl Into<String>, length: u64) -> Self {
        Self {
            domain: domain.into(),
            path: path.into(),
            length,
        }
    }
}

/// Discovers and opens backups
pub trait BackupProvider: Send + Sync {
    /// List every discoverable backup
    fn enumerate(&self) -> Result<Vec<BackupSource>, BackupError>;

    /// Open the backup identified by `source.file_name`
    fn open(&self, source: &BackupSource) -> Result<Box<dyn BackupHandle>, BackupError>;
}

/// An opened backup
///
/// The mutating calls are only ever made by the single owner of the handle.
/// Once loaded, the handle is shared read-only between the event loop and at
/// most one export worker.
pub trait BackupHandle: Send + Sync {
    fn is_encrypted(&self) -> bool;

    /// Apply a candidate password. Local and cheap.
    fn set_password(&mut self, candidate: &str) -> Result<(), BackupError>;

    /// Decrypt the manifest and read the record list. May be slow.
    fn load(&mut self) -> Result<(), BackupError>;

    /// Records in manifest order; empty until loaded
    fn records(&self) -> &[Record];

    /// Open the decrypted content of one record
    fn open_content(&self, record: &Record) -> Result<Box<dyn Read + Send>, BackupError>;
}

/// Writable, seekable destination for an archive
pub trait ArchiveSink: Write + Seek + Send {}

impl<T: Write + Seek + Send> ArchiveSink for T {}

/// Creates destination files on explicit user request
pub trait DestinationPicker: Send + Sync {
    fn create_file(&self, suggested_name: &str) -> Result<Box<dyn ArchiveSink>, BackupError>;
}
