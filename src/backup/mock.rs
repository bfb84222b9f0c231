//! In-memory backup provider for deterministic testing
//!
//! Implements [`BackupProvider`] over backups described in code, with switches
//! for every failure the orchestration core has to tolerate. Interactions are
//! captured for later verification.
//!
//! # Example
//! ```no_run
//! use ibe::backup::mock::{MockBackup, MockProvider};
//!
//! let provider = MockProvider::new(vec![
//!     MockBackup::new("iPhone", "iPhone")
//!         .with_file("AppDomain-com.foo", "a.txt", b"0123456789".to_vec()),
//! ]);
//! ```

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    ArchiveSink, BackupError, BackupHandle, BackupProvider, BackupSource, DestinationPicker,
    Record,
};

/// Description of one fake backup
#[derive(Clone, Debug, Default)]
pub struct MockBackup {
    pub source: BackupSource,
    /// Password required before loading; `None` means unencrypted
    pub password: Option<String>,
    /// Records with their content
    pub files: Vec<(Record, Vec<u8>)>,
    /// Whether `open` should fail
    pub open_error: Option<String>,
    /// Whether `load` should fail
    pub load_error: Option<String>,
    /// Fail every n-th content open (1-based)
    pub fail_every_nth_read: Option<usize>,
    /// Record paths whose content stream errors after its last byte
    pub broken_streams: Vec<String>,
    /// Delay inside `load` (simulates decryption)
    pub load_delay: Duration,
}

impl MockBackup {
    pub fn new(device_name: &str, file_name: &str) -> Self {
        Self {
            source: BackupSource::new(device_name, file_name),
            ..Default::default()
        }
    }

    /// Require `password` before the backup can be loaded
    pub fn encrypted(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Add a record whose length is the content length
    pub fn with_file(mut self, domain: &str, path: &str, content: Vec<u8>) -> Self {
        let record = Record::new(domain, path, content.len() as u64);
        self.files.push((record, content));
        self
    }

    /// Add a record whose content stream fails once its bytes are read
    pub fn with_broken_file(self, domain: &str, path: &str, content: Vec<u8>) -> Self {
        let mut backup = self.with_file(domain, path, content);
        backup.broken_streams.push(path.to_string());
        backup
    }

    /// Add a zero-length directory record
    pub fn with_directory(mut self, domain: &str, path: &str) -> Self {
        self.files.push((Record::new(domain, path, 0), Vec::new()));
        self
    }

    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    pub fn failing_load(mut self, reason: &str) -> Self {
        self.load_error = Some(reason.to_string());
        self
    }

    pub fn failing_every_nth_read(mut self, n: usize) -> Self {
        self.fail_every_nth_read = Some(n);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }
}

/// Mock provider for testing
#[derive(Clone, Default)]
pub struct MockProvider {
    /// Shared between clones so a test can change what the next
    /// enumeration finds
    backups: Arc<Mutex<Vec<MockBackup>>>,
    enumerate_error: Option<String>,
    /// Paths passed to `open_content`, in call order
    content_opens: Arc<Mutex<Vec<String>>>,
    /// Number of completed `load` calls
    loads: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(backups: Vec<MockBackup>) -> Self {
        Self {
            backups: Arc::new(Mutex::new(backups)),
            ..Default::default()
        }
    }

    /// Replace the backups seen by later `enumerate` and `open` calls
    pub fn set_backups(&self, backups: Vec<MockBackup>) {
        *self.backups.lock() = backups;
    }

    /// Configure enumeration itself to fail
    pub fn failing(reason: &str) -> Self {
        Self {
            enumerate_error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn content_opens(&self) -> Vec<String> {
        self.content_opens.lock().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl BackupProvider for MockProvider {
    fn enumerate(&self) -> Result<Vec<BackupSource>, BackupError> {
        if let Some(reason) = &self.enumerate_error {
            return Err(BackupError::Enumerate(reason.clone()));
        }
        Ok(self.backups.lock().iter().map(|b| b.source.clone()).collect())
    }

    fn open(&self, source: &BackupSource) -> Result<Box<dyn BackupHandle>, BackupError> {
        let backups = self.backups.lock();
        let backup = backups
            .iter()
            .find(|b| b.source.file_name == source.file_name)
            .ok_or_else(|| BackupError::Open {
                id: source.file_name.clone(),
                reason: "no such backup".into(),
            })?;

        if let Some(reason) = &backup.open_error {
            return Err(BackupError::Open {
                id: source.file_name.clone(),
                reason: reason.clone(),
            });
        }

        Ok(Box::new(MockHandle {
            backup: backup.clone(),
            unlocked: backup.password.is_none(),
            records: Vec::new(),
            contents: HashMap::new(),
            reads: AtomicUsize::new(0),
            content_opens: self.content_opens.clone(),
            loads: self.loads.clone(),
        }))
    }
}

struct MockHandle {
    backup: MockBackup,
    unlocked: bool,
    records: Vec<Record>,
    contents: HashMap<String, Vec<u8>>,
    reads: AtomicUsize,
    content_opens: Arc<Mutex<Vec<String>>>,
    loads: Arc<AtomicUsize>,
}

impl BackupHandle for MockHandle {
    fn is_encrypted(&self) -> bool {
        self.backup.password.is_some()
    }

    fn set_password(&mut self, candidate: &str) -> Result<(), BackupError> {
        match &self.backup.password {
            Some(password) if password == candidate => {
                self.unlocked = true;
                Ok(())
            }
            Some(_) => Err(BackupError::WrongPassword),
            None => Ok(()),
        }
    }

    fn load(&mut self) -> Result<(), BackupError> {
        if !self.backup.load_delay.is_zero() {
            std::thread::sleep(self.backup.load_delay);
        }
        if !self.unlocked {
            return Err(BackupError::Load("backup is locked".into()));
        }
        if let Some(reason) = &self.backup.load_error {
            return Err(BackupError::Load(reason.clone()));
        }

        self.records = self.backup.files.iter().map(|(r, _)| r.clone()).collect();
        self.contents = self
            .backup
            .files
            .iter()
            .map(|(r, content)| (content_key(r), content.clone()))
            .collect();
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn records(&self) -> &[Record] {
        &self.records
    }

    fn open_content(&self, record: &Record) -> Result<Box<dyn Read + Send>, BackupError> {
        self.content_opens.lock().push(record.path.clone());
        let call = self.reads.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(n) = self.backup.fail_every_nth_read {
            if n > 0 && call % n == 0 {
                return Err(BackupError::Content {
                    path: record.path.clone(),
                    reason: "injected read failure".into(),
                });
            }
        }

        let content = self
            .contents
            .get(&content_key(record))
            .cloned()
            .ok_or_else(|| BackupError::Content {
                path: record.path.clone(),
                reason: "missing content".into(),
            })?;
        if self.backup.broken_streams.contains(&record.path) {
            return Ok(Box::new(Cursor::new(content).chain(BrokenStream)));
        }
        Ok(Box::new(Cursor::new(content)))
    }
}

struct BrokenStream;

impl Read for BrokenStream {
    fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "injected stream failure",
        ))
    }
}

fn content_key(record: &Record) -> String {
    format!("{}/{}", record.domain, record.path)
}

/// Picker that creates files inside a directory and remembers them
#[derive(Clone)]
pub struct MockPicker {
    dir: PathBuf,
    fail: bool,
    created: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockPicker {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fail: false,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure every `create_file` call to fail
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().clone()
    }
}

impl DestinationPicker for MockPicker {
    fn create_file(&self, suggested_name: &str) -> Result<Box<dyn ArchiveSink>, BackupError> {
        if self.fail {
            return Err(BackupError::Destination {
                name: suggested_name.to_string(),
                reason: "picker dismissed".into(),
            });
        }
        let path = self.dir.join(suggested_name);
        let file = std::fs::File::create(&path)?;
        self.created.lock().push(path);
        Ok(Box::new(file))
    }
}
