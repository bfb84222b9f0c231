//! Export engine: stream one app's records into a stored zip archive
//!
//! Entries are written with the store method. Backup content is usually
//! already compressed or encrypted at rest, so deflating it only burns CPU.

pub mod naming;

use std::io::{self, Read, Seek, Write};

use chrono::NaiveDate;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::backup::{BackupError, BackupHandle, BackupSource, Record};
use crate::config::ExportConfig;
use crate::dispatch::WorkerError;

pub use naming::{archive_file_name, entry_name, export_folder_name};

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create archive entry {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Failed to write archive entry {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to finalize archive: {0}")]
    Finish(#[source] zip::result::ZipError),
    #[error("Failed to flush archive: {0}")]
    Flush(#[from] io::Error),
    #[error(transparent)]
    Destination(#[from] BackupError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Everything an export needs, frozen when the export is requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    /// Record domain to export (`prefix + app`)
    pub domain: String,
    /// Top-level folder inside the archive
    pub folder: String,
    /// Matching record count at request time, the progress denominator
    pub expected_files: usize,
    /// Records between two progress updates
    pub progress_interval: usize,
}

impl ExportPlan {
    pub fn new(
        config: &ExportConfig,
        source: &BackupSource,
        app: &str,
        expected_files: usize,
        date: NaiveDate,
    ) -> Self {
        Self {
            domain: format!("{}{}", config.domain_prefix, app),
            folder: export_folder_name(
                &source.file_name,
                config.name_prefix_len,
                date,
                &config.date_format,
            ),
            expected_files,
            progress_interval: config.progress_interval.max(1),
        }
    }

    /// Suggested name for the destination file
    pub fn archive_name(&self) -> String {
        archive_file_name(&self.folder)
    }

    fn selects(&self, record: &Record) -> bool {
        record.domain == self.domain && record.length > 0
    }

    /// Approximate completion after `processed` records
    pub fn percent(&self, processed: usize) -> u8 {
        if self.expected_files == 0 {
            return 100;
        }
        (processed.saturating_mul(100) / self.expected_files).min(100) as u8
    }
}

/// Outcome of a finished export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub bytes_written: u64,
    pub files_written: usize,
    /// Records whose content could not be opened
    pub skipped: usize,
    /// Records whose content stream failed part-way
    pub truncated: usize,
}

/// Write every selected record of `handle` into a new archive on `sink`.
///
/// `on_progress` is called with the completion percent every
/// `plan.progress_interval` records. Unreadable records are logged and
/// skipped; entry creation and finalize failures abort the export.
pub fn write_archive<W, P>(
    handle: &dyn BackupHandle,
    plan: &ExportPlan,
    sink: W,
    mut on_progress: P,
) -> Result<ExportSummary, ExportError>
where
    W: Write + Seek,
    P: FnMut(u8),
{
    let mut zip = ZipWriter::new(sink);
    let mut summary = ExportSummary::default();
    let mut processed = 0usize;

    for record in handle.records().iter().filter(|r| plan.selects(r)) {
        match handle.open_content(record) {
            Ok(mut reader) => {
                let name = entry_name(&plan.folder, &record.path);
                let options = FileOptions::default()
                    .compression_method(CompressionMethod::Stored)
                    .large_file(record.length >= u64::from(u32::MAX));

                zip.start_file(name.clone(), options)
                    .map_err(|source| ExportError::Entry {
                        path: name.clone(),
                        source,
                    })?;

                let copied = copy_content(&mut reader, &mut zip)
                    .map_err(|source| ExportError::Write { path: name, source })?;
                summary.bytes_written += copied.bytes;
                if let Some(e) = copied.read_error {
                    tracing::warn!(path = %record.path, error = %e, "Record content truncated");
                    summary.truncated += 1;
                }
                summary.files_written += 1;
            }
            Err(e) => {
                tracing::warn!(path = %record.path, error = %e, "Skipping unreadable record");
                summary.skipped += 1;
            }
        }

        processed += 1;
        if processed % plan.progress_interval == 0 {
            on_progress(plan.percent(processed));
        }
    }

    let mut sink = zip.finish().map_err(ExportError::Finish)?;
    sink.flush()?;

    tracing::info!(
        folder = %plan.folder,
        bytes = summary.bytes_written,
        files = summary.files_written,
        skipped = summary.skipped,
        "Wrote archive"
    );
    Ok(summary)
}

struct Copied {
    bytes: u64,
    /// Content stream failed part-way; what was read so far is in the entry
    read_error: Option<io::Error>,
}

/// Copy a record's content into the current entry.
///
/// Read errors end the entry early and are returned as data; write errors
/// are returned as `Err`.
fn copy_content<R, W>(reader: &mut R, writer: &mut W) -> io::Result<Copied>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Ok(Copied {
                    bytes,
                    read_error: Some(e),
                })
            }
        };
        writer.write_all(&buf[..n])?;
        bytes += n as u64;
    }

    Ok(Copied {
        bytes,
        read_error: None,
    })
}
