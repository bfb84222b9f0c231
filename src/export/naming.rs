//! Names of export folders, archives and archive entries

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;

const FALLBACK_DATE_FORMAT: &str = "%Y%m%d";

/// Top-level folder of an export: a short prefix of the backup identifier
/// plus the export date, e.g. `00008030-20240101`.
pub fn export_folder_name(
    identifier: &str,
    prefix_len: usize,
    date: NaiveDate,
    date_format: &str,
) -> String {
    let prefix: String = identifier
        .chars()
        .take(prefix_len)
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    let format = if is_valid_date_format(date_format) {
        date_format
    } else {
        tracing::warn!(format = date_format, "Invalid date format, using default");
        FALLBACK_DATE_FORMAT
    };

    format!("{}-{}", prefix, date.format(format))
}

/// Suggested destination file name for an export folder
pub fn archive_file_name(folder: &str) -> String {
    format!("{folder}.zip")
}

/// Entry path inside the archive: `<folder>/<record path>`, with the record
/// path normalized so it can never climb out of the folder.
pub fn entry_name(folder: &str, record_path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in record_path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        return folder.to_string();
    }
    format!("{}/{}", folder, parts.join("/"))
}

fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}
