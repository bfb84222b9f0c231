//! Backup discovery at startup
//!
//! One worker enumerates every backup, opens each one and loads the
//! unencrypted ones. The whole batch is reported in a single command so the
//! list goes from "loading" to fully populated in one step.

use std::sync::Arc;

use crate::backup::{BackupError, BackupHandle, BackupProvider, BackupSource};
use crate::dispatch::Dispatcher;
use crate::state::AppState;

/// Outcome of discovering one backup
pub enum Discovered {
    /// `open` failed
    OpenFailed {
        source: BackupSource,
        error: BackupError,
    },
    /// Encrypted; waiting for a password
    Locked {
        source: BackupSource,
        handle: Box<dyn BackupHandle>,
    },
    /// Unencrypted and loaded
    Loaded {
        source: BackupSource,
        handle: Box<dyn BackupHandle>,
    },
    /// Unencrypted but `load` failed
    LoadFailed {
        source: BackupSource,
        handle: Box<dyn BackupHandle>,
        error: BackupError,
    },
}

/// Enumerate and open every backup. Blocking.
pub fn discover(provider: &dyn BackupProvider) -> Result<Vec<Discovered>, BackupError> {
    let sources = provider.enumerate()?;
    tracing::info!(count = sources.len(), "Enumerated backups");

    let discovered = sources
        .into_iter()
        .map(|source| discover_one(provider, source))
        .collect();
    Ok(discovered)
}

fn discover_one(provider: &dyn BackupProvider, source: BackupSource) -> Discovered {
    let mut handle = match provider.open(&source) {
        Ok(handle) => handle,
        Err(error) => {
            tracing::warn!(backup = %source.file_name, error = %error, "Failed to open backup");
            return Discovered::OpenFailed { source, error };
        }
    };

    if handle.is_encrypted() {
        tracing::debug!(backup = %source.file_name, "Backup is encrypted");
        return Discovered::Locked { source, handle };
    }

    match handle.load() {
        Ok(()) => Discovered::Loaded { source, handle },
        Err(error) => {
            tracing::warn!(backup = %source.file_name, error = %error, "Failed to load backup");
            Discovered::LoadFailed {
                source,
                handle,
                error,
            }
        }
    }
}

/// Run discovery on a worker and deliver the batch to `AppState`, tagged
/// with the list generation it was started for
pub fn spawn_enumeration(
    dispatcher: &Dispatcher<AppState>,
    provider: Arc<dyn BackupProvider>,
    generation: u64,
) {
    dispatcher.spawn(
        "enumerate",
        move |_| discover(provider.as_ref()),
        move |state, outcome| state.apply_discovery(generation, outcome),
    );
}
