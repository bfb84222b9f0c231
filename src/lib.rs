pub mod app;
pub mod backup;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod orchestrator;
pub mod queue;
pub mod state;
pub mod util;

pub use app::{App, Presenter, UiEvent, UserAction};
pub use backup::{
    ArchiveSink, BackupError, BackupHandle, BackupProvider, BackupSource, DestinationPicker,
    Record,
};
pub use config::Config;
pub use export::{ExportError, ExportPlan, ExportSummary};
pub use queue::{CommandReceiver, UpdateQueue};
pub use state::{
    ActionError, AppState, BackupItem, ExportStatus, ItemId, LoadStatus, Phase, Unlock,
};
