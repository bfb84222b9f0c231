//! Event loop: the single consumer of the update queue
//!
//! Drains queued commands, applies user actions and asks the presenter to
//! redraw. Everything that writes [`AppState`] happens on this loop.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::backup::{BackupProvider, DestinationPicker};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::queue::{self, CommandReceiver};
use crate::state::{ActionError, AppState, ItemId};

/// User requests coming from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Select another app by bundle identifier
    SetFilter(String),
    /// Try a password on an encrypted backup
    Unlock { item: ItemId, password: String },
    /// Export the selected app through the destination picker
    Export { item: ItemId },
}

/// Events from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Redraw request (window exposed, resized, ...)
    Frame,
    /// User request
    Action(UserAction),
    /// Window destroyed; an error message ends the loop with `Err`
    Destroy(Option<String>),
}

/// Renders state; called on the event loop after every change
pub trait Presenter {
    fn render(&mut self, state: &AppState);
}

/// Main application state
pub struct App {
    state: AppState,
    /// Command queue consumer
    commands: CommandReceiver<AppState>,
    /// Event channel sender
    event_tx: mpsc::UnboundedSender<UiEvent>,
    /// Event channel receiver
    event_rx: mpsc::UnboundedReceiver<UiEvent>,
}

impl App {
    /// Create the app on the current tokio runtime
    pub fn new(
        config: Config,
        provider: Arc<dyn BackupProvider>,
        picker: Option<Arc<dyn DestinationPicker>>,
    ) -> Self {
        Self::with_runtime(config, provider, picker, Handle::current())
    }

    pub fn with_runtime(
        config: Config,
        provider: Arc<dyn BackupProvider>,
        picker: Option<Arc<dyn DestinationPicker>>,
        runtime: Handle,
    ) -> Self {
        let (queue, commands) = queue::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(queue, runtime);

        Self {
            state: AppState::new(config, dispatcher, provider, picker),
            commands,
            event_tx,
            event_rx,
        }
    }

    /// Sender the presentation layer uses to reach the loop
    pub fn events(&self) -> mpsc::UnboundedSender<UiEvent> {
        self.event_tx.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Direct access for callers already on the loop
    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    /// Start backup discovery
    pub fn start(&mut self) {
        self.state.start_enumeration();
    }

    /// Run every queued command without waiting
    pub fn process_pending(&mut self) -> usize {
        self.commands.drain_and_run(&mut self.state)
    }

    /// Wait for at least one command, then run everything queued
    pub async fn next_batch(&mut self) -> usize {
        match self.commands.recv().await {
            Some(cmd) => {
                cmd(&mut self.state);
                1 + self.commands.drain_and_run(&mut self.state)
            }
            None => 0,
        }
    }

    /// Start discovery and run until the presentation layer is destroyed
    pub async fn run<P: Presenter>(&mut self, presenter: &mut P) -> anyhow::Result<()> {
        self.start();
        presenter.render(&self.state);

        loop {
            tokio::select! {
                // Updates from workers
                Some(cmd) = self.commands.recv() => {
                    cmd(&mut self.state);
                    let batch = 1 + self.commands.drain_and_run(&mut self.state);
                    tracing::debug!(batch, "Applied queued updates");
                    presenter.render(&self.state);
                }

                // Presentation layer events
                Some(event) = self.event_rx.recv() => {
                    match event {
                        UiEvent::Frame => presenter.render(&self.state),
                        UiEvent::Action(action) => {
                            self.handle_action(action);
                            presenter.render(&self.state);
                        }
                        UiEvent::Destroy(None) => break,
                        UiEvent::Destroy(Some(err)) => anyhow::bail!(err),
                    }
                }

                else => break,
            }
        }

        Ok(())
    }

    /// Apply one user action; a refusal is logged and kept as the notice
    pub fn handle_action(&mut self, action: UserAction) {
        self.state.set_notice(None);

        let result: Result<(), ActionError> = match action {
            UserAction::SetFilter(app) => self.state.set_filter(&app).map(|_| ()),
            UserAction::Unlock { item, password } => {
                self.state.unlock(item, &password).map(|_| ())
            }
            UserAction::Export { item } => self.state.export(item),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "User action rejected");
            self.state.set_notice(Some(e.to_string()));
        }
    }
}
