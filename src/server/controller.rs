//! Printer lifecycle: start, stop and observe the virtual printer.
//!
//! ```text
//! Stopped ──start──► Starting ──bind ok──► Running ──stop──► Stopping ──► Stopped
//!                        │
//!                        └──bind failed──► Stopped
//! ```
//!
//! Every transition is published as [`PrinterEvent::RunningStateChanged`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tracing::{info, warn};

use super::acceptor::{Acceptor, AcceptorHandle};
use super::events::{PrinterEvent, RunningState};
use super::session::Pipeline;
use crate::error::ControllerError;
use crate::printer::PrinterSettings;
use crate::store::{IdSource, ImageStore, StoredImage};

/// Time sessions get to finish their current job when the printer stops.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const EVENT_CAPACITY: usize = 256;

struct Inner {
    /// Settings of the last start (or initialize); fixed while running.
    settings: PrinterSettings,
    acceptor: Option<AcceptorHandle>,
}

/// Owns the acceptor and the printer's observable state.
pub struct PrinterController {
    store: Arc<ImageStore>,
    inner: Mutex<Inner>,
    state: watch::Sender<RunningState>,
    events: broadcast::Sender<PrinterEvent>,
    shutdown_grace: Duration,
}

impl Default for PrinterController {
    fn default() -> Self {
        Self::new(Arc::new(ImageStore::new()))
    }
}

impl PrinterController {
    pub fn new(store: Arc<ImageStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            inner: Mutex::new(Inner {
                settings: PrinterSettings::default(),
                acceptor: None,
            }),
            state: watch::Sender::new(RunningState::Stopped),
            events,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long sessions may keep working after [`stop`](Self::stop)
    /// before they are aborted.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn state(&self) -> RunningState {
        *self.state.borrow()
    }

    /// Watch the running state without consuming events.
    pub fn watch_state(&self) -> watch::Receiver<RunningState> {
        self.state.subscribe()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.events.subscribe()
    }

    /// Adopt `settings`, report the labels already stored and start the
    /// printer if the settings ask for it.
    pub async fn initialize(&self, settings: &PrinterSettings) -> Result<Vec<StoredImage>, ControllerError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.acceptor.is_some() {
                return Err(ControllerError::AlreadyRunning);
            }
            inner.settings = settings.clone();
        }
        let labels = self.store.list_all(&settings.image_path).await?;
        info!(count = labels.len(), dir = %settings.image_path.display(), "Found stored labels");

        if settings.auto_start && settings.port > 0 {
            self.start(settings).await?;
        }
        Ok(labels)
    }

    /// Bind the configured port and begin accepting jobs.
    ///
    /// Fails with [`ControllerError::AlreadyRunning`] unless stopped. On any
    /// failure the printer stays stopped.
    pub async fn start(&self, settings: &PrinterSettings) -> Result<SocketAddr, ControllerError> {
        let mut inner = self.inner.lock().await;
        if inner.acceptor.is_some() || self.state() != RunningState::Stopped {
            return Err(ControllerError::AlreadyRunning);
        }

        let config = settings.validate()?;
        inner.settings = settings.clone();
        self.set_state(RunningState::Starting);

        let ids = match IdSource::after_existing(&settings.image_path).await {
            Ok(ids) => ids,
            Err(e) => {
                self.set_state(RunningState::Stopped);
                return Err(e.into());
            }
        };
        let pipeline = Pipeline::new(
            config,
            settings.image_path.clone(),
            self.store.clone(),
            Arc::new(ids),
            self.events.clone(),
        );

        match Acceptor::bind(settings.socket_addr(), Arc::new(pipeline)).await {
            Ok(handle) => {
                let addr = handle.local_addr();
                inner.acceptor = Some(handle);
                self.set_state(RunningState::Running);
                info!(
                    "Printer running on {} ({} dpmm, {} x {} mm)",
                    addr,
                    settings.dots_per_millimeter,
                    settings.label_width,
                    settings.label_height
                );
                Ok(addr)
            }
            Err(e) => {
                warn!(error = %e, "Printer failed to start");
                self.set_state(RunningState::Stopped);
                Err(e.into())
            }
        }
    }

    /// Stop accepting and end every session. Does nothing when stopped.
    ///
    /// When this returns every client connection is closed and no session
    /// will store another label.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let Some(mut acceptor) = inner.acceptor.take() else {
            return;
        };

        self.set_state(RunningState::Stopping);
        acceptor.shutdown(self.shutdown_grace).await;
        self.set_state(RunningState::Stopped);
        info!("Printer stopped");
    }

    /// Labels stored in the current image directory, ordered by id.
    pub async fn labels(&self) -> Result<Vec<StoredImage>, ControllerError> {
        let dir = self.image_path().await;
        Ok(self.store.list_all(&dir).await?)
    }

    /// Delete every stored label; returns how many were removed.
    pub async fn clear_labels(&self) -> Result<usize, ControllerError> {
        let dir = self.image_path().await;
        Ok(self.store.clear_all(&dir).await?)
    }

    async fn image_path(&self) -> PathBuf {
        self.inner.lock().await.settings.image_path.clone()
    }

    fn set_state(&self, state: RunningState) {
        self.state.send_replace(state);
        // No subscribers is fine.
        let _ = self.events.send(PrinterEvent::state_changed(state));
    }
}
