//! TCP accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::session::{self, Pipeline};
use crate::error::NetworkError;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Acceptor;

impl Acceptor {
    /// Bind `addr` and start accepting connections in the background.
    ///
    /// Each connection gets its own session task. Nothing is spawned if the
    /// bind fails.
    pub async fn bind(addr: SocketAddr, pipeline: Arc<Pipeline>) -> Result<AcceptorHandle, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(NetworkError::LocalAddr)?;

        info!("Listening for ZPL jobs on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(listener, pipeline, shutdown_rx));

        Ok(AcceptorHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            accept_task: Some(accept_task),
        })
    }
}

/// Accept until told to shut down, then wind the sessions down.
///
/// The shutdown message carries the grace period. A dropped handle counts
/// as a shutdown with no grace.
async fn accept_loop(listener: TcpListener, pipeline: Arc<Pipeline>, mut shutdown: oneshot::Receiver<Duration>) {
    let cancel = CancellationToken::new();
    let mut sessions = JoinSet::new();
    let mut next_session_id: u64 = 1;

    let grace = loop {
        tokio::select! {
            grace = &mut shutdown => {
                debug!("Accept loop shutting down");
                break grace.unwrap_or(Duration::ZERO);
            }

            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    warn!(error = %e, "Session ended abnormally");
                }
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let session_id = next_session_id;
                        next_session_id += 1;
                        debug!(session_id, %peer, "Client connected");

                        sessions.spawn(
                            session::run(stream, pipeline.clone(), cancel.child_token())
                                .instrument(session::span(session_id, peer)),
                        );
                    }
                    Err(e) => {
                        error!("{}", NetworkError::Accept(e));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    };

    // Free the port before waiting on sessions.
    drop(listener);
    cancel.cancel();

    if tokio::time::timeout(grace, drain(&mut sessions)).await.is_err() {
        warn!(
            sessions = sessions.len(),
            "Sessions still running after {:?}; aborting them", grace
        );
        sessions.abort_all();
        drain(&mut sessions).await;
    }
}

async fn drain(sessions: &mut JoinSet<()>) {
    while sessions.join_next().await.is_some() {}
}

/// Handle to a running acceptor. Dropping it aborts every session.
pub struct AcceptorHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<Duration>>,
    accept_task: Option<JoinHandle<()>>,
}

impl AcceptorHandle {
    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and cancel every session. Sessions get `grace` to wind
    /// down and are aborted after that; either way their connections are
    /// closed when this returns. Calling it again does nothing.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(accept_task) = self.accept_task.take() else {
            return;
        };
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(grace);
        }

        if let Err(e) = accept_task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        info!("Stopped listening on {}", self.local_addr);
    }
}
