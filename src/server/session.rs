//! Per-connection session: read, frame, parse, render, store.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::PrinterEvent;
use crate::error::StorageError;
use crate::printer::LabelConfiguration;
use crate::protocol::framer::{Job, JobFramer};
use crate::protocol::parser::parse;
use crate::render::{RenderError, render_label};
use crate::store::{IdSource, ImageStore, StoredImage};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// What became of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Stored(StoredImage),
    RenderFailed { id: u64, error: RenderError },
    SaveFailed { id: u64, error: StorageError },
}

/// Everything a session needs to turn jobs into stored labels.
///
/// Fixed for the lifetime of one running acceptor.
pub struct Pipeline {
    config: LabelConfiguration,
    image_path: PathBuf,
    store: Arc<ImageStore>,
    ids: Arc<IdSource>,
    events: broadcast::Sender<PrinterEvent>,
}

impl Pipeline {
    pub fn new(
        config: LabelConfiguration,
        image_path: PathBuf,
        store: Arc<ImageStore>,
        ids: Arc<IdSource>,
        events: broadcast::Sender<PrinterEvent>,
    ) -> Self {
        Self {
            config,
            image_path,
            store,
            ids,
            events,
        }
    }

    /// Parse, render and store one job, then announce the stored label.
    pub async fn process(&self, job: Job) -> JobOutcome {
        let id = self.ids.next();
        let config = self.config;

        let rendered = tokio::task::spawn_blocking(move || {
            let parsed = parse(job.payload());
            if !parsed.unknown.is_empty() {
                debug!(id, unknown = ?parsed.unknown, "Ignored unsupported commands");
            }
            render_label(&parsed.commands, &config, id)
        })
        .await
        .unwrap_or_else(|e| Err(RenderError::Aborted(e.to_string())));

        let label = match rendered {
            Ok(label) => label,
            Err(error) => {
                warn!(id, %error, "Discarding job: render failed");
                return JobOutcome::RenderFailed { id, error };
            }
        };

        match self.store.save(&label, &self.image_path).await {
            Ok(stored) => {
                info!(id, width = stored.width_px, height = stored.height_px, "Label created");
                // No subscribers is fine.
                let _ = self.events.send(PrinterEvent::LabelCreated { label: stored.clone() });
                JobOutcome::Stored(stored)
            }
            Err(error) => {
                warn!(id, %error, "Discarding job: save failed");
                JobOutcome::SaveFailed { id, error }
            }
        }
    }
}

/// Serve one connection until the peer closes it or `cancel` fires.
///
/// Jobs are processed in arrival order. Once `cancel` fires no further job
/// is started and the job in progress is abandoned, as is a job left open
/// when the session ends. The connection closes when this returns.
pub async fn run(mut stream: TcpStream, pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    let mut framer = JobFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    debug!("Session opened");

    'session: loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            result = stream.read(&mut buf) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "Read failed; closing session");
                    break;
                }
            }
        };

        for job in framer.push(&buf[..n]) {
            debug!(bytes = job.len(), "Job received");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'session,
                _ = pipeline.process(job) => {}
            }
        }
    }

    if cancel.is_cancelled() {
        debug!("Session cancelled");
    }
    framer.finish();
    debug!("Session closed");
}

/// Tracing span fields for a session.
pub fn span(session_id: u64, peer: SocketAddr) -> tracing::Span {
    tracing::info_span!("session", session_id, %peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::Resolution;

    fn pipeline(dir: &std::path::Path) -> (Pipeline, broadcast::Receiver<PrinterEvent>) {
        let (events, rx) = broadcast::channel(16);
        let config = LabelConfiguration::new(Resolution::Dpmm8, 4.0, 6.0).unwrap();
        let pipeline = Pipeline::new(
            config,
            dir.to_path_buf(),
            Arc::new(ImageStore::new()),
            Arc::new(IdSource::default()),
            events,
        );
        (pipeline, rx)
    }

    #[tokio::test]
    async fn test_process_stores_and_announces() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, mut rx) = pipeline(tmp.path());

        let outcome = pipeline
            .process(Job::new(b"^FO0,0^AAN^FD00000123^FS".to_vec()))
            .await;
        let JobOutcome::Stored(stored) = outcome else {
            panic!("expected a stored label, got {outcome:?}");
        };
        assert_eq!((stored.width_px, stored.height_px), (32, 48));
        assert!(stored.path.exists());

        match rx.recv().await.unwrap() {
            PrinterEvent::LabelCreated { label } => assert_eq!(label, stored),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_an_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, mut rx) = pipeline(tmp.path());

        let outcome = pipeline.process(Job::new(b"^AZN,20,20^FDx^FS".to_vec())).await;
        assert!(matches!(
            outcome,
            JobOutcome::RenderFailed {
                error: RenderError::UnsupportedFont('Z'),
                ..
            }
        ));
        assert!(rx.try_recv().is_err());

        // The next job still goes through.
        let outcome = pipeline.process(Job::new(b"^FO0,0^GB5,5,5^FS".to_vec())).await;
        assert!(matches!(outcome, JobOutcome::Stored(_)));
    }

    #[tokio::test]
    async fn test_cancelled_session_starts_no_more_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, mut rx) = pipeline(tmp.path());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        // Jobs already buffered when the session starts are not processed.
        tokio::io::AsyncWriteExt::write_all(&mut client, &b"^XA^FO0,0^GB4,4,4^FS^XZ".repeat(20))
            .await
            .unwrap();
        run(server, Arc::new(pipeline), cancel).await;

        assert!(rx.try_recv().is_err());
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_save_failure_is_an_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the image directory should be.
        let blocked = tmp.path().join("labels");
        std::fs::write(&blocked, "not a directory").unwrap();
        let (pipeline, _rx) = pipeline(&blocked);

        let outcome = pipeline.process(Job::new(Vec::new())).await;
        assert!(matches!(outcome, JobOutcome::SaveFailed { .. }));
    }
}
