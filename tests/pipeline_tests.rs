//! End-to-end tests: TCP in, PNG files out.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use vzpl::error::ControllerError;
use vzpl::printer::PrinterSettings;
use vzpl::server::{PrinterController, PrinterEvent, RunningState};
use vzpl::store::StoredImage;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn settings(dir: &Path) -> PrinterSettings {
    PrinterSettings {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: free_port(),
        dots_per_millimeter: 8,
        label_width: 4.0,
        label_height: 6.0,
        image_path: dir.to_path_buf(),
        auto_start: false,
    }
}

async fn send(port: u16, bytes: &[u8]) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.shutdown().await.unwrap();
}

async fn next_label(rx: &mut broadcast::Receiver<PrinterEvent>) -> StoredImage {
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a label")
            .unwrap();
        if let PrinterEvent::LabelCreated { label } = event {
            return label;
        }
    }
}

async fn next_state(rx: &mut broadcast::Receiver<PrinterEvent>) -> (RunningState, bool) {
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a state change")
            .unwrap();
        if let PrinterEvent::RunningStateChanged { state, is_running } = event {
            return (state, is_running);
        }
    }
}

#[tokio::test]
async fn test_label_over_tcp_is_rendered_and_stored() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    controller.start(&settings).await.unwrap();
    send(settings.port, b"^XA^FO0,0^AAN^FD00000123^FS^XZ").await;

    let label = next_label(&mut events).await;
    assert_eq!((label.width_px, label.height_px), (32, 48));

    let image = image::open(&label.path).unwrap().to_luma8();
    assert_eq!(image.dimensions(), (32, 48));
    let black_near_origin = (0..9).any(|y| (0..16).any(|x| image.get_pixel(x, y).0[0] == 0));
    assert!(black_near_origin);

    controller.stop().await;
}

#[tokio::test]
async fn test_noise_and_partial_jobs_are_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    controller.start(&settings).await.unwrap();
    send(settings.port, b"~HS\r\n^XA^MMT^FO0,0^GB8,8,8^FS^XZ\r\n^XA^FO0,0^FDcut off").await;

    let label = next_label(&mut events).await;
    controller.stop().await;

    let stored = controller.labels().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, label.id);
}

#[tokio::test]
async fn test_concurrent_sessions_get_unique_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();
    controller.start(&settings).await.unwrap();

    const SESSIONS: usize = 4;
    const JOBS_PER_SESSION: usize = 5;

    let mut clients = Vec::new();
    for _ in 0..SESSIONS {
        let port = settings.port;
        clients.push(tokio::spawn(async move {
            let job = b"^XA^FO2,2^GB10,10,2^FS^XZ".repeat(JOBS_PER_SESSION);
            send(port, &job).await;
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let mut ids = HashSet::new();
    for _ in 0..SESSIONS * JOBS_PER_SESSION {
        ids.insert(next_label(&mut events).await.id);
    }
    assert_eq!(ids.len(), SESSIONS * JOBS_PER_SESSION);

    controller.stop().await;
    assert_eq!(controller.labels().await.unwrap().len(), SESSIONS * JOBS_PER_SESSION);
}

#[tokio::test]
async fn test_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    // Stop while stopped does nothing.
    controller.stop().await;
    assert_eq!(controller.state(), RunningState::Stopped);

    controller.start(&settings).await.unwrap();
    assert_eq!(next_state(&mut events).await, (RunningState::Starting, false));
    assert_eq!(next_state(&mut events).await, (RunningState::Running, true));

    // A second start is refused and changes nothing.
    let err = controller.start(&settings).await.unwrap_err();
    assert!(matches!(err, ControllerError::AlreadyRunning));
    assert_eq!(controller.state(), RunningState::Running);

    controller.stop().await;
    assert_eq!(next_state(&mut events).await, (RunningState::Stopping, false));
    assert_eq!(next_state(&mut events).await, (RunningState::Stopped, false));

    // The port is free again and a restart is announced afresh.
    controller.start(&settings).await.unwrap();
    assert_eq!(next_state(&mut events).await, (RunningState::Starting, false));
    assert_eq!(next_state(&mut events).await, (RunningState::Running, true));
    controller.stop().await;
}

#[tokio::test]
async fn test_clear_then_store_again() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();
    controller.start(&settings).await.unwrap();

    send(settings.port, &b"^XA^FO0,0^GB4,4,4^FS^XZ".repeat(3)).await;
    for _ in 0..3 {
        next_label(&mut events).await;
    }
    assert_eq!(controller.labels().await.unwrap().len(), 3);

    assert_eq!(controller.clear_labels().await.unwrap(), 3);
    assert!(controller.labels().await.unwrap().is_empty());

    send(settings.port, b"^XA^FO0,0^GB4,4,4^FS^XZ").await;
    let label = next_label(&mut events).await;
    assert!(label.path.exists());
    assert_eq!(controller.labels().await.unwrap().len(), 1);

    controller.stop().await;
}

/// Wait for the server to close `stream`, failing if it stays open.
async fn assert_closed_by_server(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(EVENT_TIMEOUT, stream.read(&mut buf))
        .await
        .expect("server kept the connection open");
    // A reset is as closed as a clean EOF.
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected data: {read:?}");
}

#[tokio::test]
async fn test_huge_box_still_produces_a_label() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    controller.start(&settings).await.unwrap();
    send(settings.port, b"^XA^FO0,0^GB4000000,4000000,1^FS^XZ^XA^FO0,0^GC12000,1^FS^XZ").await;

    let boxed = next_label(&mut events).await;
    let circle = next_label(&mut events).await;
    assert_eq!((boxed.width_px, boxed.height_px), (32, 48));
    assert_eq!((circle.width_px, circle.height_px), (32, 48));

    let image = image::open(&boxed.path).unwrap().to_luma8();
    assert_eq!(image.get_pixel(0, 47).0[0], 0);
    assert_eq!(image.get_pixel(31, 47).0[0], 255);

    // The printer is still serving.
    send(settings.port, b"^XA^FO0,0^GB4,4,4^FS^XZ").await;
    next_label(&mut events).await;
    controller.stop().await;
}

#[tokio::test]
async fn test_stop_mid_job_stores_nothing_and_closes_client() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings(tmp.path());
    let controller = PrinterController::default();
    controller.start(&settings).await.unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", settings.port)).await.unwrap();
    client.write_all(b"^XA^FO0,0^GB8,8,8^FS^FO0,0^AAN^FDnever finished").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    controller.stop().await;

    assert_closed_by_server(&mut client).await;
    assert!(controller.labels().await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(tmp.path()).map(|dir| dir.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn test_stop_halts_queued_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = PrinterSettings {
        label_width: 100.0,
        label_height: 150.0,
        ..settings(tmp.path())
    };
    let controller = PrinterController::default().with_shutdown_grace(Duration::from_millis(200));
    let mut events = controller.subscribe();
    controller.start(&settings).await.unwrap();

    // Far more full-size labels than can be stored before the stop.
    const JOBS: usize = 300;
    let mut client = TcpStream::connect(("127.0.0.1", settings.port)).await.unwrap();
    client
        .write_all(&b"^XA^FO0,0^GB800,1200,400^FS^XZ".repeat(JOBS))
        .await
        .unwrap();
    next_label(&mut events).await;

    controller.stop().await;
    assert_closed_by_server(&mut client).await;

    let stored = controller.labels().await.unwrap().len();
    assert!(stored < JOBS);

    // Nothing is stored or announced once the printer reports Stopped.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(controller.labels().await.unwrap().len(), stored);
    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PrinterEvent::RunningStateChanged {
                state: RunningState::Stopped,
                ..
            } => stopped = true,
            PrinterEvent::LabelCreated { label } => {
                assert!(!stopped, "label {} announced after stop", label.id);
            }
            PrinterEvent::RunningStateChanged { .. } => {}
        }
    }
    assert!(stopped);
}

#[tokio::test]
async fn test_restart_continues_numbering() {
    let tmp = tempfile::tempdir().unwrap();
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    let first = settings(tmp.path());
    controller.start(&first).await.unwrap();
    send(first.port, b"^XA^FO0,0^GB4,4,4^FS^XZ").await;
    let before = next_label(&mut events).await;
    controller.stop().await;

    let second = settings(tmp.path());
    controller.start(&second).await.unwrap();
    send(second.port, b"^XA^FO0,0^GB4,4,4^FS^XZ").await;
    let after = next_label(&mut events).await;
    controller.stop().await;

    assert!(after.id > before.id);
}
