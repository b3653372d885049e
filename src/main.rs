//! # vzpl CLI
//!
//! Command-line front end for the virtual ZPL printer.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on port 9100, 8 dots/mm, 100 x 150 mm labels
//! vzpl serve
//!
//! # Different geometry and output directory
//! vzpl serve --port 9101 --dpmm 12 --width 60 --height 40 --images ./out
//!
//! # Render a ZPL file without the network
//! vzpl render label.zpl
//!
//! # Send the built-in sample label to a running printer
//! vzpl test-label --host 127.0.0.1 --port 9100
//!
//! # Show or delete stored labels
//! vzpl list
//! vzpl list --json
//! vzpl clear
//! ```
//!
//! Set `RUST_LOG` to adjust logging (default `vzpl=info`).

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vzpl::{
    PrinterController, PrinterEvent, PrinterSettings, VzplError,
    printer::{DEFAULT_PORT, SAMPLE_LABEL},
    protocol::{framer::split_jobs, parser::parse},
    render::render_label,
    store::{IdSource, ImageStore},
};

/// vzpl - Virtual ZPL label printer
#[derive(Parser, Debug)]
#[command(name = "vzpl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept ZPL jobs over TCP until Ctrl-C
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// TCP port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[command(flatten)]
        label: LabelArgs,
    },

    /// Render every job in a ZPL file into the image directory
    Render {
        /// ZPL file to render
        file: PathBuf,

        #[command(flatten)]
        label: LabelArgs,
    },

    /// Send the sample label to a running printer
    TestLabel {
        /// Printer host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Printer port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// List stored labels
    List {
        /// Directory holding label images
        #[arg(long, default_value = "labels")]
        images: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all stored labels
    Clear {
        /// Directory holding label images
        #[arg(long, default_value = "labels")]
        images: PathBuf,
    },
}

/// Label geometry and output options shared by `serve` and `render`.
#[derive(Args, Debug)]
struct LabelArgs {
    /// Resolution in dots per millimeter (6, 8, 12 or 24)
    #[arg(long, default_value_t = 8)]
    dpmm: u32,

    /// Label width in millimeters
    #[arg(long, default_value_t = 100.0)]
    width: f64,

    /// Label height in millimeters
    #[arg(long, default_value_t = 150.0)]
    height: f64,

    /// Directory for rendered label images
    #[arg(long, default_value = "labels")]
    images: PathBuf,
}

impl LabelArgs {
    fn settings(&self, bind_address: IpAddr, port: u16) -> PrinterSettings {
        PrinterSettings {
            bind_address,
            port,
            dots_per_millimeter: self.dpmm,
            label_width: self.width,
            label_height: self.height,
            image_path: self.images.clone(),
            auto_start: false,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "vzpl=info".into()))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), VzplError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port, label } => serve(label.settings(bind, port)).await,
        Commands::Render { file, label } => render_file(&file, &label).await,
        Commands::TestLabel { host, port } => send_test_label(&host, port).await,
        Commands::List { images, json } => {
            let labels = ImageStore::new().list_all(&images).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&labels)?);
                return Ok(());
            }
            if labels.is_empty() {
                println!("No labels in {}", images.display());
            }
            for label in labels {
                println!(
                    "{:>8}  {:>5} x {:<5}  {}  {}",
                    label.id,
                    label.width_px,
                    label.height_px,
                    label.created_at.format("%Y-%m-%d %H:%M:%S"),
                    label.path.display()
                );
            }
            Ok(())
        }
        Commands::Clear { images } => {
            let removed = ImageStore::new().clear_all(&images).await?;
            println!("Removed {} label(s) from {}", removed, images.display());
            Ok(())
        }
    }
}

/// Run the printer until Ctrl-C.
async fn serve(settings: PrinterSettings) -> Result<(), VzplError> {
    let controller = PrinterController::default();
    let mut events = controller.subscribe();

    let existing = controller.initialize(&settings).await?;
    info!("{} label(s) already stored", existing.len());
    controller.start(&settings).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PrinterEvent::LabelCreated { label }) => {
                    println!("Label {} -> {}", label.id, label.path.display());
                }
                Ok(PrinterEvent::RunningStateChanged { .. }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event listener lagged; skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    controller.stop().await;
    Ok(())
}

/// Frame, render and store every job in a ZPL file.
async fn render_file(file: &Path, label: &LabelArgs) -> Result<(), VzplError> {
    let settings = label.settings(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT);
    let config = settings.validate()?;
    let bytes = tokio::fs::read(file).await?;

    let jobs = split_jobs(&bytes);
    if jobs.is_empty() {
        warn!("No ^XA...^XZ jobs found in {}", file.display());
    }

    let store = ImageStore::new();
    let ids = IdSource::after_existing(&settings.image_path).await?;
    for job in jobs {
        let parsed = parse(job.payload());
        let rendered = render_label(&parsed.commands, &config, ids.next())?;
        let stored = store.save(&rendered, &settings.image_path).await?;
        println!(
            "Label {} ({} x {}) -> {}",
            stored.id,
            stored.width_px,
            stored.height_px,
            stored.path.display()
        );
    }
    Ok(())
}

/// Send the sample label with a random eight-digit id.
async fn send_test_label(host: &str, port: u16) -> Result<(), VzplError> {
    let id = rand::rng().random_range(10_000_000..100_000_000u32);
    let zpl = SAMPLE_LABEL.replace("{id}", &id.to_string());

    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(zpl.as_bytes()).await?;
    stream.shutdown().await?;

    println!("Sent test label {} to {}:{}", id, host, port);
    Ok(())
}
