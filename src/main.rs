//! BookMagic command line
//!
//! Starts the OCR engine, then imports a PDF into the library or extracts a
//! library book page by page.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookmagic::config::Config;
use bookmagic::db::{self, BookRepository, NewBook, SqliteGateway};
use bookmagic::recognition::{EngineLauncher, HttpRecognizer, TextRecognizer};
use bookmagic::ReaderSession;

#[derive(Parser)]
#[command(name = "bookmagic", version, about = "Personal PDF library with OCR-backed text extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the OCR engine is reachable
    Health,
    /// Add a PDF to the library
    Import {
        file: std::path::PathBuf,
        #[arg(long)]
        language: Option<String>,
    },
    /// Extract every page of a library book
    Extract { book_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookmagic=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let cli = Cli::parse();
    tracing::info!("Starting BookMagic v{}", env!("CARGO_PKG_VERSION"));

    let launcher = EngineLauncher::new(config.recognition.clone());
    let port = launcher
        .start()
        .await
        .context("Failed to start the OCR engine")?;
    let recognizer = Arc::new(HttpRecognizer::from_config(&config.recognition));
    recognizer.set_port(port);

    let result = tokio::select! {
        result = run(cli.command, &config, recognizer) => result,
        _ = shutdown_signal() => Ok(()),
    };

    launcher.stop().await;
    result
}

async fn run(command: Command, config: &Config, recognizer: Arc<HttpRecognizer>) -> anyhow::Result<()> {
    match command {
        Command::Health => {
            if !recognizer.is_healthy().await {
                bail!("OCR engine at {} is not healthy", recognizer.base_url());
            }
            println!("ok");
        }
        Command::Import { file, language } => {
            let file_path = std::fs::canonicalize(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?
                .to_string_lossy()
                .into_owned();
            let metadata = recognizer.get_metadata(&file_path).await?;

            let pool = db::create_pool(&config.database.url).await?;
            let book = BookRepository::new(&pool)
                .create(&NewBook {
                    title: metadata.title,
                    author: metadata.author,
                    file_path,
                    page_count: metadata.page_count,
                    language,
                })
                .await?;

            tracing::info!(book_id = book.id, pages = book.page_count, "Imported {}", book.title);
            println!("{}", book.id);
        }
        Command::Extract { book_id } => {
            let pool = db::create_pool(&config.database.url).await?;
            let gateway = Arc::new(SqliteGateway::new(pool));
            let session = ReaderSession::open(book_id, gateway, recognizer, config).await?;

            let mut progress = session.subscribe_progress();
            loop {
                let current = *progress.borrow_and_update();
                tracing::info!(
                    "Extracted {}/{} pages ({}%)",
                    current.pages_processed,
                    current.total_pages,
                    current.percent()
                );
                if current.is_complete() {
                    break;
                }
                if let Some(e) = session.last_error() {
                    bail!("Extraction failed: {}", e);
                }
                if progress.changed().await.is_err() {
                    break;
                }
            }

            for page in session.pages() {
                println!("--- page {} ---\n{}", page.page_number, page.content);
            }
            session.close();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
