//! OCR Engine Launcher
//!
//! Starts the OCR engine process and performs the startup handshake:
//! reuse an engine already listening on the port, otherwise spawn it, wait
//! for its "Running on" banner within a hard ceiling, then confirm with
//! bounded health checks.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

use super::provider::{HttpRecognizer, TextRecognizer};
use super::types::RecognitionError;
use crate::config::RecognitionConfig;

/// Banner printed by the engine's web server once it is listening
const READY_BANNER: &str = "Running on";
/// Interval between checks while waiting for the banner
const READY_POLL_MS: u64 = 500;
/// Timeout of a single health check
const HEALTH_TIMEOUT_SECS: u64 = 3;
/// Pause between health checks
const HEALTH_RETRY_DELAY_SECS: u64 = 1;

/// Supervises the OCR engine process
pub struct EngineLauncher {
    config: RecognitionConfig,
    child: tokio::sync::Mutex<Option<Child>>,
    ready: AtomicBool,
    startup_log: Arc<Mutex<Vec<String>>>,
}

impl EngineLauncher {
    pub fn new(config: RecognitionConfig) -> Self {
        Self {
            config,
            child: tokio::sync::Mutex::new(None),
            ready: AtomicBool::new(false),
            startup_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn startup_log(&self) -> Vec<String> {
        self.startup_log.lock().clone()
    }

    fn health_client(&self) -> HttpRecognizer {
        HttpRecognizer::new(
            &self.config.base_url(),
            Duration::from_secs(HEALTH_TIMEOUT_SECS),
        )
    }

    /// Start (or adopt) the engine and return the port it listens on
    pub async fn start(&self) -> Result<u16, RecognitionError> {
        let port = self.config.port;

        if !port_available(port).await {
            tracing::info!("Port {} is busy, checking for a running OCR engine", port);
            if self.health_client().is_healthy().await {
                tracing::info!("OCR engine already running on port {}", port);
                self.ready.store(true, Ordering::Release);
                return Ok(port);
            }
            tracing::error!("Port {} is occupied by another process", port);
            return Err(RecognitionError::PortOccupied(port));
        }

        tracing::info!(
            program = %self.config.program,
            args = ?self.config.args,
            port,
            "Starting OCR engine"
        );

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg("--port")
            .arg(port.to_string())
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (banner_tx, banner_rx) = watch::channel(false);
        let banner_tx = Arc::new(banner_tx);
        if let Some(stdout) = child.stdout.take() {
            self.watch_output(stdout, false, banner_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            self.watch_output(stderr, true, banner_tx);
        }

        *self.child.lock().await = Some(child);

        let result = self.await_handshake(banner_rx).await;
        match &result {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                tracing::info!("OCR engine fully ready on port {}", port);
            }
            Err(e) => {
                tracing::error!("OCR engine failed to start: {}", e);
                tracing::error!("Startup log:\n{}", self.startup_log().join("\n"));
                self.stop().await;
            }
        }
        result.map(|_| port)
    }

    fn watch_output<R>(&self, stream: R, is_stderr: bool, banner: Arc<watch::Sender<bool>>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = self.startup_log.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if is_stderr {
                    tracing::warn!("[ocr-engine] {}", line);
                    log.lock().push(format!("ERROR: {}", line));
                } else {
                    tracing::debug!("[ocr-engine] {}", line);
                    log.lock().push(line.clone());
                }
                if line.contains(READY_BANNER) {
                    banner.send_replace(true);
                }
            }
        });
    }

    async fn await_handshake(
        &self,
        mut banner: watch::Receiver<bool>,
    ) -> Result<(), RecognitionError> {
        let ceiling = self.config.startup_timeout();
        let deadline = Instant::now() + ceiling;

        while !*banner.borrow() {
            if Instant::now() >= deadline {
                return Err(RecognitionError::StartupTimeout(self.config.startup_timeout_ms));
            }
            if let Some(code) = self.exit_status().await? {
                return Err(RecognitionError::ProcessExited(code));
            }
            let poll = Duration::from_millis(READY_POLL_MS);
            if let Ok(Err(_)) = timeout(poll, banner.changed()).await {
                // Output streams closed; keep polling the exit status
                sleep(poll).await;
            }
        }

        tracing::info!("OCR engine is listening, verifying health");
        let client = self.health_client();
        let attempts = self.config.health_attempts.max(1);
        for attempt in 1..=attempts {
            match timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS), client.is_healthy()).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    tracing::debug!("Health check attempt {}/{} failed", attempt, attempts)
                }
                Err(_) => {
                    tracing::debug!("Health check attempt {}/{} timed out", attempt, attempts)
                }
            }
            if attempt < attempts {
                sleep(Duration::from_secs(HEALTH_RETRY_DELAY_SECS)).await;
            }
        }

        Err(RecognitionError::HealthCheckFailed(attempts))
    }

    /// `Some(code)` once the child has exited
    async fn exit_status(&self) -> Result<Option<Option<i32>>, RecognitionError> {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => Ok(child.try_wait()?.map(|status| status.code())),
            None => Ok(Some(None)),
        }
    }

    /// Kill the engine process if we spawned it
    pub async fn stop(&self) {
        self.ready.store(false, Ordering::Release);
        if let Some(mut child) = self.child.lock().await.take() {
            tracing::info!("Stopping OCR engine");
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill OCR engine: {}", e);
            }
        }
    }
}

async fn port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}
