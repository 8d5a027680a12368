//! cdrclient Daemon - Background document synchronization service
//!
//! This binary runs as a system service and handles:
//! - Uploading documents dropped into connector source folders
//! - Periodically pulling documents for every connector
//! - One-shot client secret renewal (`--renew-credential`)
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! `main` is the composition root: it loads and validates the configuration,
//! builds the HTTP adapters and the synchronization components, and starts
//! the loops enabled in the configuration. Every loop receives a child of one
//! `CancellationToken` that is triggered on receipt of SIGTERM or SIGINT.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdrclient_api::renewal::is_rejection;
use cdrclient_api::{
    AccessTokenCache, ApiError, CredentialRenewer, DocumentClient, OAuth2Config, TransportRetry,
};
use cdrclient_core::config::{Config, LogFormat};
use cdrclient_sync::busy::BusyFileDetector;
use cdrclient_sync::in_flight::InFlightSet;
use cdrclient_sync::pipeline::{IntakeOptions, UploadPipeline};
use cdrclient_sync::pull::{PullLoop, PullScheduler};
use cdrclient_sync::upload::RetryUploader;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "cdrclientd", version, about = "Document synchronization client daemon")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request a new client secret, print it and exit
    #[arg(long)]
    renew_credential: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

// ============================================================================
// Tracing
// ============================================================================

/// `RUST_LOG` wins over the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(config: &Config) {
    let filter = env_filter(&config.logging.level);
    match config.logging.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Wires the adapters and the synchronization components together
struct DaemonService {
    config: Config,
    auth: Arc<AccessTokenCache>,
    http: reqwest::Client,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cdrclient/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let auth = Arc::new(AccessTokenCache::new(
            http.clone(),
            OAuth2Config::from_config(&config.auth),
            TransportRetry::from_config(&config.auth),
        ));

        Ok(Self {
            config,
            auth,
            http,
            shutdown,
        })
    }

    /// Creates every connector folder and the temp directories
    async fn prepare_folders(&self) -> Result<()> {
        let mut folders = self.config.router().all_folders();
        folders.push(self.config.local_temp_dir.clone());
        for folder in folders {
            tokio::fs::create_dir_all(&folder)
                .await
                .with_context(|| format!("Failed to create folder {}", folder.display()))?;
        }
        Ok(())
    }

    /// Requests a new client secret and hands it to the operator
    async fn renew_credential(&self) -> Result<()> {
        let renewer = CredentialRenewer::new(
            self.http.clone(),
            &self.config.endpoint.credentials_url,
            self.auth.clone(),
            TransportRetry::from_config(&self.config.auth),
        );
        let secret = match renewer.renew().await {
            Ok(secret) => secret,
            Err(e) => {
                if let Some(hint) = renewal_failure_hint(&e) {
                    error!(client_id = %self.config.auth.client_id, "{hint}");
                }
                return Err(anyhow::Error::new(e).context("Client secret renewal failed"));
            }
        };
        warn!("Client secret renewed; update auth.client_secret in the configuration file");
        println!("{secret}");
        Ok(())
    }

    /// Starts the enabled loops and waits for shutdown
    async fn run(&self) -> Result<()> {
        self.prepare_folders().await?;

        let router = Arc::new(self.config.router());
        let api = Arc::new(DocumentClient::new(
            self.http.clone(),
            &self.config.endpoint.documents_url,
            self.auth.clone(),
        ));

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut pipeline: Option<Arc<UploadPipeline>> = None;
        let mut scheduler: Option<Arc<PullScheduler>> = None;

        if self.config.upload.enabled {
            let uploader = RetryUploader::new(
                api.clone(),
                router.clone(),
                BusyFileDetector::from_config(&self.config.upload.busy_file),
                self.config.retry_policy()?,
                self.config.upload.parallelism,
            );
            let upload_pipeline = Arc::new(UploadPipeline::new(
                Arc::new(uploader),
                Arc::new(InFlightSet::new(self.config.upload.in_flight_capacity)),
            ));
            handles.extend(upload_pipeline.spawn(
                IntakeOptions::from_config(&self.config.upload),
                self.shutdown.child_token(),
            ));
            pipeline = Some(upload_pipeline);
            info!(
                watcher = self.config.upload.watcher_enabled,
                parallelism = self.config.upload.parallelism,
                "Upload pipeline enabled"
            );
        }

        if self.config.pull.enabled {
            let pull_scheduler = Arc::new(PullScheduler::new(
                Arc::new(PullLoop::new(api.clone(), router.clone())),
                self.config.pull.parallelism,
                self.config.pull.interval(),
            ));
            let runner = pull_scheduler.clone();
            let token = self.shutdown.child_token();
            handles.push(tokio::spawn(async move { runner.run(token).await }));
            scheduler = Some(pull_scheduler);
            info!(
                parallelism = self.config.pull.parallelism,
                interval_secs = self.config.pull.interval_secs,
                "Pull loop enabled"
            );
        }

        if handles.is_empty() {
            warn!("Neither upload nor pull is enabled, waiting for shutdown");
        }

        self.shutdown.cancelled().await;
        info!("Shutdown requested, stopping loops");

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Loop task ended abnormally");
            }
        }

        let grace = self.config.shutdown_grace();
        let drain = async {
            if let Some(pipeline) = &pipeline {
                pipeline.tracker().close();
                pipeline.tracker().wait().await;
            }
            if let Some(scheduler) = &scheduler {
                scheduler.tracker().close();
                scheduler.tracker().wait().await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "Tasks still running after the shutdown grace period"
            );
        }

        Ok(())
    }
}

/// Operator hint for a renewal failure caused by the current credentials
fn renewal_failure_hint(err: &ApiError) -> Option<&'static str> {
    is_rejection(err).then_some(
        "Credentials rejected; check auth.client_id and auth.client_secret before renewing again",
    )
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.ensure_valid()?;

    init_tracing(&config);
    info!(config_path = %config_path.display(), "cdrclient daemon starting (cdrclientd)");

    let shutdown_token = CancellationToken::new();
    let service = DaemonService::new(config, shutdown_token.clone())?;

    if cli.renew_credential {
        return service.renew_credential().await;
    }

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let result = service.run().await;

    match &result {
        Ok(()) => info!("cdrclient daemon shut down gracefully"),
        Err(e) => error!(error = %e, "cdrclient daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
