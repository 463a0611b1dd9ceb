use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crpt_api::api::{ApiClient, Document};
use crpt_api::config::ClientConfig;

/// Submit a goods introduction document to the CRPT registry.
#[derive(Parser, Debug)]
#[command(name = "crpt-submit", version)]
struct Args {
    /// Path to the document JSON file
    #[arg(long)]
    document: PathBuf,

    /// Path to the file holding the detached signature
    #[arg(long)]
    signature_file: PathBuf,

    /// Bearer token obtained from the authentication endpoint
    #[arg(long, env = "CRPT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the rate limit window in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Override the maximum requests per window
    #[arg(long)]
    max_requests: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(window_ms) = args.window_ms {
        config.rate_limiting.window_ms = window_ms;
    }
    if let Some(max_requests) = args.max_requests {
        config.rate_limiting.max_requests = max_requests;
    }
    info!(
        base_url = %config.api.base_url,
        window_ms = config.rate_limiting.window_ms,
        max_requests = config.rate_limiting.max_requests,
        "Configuration loaded"
    );

    let document = std::fs::read_to_string(&args.document)
        .with_context(|| format!("failed to read document {}", args.document.display()))?;
    let document: Document = serde_json::from_str(&document)
        .with_context(|| format!("{} is not a JSON object", args.document.display()))?;
    let signature = std::fs::read_to_string(&args.signature_file).with_context(|| {
        format!("failed to read signature {}", args.signature_file.display())
    })?;

    let client = ApiClient::from_config(&config)?;
    client.set_token(args.token.as_deref())?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let id = client
        .submit_with_cancel(&document, signature.trim(), &cancel)
        .await?;

    println!("{}", id);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling pending submission");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling pending submission");
        }
    }

    cancel.cancel();
}
