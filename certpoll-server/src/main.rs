//! certpoll - server certificate selection runner

mod config;

use certpoll::{
    ApplicationLifetime, CertificateSource, CertificateUpdated, ServerCertificate,
    configure_server_certificate_selection,
};
use clap::{Parser, Subcommand};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Certificates this close to expiry are logged as warnings on rotation
const EXPIRY_WARNING: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// certpoll - Hot rotation of TLS server certificates
#[derive(Parser)]
#[command(name = "certpoll")]
#[command(version)]
#[command(about = "certpoll - Hot rotation of TLS server certificates")]
pub struct Args {
    /// Path to the configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Fetch the current certificate once and print it
    Check {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll the source until interrupted, logging every rotation
    Watch,
}

#[derive(Debug, Serialize)]
struct CertificateSummary {
    source: String,
    subject: String,
    issuer: String,
    common_names: Vec<String>,
    serial: String,
    thumbprint: String,
    not_before: u64,
    not_after: u64,
    self_signed: bool,
    chain_length: usize,
}

impl CertificateSummary {
    fn new(source: String, cert: &ServerCertificate) -> Self {
        Self {
            source,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            common_names: cert.common_names().to_vec(),
            serial: cert.serial().to_string(),
            thumbprint: cert.thumbprint().to_string(),
            not_before: unix_seconds(cert.not_before()),
            not_after: unix_seconds(cert.not_after()),
            self_signed: cert.is_self_signed(),
            chain_length: cert.chain().len(),
        }
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn install_rustls_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    install_rustls_crypto_provider();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = AppConfig::load_from_file(&args.config)?;

    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        Command::Check { json } => rt.block_on(check(&config, json)),
        Command::Watch => rt.block_on(watch(&config)),
    }
}

async fn check(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = config.build_source()?;
    let valid_only = config.selection.valid_certificates_only;

    tracing::debug!(source = %source.describe(), valid_only, "Checking certificate source");

    let Some(cert) = source.fetch_latest(valid_only).await? else {
        return Err(format!("No usable certificate found in {}", source.describe()).into());
    };

    let summary = CertificateSummary::new(source.describe(), &cert);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Source:      {}", summary.source);
        println!("Subject:     {}", summary.subject);
        println!("Issuer:      {}", summary.issuer);
        println!("Names:       {}", summary.common_names.join(", "));
        println!("Serial:      {}", summary.serial);
        println!("Thumbprint:  {}", summary.thumbprint);
        println!("Certificate: {}", cert);
    }

    Ok(())
}

fn log_expiry(event: &CertificateUpdated) {
    let cert = &event.certificate;
    let remaining = cert
        .not_after()
        .duration_since(SystemTime::now())
        .unwrap_or_default();
    let days = remaining.as_secs() / 86_400;

    if remaining < EXPIRY_WARNING {
        tracing::warn!(
            thumbprint = %cert.thumbprint(),
            days_remaining = days,
            "Published certificate expires soon"
        );
    } else {
        tracing::info!(
            thumbprint = %cert.thumbprint(),
            days_remaining = days,
            "Published certificate validity"
        );
    }
}

async fn watch(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lifetime = ApplicationLifetime::new();
    let source = config.build_source()?;
    let options = config.selection_options().with_configurator(|selector| {
        selector.on_update(log_expiry);
    });

    let selector = configure_server_certificate_selection(&lifetime, source, &options)?;

    lifetime.notify_started().await?;
    tracing::info!(
        interval_secs = selector.polling_interval().as_secs(),
        "Watching for certificate rotations, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    lifetime.notify_stopping();
    selector.shutdown().await;
    Ok(())
}
