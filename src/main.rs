use clap::{Parser, Subcommand};
use gallery_intake::config::{self, ServiceConfig};
use gallery_intake::ingest::SweepReport;
use gallery_intake::{api, bootstrap};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    if env!("GALLERY_RELEASE_TAG") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GALLERY_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "gallery-intake")]
#[command(about = "Image intake and catalog service for a web gallery")]
#[command(long_about = "\
Image intake and catalog service for a web gallery

Clients submit a source URL; the service fetches it, transcodes a full AVIF
and a small AVIF preview, stores both, and records them in the catalog.

  GET    /images?page=1&limit=12   page through records, newest first
  POST   /images   {\"url\"}         ingest a new image
  PUT    /images   {\"id\", \"url\"}   re-ingest an existing record
  DELETE /images   {\"id\"}          remove a record and its artifacts

Configuration comes from gallery.toml (optional) and the environment:
DATABASE_URL, GALLERY_BIND, GALLERY_PUBLIC_BASE_URL, GALLERY_STORAGE_ROOT.
Without DATABASE_URL the catalog lives in memory.

Run 'gallery-intake gen-config' to generate a documented gallery.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "gallery.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Delete stored artifacts that no catalog record references
    Sweep {
        /// Report orphans without deleting them
        #[arg(long)]
        dry_run: bool,
        /// Override sweep.min_age_secs
        #[arg(long)]
        min_age_secs: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock gallery.toml with all options documented
    GenConfig,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::CheckConfig => {
            let config = config::load_config(&cli.config)?;
            print_config_summary(&cli.config, &config);
        }
        Command::Serve => {
            init_tracing(cli.log_json);
            let config = config::load_config(&cli.config)?;
            serve(config).await?;
        }
        Command::Sweep {
            dry_run,
            min_age_secs,
            json,
        } => {
            init_tracing(cli.log_json);
            let config = config::load_config(&cli.config)?;
            let min_age = Duration::from_secs(min_age_secs.unwrap_or(config.sweep.min_age_secs));

            let service = bootstrap::bootstrap(&config).await?;
            let result = service.orchestrator.sweep(min_age, dry_run).await;
            service.shutdown().await;
            let report = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sweep_report(&report);
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = bootstrap::bootstrap(&config).await?;
    let app = api::app(service.app_state(&config));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "gallery-intake listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    service.shutdown().await;
    served?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}

fn print_config_summary(path: &std::path::Path, config: &ServiceConfig) {
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "stock defaults".to_string()
    };
    println!("Config OK ({source})");
    println!("  bind       {}", config.server.bind);
    println!(
        "  catalog    {}",
        if config.database.url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    );
    println!(
        "  storage    {:?} → {}",
        config.storage.backend, config.storage.public_base_url
    );
    println!(
        "  workers    {}",
        config::effective_threads(&config.transcode)
    );
}

fn print_sweep_report(report: &SweepReport) {
    let verb = if report.dry_run {
        "Would delete"
    } else {
        "Deleted"
    };
    for key in &report.orphans {
        println!("{verb} {key}");
    }
    println!(
        "Scanned {} artifacts: {} referenced, {} too young, {} orphans, {} failed",
        report.scanned,
        report.referenced,
        report.skipped_young,
        report.orphans.len(),
        report.failed
    );
}
