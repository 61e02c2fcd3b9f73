use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use cita_watcher::config::AppConfig;
use cita_watcher::models::{Province, UserProfile};
use cita_watcher::pipeline::AppointmentPipeline;
use cita_watcher::plugins::NotifierHub;
use cita_watcher::scheduler::Monitor;
use cita_watcher::transport::{HttpTransport, Transport, TransportKind};
use cita_watcher::utils::logger;

#[derive(Parser, Debug)]
#[command(name = "cita-watcher", version, about = "Watches the ICP cita previa portal for asylum appointments")]
struct Cli {
    /// Extra configuration file layered over config/default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured transport
    #[arg(long, value_enum, global = true)]
    transport: Option<TransportKind>,

    /// Only notify, never try to book
    #[arg(long, global = true)]
    no_book: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check every configured province on a fixed interval (default)
    Run,
    /// Run a single cycle and print the report as JSON
    Check {
        /// Check only this province
        #[arg(long)]
        province: Option<String>,
    },
    /// Test every enabled notifier and send a status message
    TestNotify,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(kind) = cli.transport {
        config.transport.kind = kind;
    }
    if cli.no_book {
        config.booking.auto_book = false;
    }

    let _log_guard = logger::init_logging(&config.logging)?;
    info!("Starting Cita Watcher v{}", env!("CARGO_PKG_VERSION"));

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .listen
            .parse()
            .with_context(|| format!("Invalid metrics listen address: {}", config.metrics.listen))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics available at http://{}/metrics", addr);
    }

    let profile = Arc::new(config.profile.clone());
    let notifiers = NotifierHub::from_config(&config, Arc::clone(&profile)).await?;
    info!("Enabled notifiers: {:?}", notifiers.list_notifier_types().await);

    match cli.command.unwrap_or(Command::Run) {
        Command::TestNotify => test_notify(&notifiers).await,
        Command::Check { province } => {
            let monitor = build_monitor(&config, profile, notifiers)?;
            let provinces = match province {
                Some(name) => vec![Province::new(name)],
                None => config.provinces.clone(),
            };
            let report = monitor.run_provinces(&provinces).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run => {
            let monitor = build_monitor(&config, profile, notifiers)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested, finishing current cycle");
                    let _ = shutdown_tx.send(true);
                }
            });

            let stats = monitor.run_forever(shutdown_rx).await;
            info!(
                "Shutting down after {} cycles ({} checks, {} appointments found)",
                stats.cycles_run, stats.checks_run, stats.appointments_found
            );
            Ok(())
        }
    }
}

fn build_monitor(config: &AppConfig, profile: Arc<UserProfile>, notifiers: NotifierHub) -> Result<Monitor> {
    let transport = build_transport(config)?;
    let pipeline = AppointmentPipeline::new(transport, config.retry_policy(), profile, config.entry_url()?)
        .with_origin(config.origin_url()?)
        .with_auto_book(config.booking.auto_book);
    Ok(Monitor::new(
        pipeline,
        notifiers,
        config.provinces.clone(),
        config.scheduler.clone(),
    ))
}

fn build_transport(config: &AppConfig) -> Result<Arc<dyn Transport>> {
    let settings = config.transport_settings();
    match config.transport.kind {
        TransportKind::Http => Ok(Arc::new(HttpTransport::new(settings)?)),
        #[cfg(feature = "browser")]
        TransportKind::Browser => {
            let browser = cita_watcher::transport::BrowserTransport::launch(
                settings,
                config.transport.chrome_path.as_deref(),
                config.transport.headless,
            )?;
            Ok(Arc::new(browser))
        }
        #[cfg(not(feature = "browser"))]
        TransportKind::Browser => bail!("built without the `browser` feature; use --transport http"),
    }
}

async fn test_notify(notifiers: &NotifierHub) -> Result<()> {
    for (notifier, reachable) in notifiers.test_all().await {
        if reachable {
            info!("{} is reachable", notifier);
        } else {
            warn!("{} is not reachable", notifier);
        }
    }

    let deliveries = notifiers
        .broadcast_status("🧪 Test notification from Cita Watcher")
        .await;
    let failed: Vec<&str> = deliveries
        .iter()
        .filter(|d| !d.result.success)
        .map(|d| d.notifier.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("Test notification failed for: {}", failed.join(", "));
    }
    info!("Test notification delivered by {} notifiers", deliveries.len());
    Ok(())
}
