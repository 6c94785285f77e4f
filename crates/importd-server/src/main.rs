use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use importd_api::{ImportSys, router::import_router};
use importd_job::{
    DryRunProcessor, FeedConfig, HttpWorkerTrigger, ImportService, KeepaliveConfig, ServiceConfig,
};
use importd_observer::{HttpTransport, Observer, ObserverConfig};
use importd_store::{FileJobStore, FileLogStore, JobStore, LogStore, MemoryJobStore, MemoryLogStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "importd", about = "Chunked product import service with live progress")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "9300")]
    port: u16,

    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Keep jobs and logs in memory only.
    #[arg(long, default_value_t = false)]
    memory: bool,

    /// Passive keepalive interval; 0 disables the loop.
    #[arg(long, default_value_t = 30)]
    keepalive_secs: u64,

    /// Remote worker base url. Without it the worker runs in-process.
    #[arg(long)]
    worker_endpoint: Option<String>,

    /// Request timeout for remote worker invocations.
    #[arg(long, default_value_t = 60)]
    worker_timeout_secs: u64,

    /// Simulated processing time per chunk for the built-in dry-run worker.
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,

    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a job's progress from a running importd server.
    Watch(WatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    job_id: String,

    #[arg(long, default_value = "http://127.0.0.1:9300")]
    url: String,

    #[arg(long, default_value_t = 2000)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::from_default_env().add_directive("importd=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let nonce = std::env::var("IMPORTD_NONCE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    match &cli.command {
        Some(Command::Watch(args)) => watch(args, nonce).await,
        None => serve(&cli, nonce).await,
    }
}

async fn serve(cli: &Cli, nonce: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", cli.host, cli.port);
    let (jobs, logs): (Arc<dyn JobStore>, Arc<dyn LogStore>) = if cli.memory {
        info!("using in-memory job store");
        (Arc::new(MemoryJobStore::new()), Arc::new(MemoryLogStore::new()))
    } else {
        let data_dir = PathBuf::from(&cli.data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;
        (
            Arc::new(FileJobStore::new(&data_dir).await?),
            Arc::new(FileLogStore::new(&data_dir).await?),
        )
    };

    let config = ServiceConfig {
        keepalive: KeepaliveConfig {
            passive_interval: Duration::from_secs(cli.keepalive_secs.max(1)),
            trigger_timeout: Duration::from_secs(cli.worker_timeout_secs.max(1)),
        },
        feed: FeedConfig::default(),
    };
    let trigger_timeout = config.keepalive.trigger_timeout;
    let processor = Arc::new(DryRunProcessor::new(Duration::from_millis(cli.chunk_delay_ms)));
    let mut service = ImportService::new(jobs, logs, processor, config);

    if let Some(endpoint) = cli.worker_endpoint.as_deref() {
        let trigger =
            HttpWorkerTrigger::new(endpoint, trigger_timeout)?.with_nonce(nonce.clone());
        service = service.with_trigger(Arc::new(trigger));
        info!(endpoint = %endpoint, "keepalive triggers remote worker");
    }

    if cli.keepalive_secs > 0 {
        service.spawn_passive_keepalive();
        info!(interval_secs = cli.keepalive_secs, "passive keepalive enabled");
    } else {
        warn!("passive keepalive disabled, jobs only advance while observed");
    }

    if nonce.is_some() {
        info!("observer nonce required on job routes");
    }
    let app = import_router(Arc::new(ImportSys::new(service).with_nonce(nonce)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("importd listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn watch(args: &WatchArgs, nonce: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ObserverConfig {
        poll_interval: Duration::from_millis(args.poll_ms.max(100)),
        ..ObserverConfig::default()
    };
    let transport = Arc::new(HttpTransport::new(&args.url, nonce, config.request_timeout)?);
    let mut observer = Observer::spawn(args.job_id.clone(), transport, config);
    let mut updates = observer.subscribe();

    let mut last_percentage = None;
    let mut last_log_id = 0;
    let mut view = observer.view();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                observer.stop();
                break;
            }
        }

        view = updates.borrow_and_update().clone();
        for entry in view.logs.iter().rev().filter(|entry| entry.id > last_log_id) {
            println!(
                "  [{:?}] {} {}",
                entry.level,
                entry.item_key.as_deref().unwrap_or("-"),
                entry.message
            );
        }
        if let Some(newest) = view.logs.first() {
            last_log_id = last_log_id.max(newest.id);
        }
        if last_percentage != Some(view.percentage) {
            last_percentage = Some(view.percentage);
            println!(
                "{} {}% ({}/{}) eta {}",
                view.status_label,
                view.percentage,
                view.processed_items,
                view.total_items,
                view.eta_text
            );
        }
    }

    for entry in &view.recent_errors {
        println!("  error: {}", entry.message);
    }

    Ok(())
}
