//! streamroll: rolling replacement of streaming-edge service instances.
//!
//! Two modes:
//! - `list`: print every catalog instance of a service with its tags and
//!   live connection count
//! - `update`: run the rolling-update controller until every instance
//!   carries the target image tag

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamroll_catalog::{HttpRegistry, ServiceRegistry};
use streamroll_scheduler::HttpScheduler;
use streamroll_updater::{
    render_status_url, DigestStatsClient, MachineCache, RollingUpdateController, StatsSource,
    UnitLifecycleOrchestrator, UpdateConfig,
};

#[derive(Parser)]
#[command(name = "streamroll", version, about = "Rolling replacement of streaming-edge service instances")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Service name in the registry catalog
    #[arg(long)]
    service: String,

    /// Registry datacenter
    #[arg(long, default_value = "")]
    dc: String,

    /// Registry API base URL
    #[arg(long, env = "STREAMROLL_REGISTRY_URL", default_value = "http://127.0.0.1:8500")]
    registry_url: String,

    /// Username for the metrics endpoint (digest auth)
    #[arg(long, env = "STREAMROLL_METRICS_USER", default_value = "admin")]
    metrics_user: String,

    /// Password for the metrics endpoint (digest auth)
    #[arg(long, env = "STREAMROLL_METRICS_PASSWORD", default_value = "admin")]
    metrics_password: String,

    /// Metrics URL template; {node}, {address} and {port} are substituted
    #[arg(
        long,
        default_value = "http://{node}:8087/v2/servers/_defaultServer_/status"
    )]
    status_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// List service instances with tags and live connection counts
    List,

    /// Run the rolling update until every instance carries the target image tag
    Update(UpdateArgs),
}

#[derive(Args)]
struct UpdateArgs {
    /// Image tag to roll the service to
    #[arg(long)]
    image: String,

    /// Directory of unit files
    #[arg(long, default_value = ".")]
    units_dir: PathBuf,

    /// Scheduler API base URL
    #[arg(long, env = "STREAMROLL_SCHEDULER_URL", default_value = "http://127.0.0.1:49153")]
    scheduler_url: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "streamroll failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let registry: Arc<dyn ServiceRegistry> = Arc::new(
        HttpRegistry::new(&cli.common.registry_url).context("initializing registry client")?,
    );
    let stats: Arc<dyn StatsSource> = Arc::new(
        DigestStatsClient::new(&cli.common.metrics_user, &cli.common.metrics_password)
            .context("initializing metrics client")?,
    );

    match cli.command {
        Command::List => list_instances(&cli.common, registry, stats).await,
        Command::Update(args) => run_update(&cli.common, args, registry, stats).await,
    }
}

async fn list_instances(
    common: &CommonArgs,
    registry: Arc<dyn ServiceRegistry>,
    stats: Arc<dyn StatsSource>,
) -> Result<()> {
    let instances = registry
        .list_instances(&common.service, &common.dc)
        .await
        .context("listing service instances")?;

    for instance in instances {
        // Best effort: an unreachable instance still gets listed.
        let url = render_status_url(&common.status_url, &instance);
        let connections = match stats.fetch(&url).await {
            Ok(s) => s.current_connections.to_string(),
            Err(_) => "?".to_string(),
        };
        println!(
            "[{}] node:{} lan:{} wan:{} tags:{:?} current_connections:{}",
            instance.service_name,
            instance.node,
            instance.tagged_addresses.get("lan").map_or("", |s| s),
            instance.tagged_addresses.get("wan").map_or("", |s| s),
            instance.tags,
            connections,
        );
    }
    Ok(())
}

async fn run_update(
    common: &CommonArgs,
    args: UpdateArgs,
    registry: Arc<dyn ServiceRegistry>,
    stats: Arc<dyn StatsSource>,
) -> Result<()> {
    let config = UpdateConfig {
        status_url_template: common.status_url.clone(),
        ..UpdateConfig::new(&common.service, &common.dc, &args.image, &args.units_dir)
    };

    // The template unit file is the source the service is recreated from;
    // refuse to start without it.
    let template = config.template_unit_path();
    if !template.is_file() {
        anyhow::bail!("template unit file not found: {}", template.display());
    }

    let scheduler = Arc::new(
        HttpScheduler::new(&args.scheduler_url).context("initializing scheduler client")?,
    );
    let machines = Arc::new(MachineCache::new(scheduler.clone()));
    let orchestrator = UnitLifecycleOrchestrator::new(
        scheduler.clone(),
        machines,
        config.state_poll_interval,
    );
    let controller = RollingUpdateController::new(
        registry,
        scheduler,
        stats,
        orchestrator,
        config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    controller.run(shutdown_rx).await?;
    Ok(())
}
