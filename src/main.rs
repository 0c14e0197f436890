use anyhow::{Context, Result, anyhow};
use clap::Parser;
use flashtopo::{
    FlashGroupManager, InMemoryConsensusSink, InMemoryIdAllocator, InMemoryNodeRegistry,
    TopologyConfig, web,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "flashtopo")]
#[command(about = "Flash group topology master with an in-memory metadata log")]
struct Cli {
    /// Admin/client HTTP listen address
    #[arg(long, default_value = "127.0.0.1:17010")]
    listen: String,

    /// Seconds since the last report after which a node is stale
    #[arg(long, default_value_t = 180)]
    node_timeout_secs: u64,

    /// Ring slots owned by each flash group
    #[arg(long, default_value_t = 32)]
    slots_per_group: usize,

    /// Random draws allowed per slot allocation
    #[arg(long, default_value_t = 4096)]
    slot_allocation_attempts: usize,

    /// Seconds an HTTP caller waits for a mutation
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> TopologyConfig {
        TopologyConfig::new()
            .listen_addr(&self.listen)
            .node_timeout(Duration::from_secs(self.node_timeout_secs))
            .slots_per_group(self.slots_per_group)
            .slot_allocation_attempts(self.slot_allocation_attempts)
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
    }
}

fn setup_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "flashtopo=info,tower_http=info",
        1 => "flashtopo=debug,tower_http=debug",
        _ => "flashtopo=trace,tower_http=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = cli.config();
    config.validate().map_err(|e| anyhow!(e))?;
    let listen_addr = config.listen_addr.clone();

    let manager = FlashGroupManager::new(
        config,
        Arc::new(InMemoryConsensusSink::new()),
        Arc::new(InMemoryNodeRegistry::new()),
        Arc::new(InMemoryIdAllocator::new()),
    )
    .context("failed to start flash group manager")?;
    let router = web::router(Arc::new(manager));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    tracing::info!("flash group master listening on http://{}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
