extern crate allocator;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nlds_cli_common::{init_logging, LogArgs, OrBail};
use nlds_fabric::PgFabric;

/// Routes completed/failed sub-transaction messages to the next stage in
/// the pipeline, per the transition table between worker queues.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    log: LogArgs,

    /// Path to the NLDS YAML configuration file.
    #[clap(long, env = "NLDS_CONFIG", default_value = "/etc/nlds/server_config.yaml")]
    config: std::path::PathBuf,

    /// Name of the queue this worker consumes from.
    #[clap(long, default_value = "nlds-api.marshaller")]
    queue: String,

    /// Maximum number of deliveries claimed per fabric poll.
    #[clap(long, default_value_t = 20)]
    prefetch: u32,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(&args.log);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async_main(args));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    let settings = nlds_config::Settings::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let fabric_url = format!(
        "postgres://{}:{}@{}/{}",
        settings.fabric.user,
        settings.fabric.password,
        settings.fabric.server,
        settings.fabric.vhost.trim_start_matches('/').replace('/', "_"),
    );
    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&fabric_url)
        .await
        .context("connecting to the fabric's backing database")?;

    let fabric = PgFabric::new(pool);

    let monitor_pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&settings.monitor_q.db_options)
        .await
        .context("connecting to the monitor database")?;
    let monitor = nlds_monitor::MonitorStore::new(monitor_pool);

    let bindings = settings
        .fabric
        .queues
        .iter()
        .find(|q| q.name == args.queue)
        .map(|q| {
            q.bindings
                .iter()
                .map(|b| b.routing_key.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| nlds_marshaller::DEFAULT_BINDINGS.iter().map(|s| s.to_string()).collect());

    for pattern in &bindings {
        fabric
            .declare_binding(&args.queue, pattern)
            .await
            .or_bail("declaring marshaller queue binding");
    }

    tracing::info!(queue = %args.queue, ?bindings, "marshaller starting");

    let worker = nlds_marshaller::Worker::new(Arc::new(fabric), monitor, args.queue, args.prefetch);
    worker.run().await.context("marshaller worker loop exited")
}
