extern crate allocator;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nlds_cli_common::{init_logging, LogArgs, OrBail};
use nlds_fabric::PgFabric;
use nlds_transfer_put::{TransferPutSettings, Worker};

/// Streams a sub-transaction's filelist from POSIX to the object store
/// (spec §4.5).
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    log: LogArgs,

    #[clap(long, env = "NLDS_CONFIG", default_value = "/etc/nlds/server_config.yaml")]
    config: std::path::PathBuf,

    #[clap(long, default_value = "nlds-api.transfer-put")]
    queue: String,

    #[clap(long, default_value_t = 20)]
    prefetch: u32,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(&args.log);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
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

    let bindings = settings
        .fabric
        .queues
        .iter()
        .find(|q| q.name == args.queue)
        .map(|q| q.bindings.iter().map(|b| b.routing_key.clone()).collect::<Vec<_>>())
        .unwrap_or_else(|| vec!["*.transfer-put.*".to_string()]);

    for pattern in &bindings {
        fabric
            .declare_binding(&args.queue, pattern)
            .await
            .or_bail("declaring transfer-put queue binding");
    }

    let transfer_put_settings = TransferPutSettings {
        require_secure: settings.transfer_put_q.require_secure,
        max_retries: settings.general.max_retries,
        retry_delays: settings.general.retry_delays.clone(),
    };

    tracing::info!(queue = %args.queue, ?bindings, "transfer-put starting");

    let worker = Worker::new(Arc::new(fabric), transfer_put_settings, args.queue, args.prefetch);
    worker.run().await.context("transfer-put worker loop exited")
}
