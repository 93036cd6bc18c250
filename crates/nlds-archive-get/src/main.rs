extern crate allocator;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use nlds_archive_get::{ArchiveGetSettings, Worker, DEFAULT_BINDINGS};
use nlds_cli_common::{init_logging, LogArgs, OrBail};
use nlds_fabric::PgFabric;
use nlds_tape::HttpTapeClient;

/// Stages and streams tape recalls back to the object store (spec §4.8).
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    log: LogArgs,

    #[clap(long, env = "NLDS_CONFIG", default_value = "/etc/nlds/server_config.yaml")]
    config: std::path::PathBuf,

    #[clap(long, default_value = "nlds-api.archive-get")]
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
    let fabric = Arc::new(PgFabric::new(pool));

    let bindings = settings
        .fabric
        .queues
        .iter()
        .find(|q| q.name == args.queue)
        .map(|q| q.bindings.iter().map(|b| b.routing_key.clone()).collect::<Vec<_>>())
        .unwrap_or_else(|| DEFAULT_BINDINGS.iter().map(|s| s.to_string()).collect());

    for pattern in &bindings {
        fabric
            .declare_binding(&args.queue, pattern)
            .await
            .or_bail("declaring archive-get queue binding");
    }

    let tape_url = url::Url::parse(&settings.archive_get_q.tape_url).context("parsing archive_get_q.tape_url")?;
    let tape = Arc::new(
        HttpTapeClient::new(tape_url, settings.archive_get_q.require_secure)
            .context("building the tape gateway client")?,
    );

    let archive_get_settings = ArchiveGetSettings {
        require_secure: settings.archive_get_q.require_secure,
        prepare_requeue: settings.archive_get_q.prepare_requeue,
    };

    tracing::info!(queue = %args.queue, ?bindings, "archive-get starting");

    let worker = Worker::new(fabric, tape, archive_get_settings, args.queue, args.prefetch);
    worker.run().await.context("archive-get worker loop exited")
}
