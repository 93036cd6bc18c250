extern crate allocator;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use nlds_catalog::permissions::AlwaysUser;
use nlds_catalog::{ArchiveNextSettings, CatalogSettings, CatalogStore, Worker, DEFAULT_BINDINGS};
use nlds_cli_common::{init_logging, LogArgs, OrBail};
use nlds_fabric::PgFabric;

/// Serialises every catalog operation (spec §4.4) through a single
/// consumer, plus the out-of-band periodic trigger that seeds
/// `archive-put` from tape-less files.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(flatten)]
    log: LogArgs,

    #[clap(long, env = "NLDS_CONFIG", default_value = "/etc/nlds/server_config.yaml")]
    config: std::path::PathBuf,

    #[clap(long, default_value = "nlds-api.catalog")]
    queue: String,

    #[clap(long, default_value_t = 1)]
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

    let catalog_pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&settings.catalog_q.db_options)
        .await
        .context("connecting to the catalog database")?;
    let store = CatalogStore::new(catalog_pool);

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
            .or_bail("declaring catalog queue binding");
    }

    tracing::info!(queue = %args.queue, ?bindings, "catalog starting");

    let worker = Worker::new(
        fabric.clone(),
        store.clone(),
        CatalogSettings { full_unpack: settings.catalog_q.full_unpack },
        Arc::new(AlwaysUser),
        args.queue.clone(),
        args.prefetch,
    );

    let archive_next_settings = ArchiveNextSettings {
        application: args.queue.split('.').next().unwrap_or("nlds-api").to_string(),
        tenancy: settings.catalog_q.default_tenancy.clone(),
        access_key: settings.catalog_q.system_access_key.clone(),
        secret_key: settings.catalog_q.system_secret_key.clone(),
        interval: settings.catalog_q.archive_next_interval,
    };

    let periodic = tokio::spawn(nlds_catalog::run_archive_next(fabric, Arc::new(store), archive_next_settings));

    tokio::select! {
        result = worker.run() => result.context("catalog worker loop exited"),
        result = periodic => {
            result.context("catalog-archive-next task panicked")?.context("catalog-archive-next task exited")
        }
    }
}
