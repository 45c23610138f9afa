use anyhow::Context;
use clap::Parser;
use pingora::server::configuration::Opt;
use pingora::server::Server;
use std::path::PathBuf;

use reelcache::cache::{ContentAddressResolver, DiskCacheStore};
use reelcache::config::Config;
use reelcache::proxy::{AssetKind, ReelcacheProxy};

/// Reelcache - disk-backed video/image caching proxy built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "reelcache")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,

    /// Remove one cached asset by its logical filename, then exit
    #[arg(long, value_name = "FILENAME")]
    purge: Option<String>,

    /// Asset family for --purge (video or image)
    #[arg(long, default_value = "video")]
    kind: AssetKind,

    /// Remove every cached asset, then exit
    #[arg(long, conflicts_with = "purge")]
    purge_all: bool,

    /// Print cache usage as JSON, then exit
    #[arg(long)]
    stats: bool,
}

impl Args {
    fn is_maintenance(&self) -> bool {
        self.purge.is_some() || self.purge_all || self.stats
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    reelcache::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        cache_dir = %config.cache.dir,
        origin = %config.origin.host(),
        "Configuration loaded successfully"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build setup runtime")?;

    if args.is_maintenance() {
        return runtime.block_on(run_maintenance(&args, &config));
    }

    // Opening the store scans the cache directory; do it once before the
    // listener starts
    let proxy = runtime
        .block_on(ReelcacheProxy::from_config(&config))
        .context("failed to initialize proxy")?;
    drop(runtime);

    let opt = Opt {
        daemon: args.daemon,
        test: args.test,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt))
        .map_err(|e| anyhow::anyhow!("failed to create Pingora server: {}", e))?;
    server.bootstrap();

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.threads = Some(config.server.threads);

    let listen_addr = config.server.listen_addr();
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(
        address = %listen_addr,
        threads = config.server.threads,
        "Starting Reelcache proxy"
    );

    server.add_service(proxy_service);
    server.run_forever();
}

async fn run_maintenance(args: &Args, config: &Config) -> anyhow::Result<()> {
    let store = DiskCacheStore::from_config(&config.cache)
        .await
        .context("failed to open cache store")?;

    if let Some(filename) = &args.purge {
        let namespace = match args.kind {
            AssetKind::Video => &config.origin.video_bucket,
            AssetKind::Image => &config.origin.image_bucket,
        };
        let key = ContentAddressResolver::new(namespace.as_str()).resolve(filename);
        let removed = store.remove(&key).await.context("failed to purge entry")?;
        tracing::info!(filename = %filename, key = %key, removed, "Purge finished");
        println!("{}", serde_json::json!({ "filename": filename, "key": key.to_string(), "removed": removed }));
    }

    if args.purge_all {
        let removed = store.clear().await.context("failed to clear cache")?;
        println!("{}", serde_json::json!({ "removed": removed }));
    }

    if args.stats {
        let stats = store.stats().await.context("failed to read cache stats")?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
