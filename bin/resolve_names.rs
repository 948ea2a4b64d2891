//! # Plant Name Resolver CLI
//!
//! Resolves plant names as of a given block, using the same cache, cutover
//! and retry policy the indexer handlers use.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin resolve_names -- --block 15200000 42
//! cargo run --bin resolve_names -- --block 15200000 --network 8453 1 2 3
//! ```
//!
//! One JSON line is printed per id, in argument order.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::U256;
use pixotchi_name_indexer::{
    metrics,
    name_cache::NameCache,
    name_source::PooledNameSource,
    resolver::{NameResolver, ResolutionOutcome},
    rpc_pool::RpcPool,
    settings::{LogSettings, Settings},
};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "resolve_names", about = "Resolve Pixotchi plant names at a block")]
struct Args {
    /// Block height the lookup is evaluated at
    #[arg(long)]
    block: u64,

    /// Chain id; defaults to chain.chain_id from Config.toml
    #[arg(long)]
    network: Option<u64>,

    /// Path to the configuration file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Plant ids (decimal)
    #[arg(required = true)]
    ids: Vec<String>,
}

fn init_logging(log: &LogSettings) {
    #[cfg(feature = "observability")]
    {
        if log.format == pixotchi_name_indexer::settings::LogFormat::Json {
            let level = log.level.parse().unwrap_or(tracing::Level::INFO);
            tracing_subscriber::fmt().json().with_max_level(level).init();
            return;
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log.level)).init();
}

fn parse_ids(raw: &[String]) -> Result<Vec<U256>> {
    raw.iter()
        .map(|s| {
            U256::from_dec_str(s.trim()).with_context(|| format!("invalid plant id {:?}", s))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let settings = Settings::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;
    init_logging(&settings.log);
    settings.validate()?;

    #[cfg(feature = "observability")]
    {
        if settings.metrics.enabled {
            metrics::install_prometheus_exporter(settings.metrics.port)?;
        }
    }
    metrics::describe_metrics();

    let ids = parse_ids(&args.ids)?;
    let network = args.network.unwrap_or(settings.chain.chain_id);

    let rpc_pool = Arc::new(RpcPool::new(&settings)?);
    let source = PooledNameSource::new(
        rpc_pool,
        settings.contracts.plant_nft_address()?,
        settings.contracts.multicall_address()?,
        settings.name_resolver.multicall_batch_size,
    );

    let cache = Arc::new(NameCache::new(settings.name_resolver.cache_ttl()));
    let sweeper = cache.spawn_sweeper();
    let resolver = NameResolver::from_settings(source, Arc::clone(&cache), &settings);

    let outcomes = if ids.len() == 1 {
        vec![resolver.resolve_one_traced(network, ids[0], args.block).await]
    } else {
        resolver.resolve_many_traced(network, &ids, args.block).await
    };

    for (id, outcome) in ids.iter().zip(&outcomes) {
        let kind = match outcome {
            ResolutionOutcome::CacheHit(_) => "cache_hit".to_string(),
            ResolutionOutcome::Resolved(_) => "resolved".to_string(),
            ResolutionOutcome::Fallback(_, reason) => format!("fallback ({:?})", reason),
        };
        println!(
            "{}",
            serde_json::json!({
                "network": network,
                "block": args.block,
                "id": id.to_string(),
                "name": outcome.name(),
                "outcome": kind,
            })
        );
    }

    sweeper.shutdown().await;
    Ok(())
}
