use anyhow::Result;
use clap::{Parser, Subcommand};
use pact_storage::{CacheStore, JsonFileCacheStore};
use pact_sync::{SyncConfig, SyncReport};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pact-cli")]
#[command(about = "PACT command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync cycle against the configured agreement source.
    Sync,
    /// Print a summary of the persisted cache.
    Cache,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => match pact_sync::run_sync_once_from_env().await? {
            SyncReport::Completed {
                agreement_count,
                conflict_count,
                elapsed_seconds,
                last_sync_time,
                used_sample_data,
            } => {
                println!(
                    "sync complete: agreements={agreement_count} conflicts={conflict_count} elapsed={elapsed_seconds:.2}s synced_at={last_sync_time}"
                );
                if used_sample_data {
                    println!("note: live fetch failed; results come from the sample dataset");
                }
            }
            SyncReport::Failed { error, using_cache } => {
                eprintln!("sync failed: {error}");
                if using_cache {
                    eprintln!("a previously cached result remains available");
                }
                std::process::exit(1);
            }
        },
        Commands::Cache => {
            let config = SyncConfig::from_env();
            let store = JsonFileCacheStore::new(config.cache_path);
            match store.load().await? {
                Some(cache) => {
                    println!(
                        "cached: agreements={} conflicts={} last_sync={}",
                        cache.agreements.len(),
                        cache.conflicts.len(),
                        cache.last_sync_time
                    );
                    for conflict in &cache.conflicts {
                        println!(
                            "  conflict [{:?}] {} <-> {} territories={:?} products={:?}",
                            conflict.severity,
                            conflict.agreement_a_name,
                            conflict.agreement_b_name,
                            conflict.overlapping_territories,
                            conflict.overlapping_products
                        );
                    }
                }
                None => println!("no cache at {}", store.path().display()),
            }
        }
    }

    Ok(())
}
