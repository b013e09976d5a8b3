//! Cache command - inspect the resource cache store

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::common::open_store;
use crate::config::Config;
use crate::db::StoredResourceCache;
use crate::error::ResfetchResult;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ResfetchResult<()> {
    match args.action {
        CacheAction::List { format } => list_caches(config, format).await,
    }
}

/// List all resource caches
async fn list_caches(config: &Config, format: OutputFormat) -> ResfetchResult<()> {
    let store = open_store(config).await?;
    let caches = store.list().await;

    if caches.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No resource caches found."),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_cache_table(&caches),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&caches)?),
        OutputFormat::Plain => print_cache_plain(&caches),
    }

    Ok(())
}

fn format_version(cache: &StoredResourceCache) -> String {
    cache
        .version
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn print_cache_table(caches: &[StoredResourceCache]) {
    println!(
        "{:<6} {:<16} {:<40} {:<8} {:<20}",
        style("ID").bold(),
        style("TYPE").bold(),
        style("VERSION").bold(),
        style("FIELDS").bold(),
        style("CREATED").bold()
    );
    println!("{}", "-".repeat(94));

    for cache in caches {
        let created = cache.created_at.format("%Y-%m-%d %H:%M").to_string();
        println!(
            "{:<6} {:<16} {:<40} {:<8} {:<20}",
            cache.id,
            cache.resource_type,
            format_version(cache),
            cache.metadata.len(),
            created
        );
    }

    println!();
    println!("Total: {} cache(s)", caches.len());
}

fn print_cache_plain(caches: &[StoredResourceCache]) {
    for cache in caches {
        println!("{} {} {}", cache.id, cache.resource_type, format_version(cache));
    }
}
