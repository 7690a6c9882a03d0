//! vidlink: keeps a local download backend found, connected and in sync.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use vidlink_core::{BridgeConfig, DataPaths};
use vidlink_runtime::Bridge;
use vidlink_store::SqliteStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("VIDLINK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("vidlink: bridge to a local video download backend");
    println!();
    println!("Usage: vidlink [command]");
    println!();
    println!("Commands:");
    println!("  run (default)                  Discover the backend and keep it in sync");
    println!("  discover [--force]             Find the backend port once");
    println!("  status                         Show connection and queue state");
    println!("  submit <url> [quality] [fmt]   Submit a download");
    println!("  help                           Show this help message");
}

fn open_bridge() -> anyhow::Result<Arc<Bridge>> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let paths = DataPaths::new(&data_dir)?;
    let config = BridgeConfig::from_env()?;
    let store = SqliteStore::open(&paths.store_file)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    Ok(Bridge::new(config, Arc::new(store))?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "run" => {
            let bridge = open_bridge()?;
            commands::run(bridge).await
        }
        "discover" => {
            let force = args.iter().skip(2).any(|a| a == "--force" || a == "-f");
            let bridge = open_bridge()?;
            let found = commands::discover(&bridge, force).await;
            std::process::exit(if found { 0 } else { 1 });
        }
        "status" => {
            let bridge = open_bridge()?;
            commands::status(&bridge).await
        }
        "submit" => {
            let Some(url) = args.get(2) else {
                eprintln!("Usage: vidlink submit <url> [quality] [format]");
                std::process::exit(1);
            };
            let bridge = open_bridge()?;
            let accepted = commands::submit(
                &bridge,
                url,
                args.get(3).map(String::as_str),
                args.get(4).map(String::as_str),
            )
            .await?;
            std::process::exit(if accepted { 0 } else { 1 });
        }
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'vidlink help' for usage.", other);
            std::process::exit(1);
        }
    }
}
