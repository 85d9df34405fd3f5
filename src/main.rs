use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use marginalia::config::{Cli, Config, default_config_path};
use marginalia::extract::{self, RawExport};
use marginalia::store::HttpStoreClient;
use marginalia::sync::Synchronizer;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    tracing_subscriber::fmt().json().init();
    tracing::info!("marginalia starting");

    let config_path = args
        .config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });

    let body = match &args.input {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = %path, "failed to read input");
            std::process::exit(1);
        }),
        None => {
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                tracing::error!(error = %e, "failed to read stdin");
                std::process::exit(1);
            }
            buffer
        }
    };
    let attachment = args.attachment.as_ref().map(|path| {
        std::fs::read_to_string(path).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = %path, "failed to read attachment");
            std::process::exit(1);
        })
    });
    let raw = RawExport { body, attachment };

    let submissions = extract::extract_all(&raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to parse input");
        std::process::exit(1);
    });
    if submissions.is_empty() {
        tracing::warn!("no reader recognized the input, nothing to synchronize");
        return;
    }
    tracing::info!(submissions = submissions.len(), "parsed input");

    let store = HttpStoreClient::new(&cfg).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to set up store client");
        std::process::exit(1);
    });

    let mut synchronizer = Synchronizer::new(&store);
    if let Err(e) = synchronizer.synchronize(&submissions).await {
        tracing::error!(error = %format!("{:#}", e), "synchronization failed");
        std::process::exit(1);
    }

    let stats = synchronizer.stats();
    tracing::info!(
        books_created = stats.books_created,
        highlights_created = stats.created,
        duplicates_filtered = stats.filtered,
        "synchronization complete"
    );
}
