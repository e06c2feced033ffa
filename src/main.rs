use tracing::{error, info};

use hoard::{Config, Hoard};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = hoard::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        hoard::logging::init_console_only(&config.logging);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("hoard - hierarchical file storage");

    let hoard = match Hoard::open(&config).await {
        Ok(hoard) => hoard,
        Err(e) => {
            error!(
                "Failed to open storage backend (database {}, root {}): {}",
                config.database.path, config.storage.root_path, e
            );
            std::process::exit(1);
        }
    };

    info!(
        schema_version = hoard.db().schema_version().await.unwrap_or_default(),
        storage_root = %hoard.storage().base_path().display(),
        max_upload_bytes = hoard.files().max_upload_size(),
        archive_chunk_bytes = hoard.settings().archive_chunk_bytes(),
        "Storage backend ready"
    );
}
