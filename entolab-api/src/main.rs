//! entolab-api - Forensic Entomology Case Service
//!
//! HTTP REST + SSE service for managing forensic cases: specimen image
//! uploads, insect life-stage detection and annotation, and post-mortem
//! interval estimation from accumulated degree hours.

use anyhow::Result;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use entolab_api::services::detector_client::DetectorClient;
use entolab_api::services::storage::ObjectStorage;
use entolab_api::AppState;
use entolab_common::events::EventBus;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting entolab-api (Forensic Entomology Case Service)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve root folder (CLI arg > ENV > TOML > default)
    let cli_root = std::env::args().nth(1);
    let root_folder = entolab_common::config::resolve_root_folder(cli_root.as_deref(), "ENTOLAB_ROOT");

    // Step 2: Create root folder directory if missing
    entolab_common::config::ensure_root_folder(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    // Step 3: Open or create database
    let db_path = entolab_common::config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = entolab_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 4: Load service configuration
    let toml_config = match entolab_common::config::load_toml_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("No TOML config loaded ({}); using environment and defaults", e);
            entolab_common::config::TomlConfig::default()
        }
    };
    let service_config = entolab_api::config::ServiceConfig::resolve(&toml_config)?;

    // Step 5: Detection service client (API key: Database > ENV > TOML)
    let api_key =
        entolab_api::config::resolve_detector_api_key(&db_pool, &toml_config).await?;
    if api_key.is_none() {
        warn!("No detector API key configured; detection runs may be rejected");
    }
    let detector = DetectorClient::new(service_config.detector_url.clone(), api_key)
        .map_err(|e| anyhow::anyhow!("Failed to build detector client: {}", e))?;

    // Step 6: Object storage backend
    let storage = ObjectStorage::new(&service_config.storage)
        .map_err(|e| anyhow::anyhow!("Failed to configure object storage: {}", e))?;
    info!("Object storage configured");

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(100); // 100 event capacity
    info!("Event bus initialized");

    // Create application state
    let state = AppState::new(db_pool, event_bus, storage, detector);

    // Build router
    let app = entolab_api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&service_config.bind_address).await?;
    info!("Listening on http://{}", service_config.bind_address);
    info!("Health check: http://{}/health", service_config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
