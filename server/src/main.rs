mod config;
mod db;
mod routes;
mod sessions;
mod state;
mod ws;

use std::time::Duration;

use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use sessions::store::SessionStore;
use state::{AppState, LivenessPolicy};
use ws::SessionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "whiteboard_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "whiteboard_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!(
        "Whiteboard server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize the SQLite session store
    let db = db::init_db(&config.data_dir)?;

    // Build application state
    let app_state = AppState {
        store: SessionStore::new(db),
        registry: SessionRegistry::new(),
        liveness: LivenessPolicy {
            idle_ping_interval: Duration::from_secs(config.idle_ping_secs),
        },
        cors_origin: config.cors_origin.clone(),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
