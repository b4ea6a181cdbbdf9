use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Collaborative whiteboard relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "whiteboard-server", version, about = "Collaborative whiteboard relay server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "WHITEBOARD_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "WHITEBOARD_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./whiteboard.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "WHITEBOARD_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the SQLite session store
    #[arg(long, env = "WHITEBOARD_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Allowed CORS origin for the browser client
    #[arg(long, env = "WHITEBOARD_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Seconds of inbound silence before a liveness ping is sent on a
    /// WebSocket connection
    #[arg(long, env = "WHITEBOARD_IDLE_PING_SECS", default_value = "60")]
    pub idle_ping_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./whiteboard.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            idle_ping_secs: 60,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (WHITEBOARD_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("WHITEBOARD_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Collaborative Whiteboard Server Configuration
# Place this file at ./whiteboard.toml or specify with --config <path>
# All settings can be overridden via environment variables (WHITEBOARD_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite session store
# data_dir = "./data"

# Allowed CORS origin for the browser client
# cors_origin = "http://localhost:3000"

# Seconds of inbound silence before a liveness ping is sent on a
# WebSocket connection. The ping is a probe, not a deadline: a client is
# only disconnected when the transport itself fails.
# idle_ping_secs = 60
"#
    .to_string()
}
