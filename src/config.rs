use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::server::protocol::DEFAULT_MAX_BODY_LEN;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub handler: HandlerConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            server: ServerConfig::load(),
            handler: HandlerConfig::load(),
        }
    }
}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub read_buffer_size: usize,
    pub max_body_len: u32,
    pub max_connections: usize,
}

impl ServerConfig {
    fn load() -> Self {
        let defaults = Self::default();
        Self {
            host:             get_env("RPC_HOST", defaults.host),
            port:             get_env("RPC_PORT", defaults.port),
            log_level:        get_env("RPC_LOG", defaults.log_level),
            read_buffer_size: get_env("RPC_READ_BUFFER_BYTES", defaults.read_buffer_size),
            max_body_len:     get_env("RPC_MAX_BODY_BYTES", defaults.max_body_len),
            max_connections:  get_env("RPC_MAX_CONNECTIONS", defaults.max_connections),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            log_level: "info".to_string(),
            read_buffer_size: 4096,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            max_connections: 10_000,
        }
    }
}

// HANDLER
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub max_sleep_ms: u64,
}

impl HandlerConfig {
    fn load() -> Self {
        Self {
            max_sleep_ms: get_env("RPC_HANDLER_MAX_SLEEP_MS", Self::default().max_sleep_ms),
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self { max_sleep_ms: 60_000 }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid config value, using default");
            default
        }),
        Err(_) => default,
    }
}
