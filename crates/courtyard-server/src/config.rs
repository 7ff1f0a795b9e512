//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `COURTYARD_BIND_ADDR`: HTTP bind address. Default: `0.0.0.0:3000`
//! - `COURTYARD_TOKEN_SECRET`: HS256 secret used to validate WebSocket
//!   upgrade tokens. Default: a development-only value.
//! - `COURTYARD_CORS_ORIGINS`: comma-separated allowed origins. Unset or
//!   empty means permissive CORS (suitable for development).

use std::net::SocketAddr;
use tracing::{info, warn};

const DEV_TOKEN_SECRET: &str = "courtyard-dev-secret";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind_addr: SocketAddr,
    /// Secret for validating WebSocket upgrade tokens
    pub token_secret: String,
    /// Explicit CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".parse().expect("Valid default address"),
            token_secret: DEV_TOKEN_SECRET.to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("COURTYARD_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .unwrap_or_else(|_| "0.0.0.0:3000".parse().expect("Valid fallback address"));

        let token_secret = std::env::var("COURTYARD_TOKEN_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(|| DEV_TOKEN_SECRET.to_string());

        let cors_origins = std::env::var("COURTYARD_CORS_ORIGINS")
            .map(|origins| parse_origins(&origins))
            .unwrap_or_default();

        Self {
            bind_addr,
            token_secret,
            cors_origins,
        }
    }

    /// Whether the built-in development secret is in use.
    pub fn is_dev_secret(&self) -> bool {
        self.token_secret == DEV_TOKEN_SECRET
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);

        if self.is_dev_secret() {
            warn!(
                "Using the built-in development token secret; set COURTYARD_TOKEN_SECRET in production"
            );
        }

        if self.cors_origins.is_empty() {
            info!("CORS: permissive (development)");
        } else {
            info!(origins = ?self.cors_origins, "CORS: explicit origin list");
        }
    }

    /// Create a test configuration.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().expect("Valid test address"),
            token_secret: "test-secret-long-enough-for-hs256".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.token_secret, DEV_TOKEN_SECRET);
        assert!(config.is_dev_secret());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_explicit_secret_is_not_dev_secret() {
        let config = ServerConfig::test_config();
        assert!(!config.is_dev_secret());
    }

    #[test]
    fn test_parse_origins_splits_and_trims() {
        let origins = parse_origins("https://portal.example.com, https://admin.example.com ,");
        assert_eq!(
            origins,
            vec![
                "https://portal.example.com".to_string(),
                "https://admin.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_origins_empty_input() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins(" , ,").is_empty());
    }
}
