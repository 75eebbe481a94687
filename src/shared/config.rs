use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared signing secret for the identity provider's webhook
    /// deliveries, `whsec_`-prefixed base64.
    pub signing_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                bind: env::var("SERVER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            webhook: WebhookConfig {
                signing_secret: env::var("WEBHOOK_SIGNING_SECRET")?,
            },
            session: SessionConfig {
                jwt_secret: env::var("SESSION_JWT_SECRET")?,
            },
        })
    }
}
