use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;
use crate::webhooks::processor::EventProcessor;
use crate::webhooks::verify::WebhookVerifier;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub verifier: WebhookVerifier,
    pub processor: EventProcessor,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let verifier = WebhookVerifier::new(&config.webhook.signing_secret)?;
        let processor = EventProcessor::new(conn.clone());
        Ok(Self {
            conn,
            config,
            verifier,
            processor,
        })
    }
}
