//! Environment-driven configuration
//!
//! Everything is optional except the port: missing webhook URLs fall back to
//! the mock gateways and a missing DATABASE_URL falls back to the in-memory
//! store, so the binary stays runnable without any external service.

#[derive(Debug, Clone)]
pub struct Config {
    pub classification_webhook_url: Option<String>,
    pub answer_webhook_url: Option<String>,
    pub database_url: Option<String>,
    pub port: u16,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load from the process environment, reading `.env` first.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("API_PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Self {
            classification_webhook_url: non_empty("CLASSIFICATION_WEBHOOK_URL"),
            answer_webhook_url: non_empty("ANSWER_WEBHOOK_URL"),
            database_url: non_empty("DATABASE_URL"),
            port,
        }
    }
}
