//! Process-level configuration, read once at startup from the environment.
//! Distinct from [`crate::config::Config`], which is per-episode and arrives
//! over the wire.

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub llm_endpoint: String,
    pub llm_timeout_ms: u64,
    pub log_filter: String,
    pub frontend_origin: Option<String>,
}

impl AppConfig {
    pub fn load() -> Self {
        AppConfig {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            llm_endpoint: std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| "http://localhost:11434/generate".to_string()),
            llm_timeout_ms: std::env::var("LLM_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(30_000),
            log_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            frontend_origin: std::env::var("FRONTEND_URL").ok(),
        }
    }
}
