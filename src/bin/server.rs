use lamarl_swarm::app_config::AppConfig;
use lamarl_swarm::episode::EpisodeStore;
use lamarl_swarm::http::{self, AppState};
use lamarl_swarm::llm_adapter::HttpLlmAdapter;
use lamarl_swarm::telemetry;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cfg = AppConfig::load();
    telemetry::init(&cfg.log_filter);

    let state = AppState {
        episodes: Arc::new(EpisodeStore::new()),
        llm: Arc::new(HttpLlmAdapter::new(cfg.llm_endpoint.clone(), cfg.llm_timeout_ms)),
    };
    let app = http::build(state, cfg.frontend_origin.clone());

    tracing::info!(addr = %cfg.bind_addr, "starting lamarl-swarm training service");
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await.expect("failed to bind address");
    axum::serve(listener, app).await.expect("server error");
}
