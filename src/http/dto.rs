//! Wire-format request/response bodies for the HTTP surface.

use crate::config::Config;
use crate::dsl::{PriorDocument, RewardDocument};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreateEpisodeRequest {
    #[serde(flatten)]
    pub config: Config,
}

#[derive(Serialize)]
pub struct CreateEpisodeResponse {
    pub id: String,
}

#[derive(Deserialize)]
pub struct TrainRequest {
    pub episode_id: String,
    #[serde(default = "default_episodes")]
    pub episodes: usize,
    #[serde(default = "default_episode_len")]
    pub episode_len: usize,
    #[serde(default)]
    pub use_llm: bool,
    #[serde(default)]
    pub task_description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_episodes() -> usize {
    10
}

fn default_episode_len() -> usize {
    200
}

#[derive(Serialize)]
pub struct TrainResponse {
    pub started: bool,
    pub use_llm: bool,
}

#[derive(Deserialize)]
pub struct StopQuery {
    pub episode_id: String,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub episode_id: String,
    pub stopped: bool,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub episode_id: String,
    #[serde(default)]
    pub cursor: usize,
}

#[derive(Deserialize)]
pub struct LlmGenerateRequest {
    pub task_description: String,
    #[serde(default)]
    pub env_params: serde_json::Value,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub use_cot: bool,
    #[serde(default = "default_true")]
    pub use_basic_apis: bool,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct LlmGenerateResponse {
    pub prior: PriorDocument,
    pub reward: RewardDocument,
    pub raw_model_output: String,
}

#[derive(Deserialize)]
pub struct LlmValidateRequest {
    pub prior: PriorDocument,
    pub reward: RewardDocument,
}

#[derive(Serialize)]
pub struct LlmValidateResponse {
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct LlmOperationsResponse {
    pub operations: Vec<OperationInfo>,
    pub metrics: Vec<MetricInfo>,
}

#[derive(Serialize)]
pub struct OperationInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [&'static str],
}

#[derive(Serialize)]
pub struct MetricInfo {
    pub name: &'static str,
    pub range: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct LlmHealthResponse {
    pub healthy: bool,
}
