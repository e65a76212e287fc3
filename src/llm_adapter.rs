//! Pluggable LLM backend used to turn a free-text task description into a
//! prior-policy document and a reward formula. The default implementation
//! posts to a configurable HTTP endpoint; tests and offline runs use
//! [`StaticAdapter`] instead.

use crate::dsl::{compile_reward_expr, prior, PriorDocument, RewardDocument};
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize)]
pub struct GenerateRequest {
    pub task_description: String,
    pub env_params: serde_json::Value,
    pub model: String,
    pub temperature: f32,
    pub use_cot: bool,
    pub use_basic_apis: bool,
}

#[derive(Clone, Debug)]
pub struct GenerateResponse {
    pub prior: PriorDocument,
    pub reward: RewardDocument,
    pub raw_model_output: String,
}

#[derive(Debug, Deserialize)]
struct RawGenerateResponse {
    prior: PriorDocument,
    reward: RewardDocument,
    #[serde(default)]
    raw_model_output: String,
}

#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, AppError>;

    /// Whether the backend is currently reachable; backs `/llm/health`.
    async fn health(&self) -> bool;
}

/// Default production adapter: a JSON POST to a configurable generation
/// endpoint, with both the prior document and the reward formula validated
/// before being handed back to the caller.
pub struct HttpLlmAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLlmAdapter {
    pub fn new(endpoint: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client configuration is static and always valid");
        HttpLlmAdapter { client, endpoint }
    }

    fn validate(raw: RawGenerateResponse) -> Result<GenerateResponse, AppError> {
        prior::validate(&raw.prior).map_err(|e| AppError::LlmRejected(e.to_string()))?;
        compile_reward_expr(&raw.reward).map_err(|e| AppError::LlmRejected(e.to_string()))?;
        Ok(GenerateResponse { prior: raw.prior, reward: raw.reward, raw_model_output: raw.raw_model_output })
    }
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, AppError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| AppError::LlmUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::LlmUnavailable(format!("provider returned status {}", resp.status())));
        }

        let raw: RawGenerateResponse = resp
            .json()
            .await
            .map_err(|e| AppError::LlmMalformed(e.to_string()))?;

        Self::validate(raw)
    }

    async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.endpoint.trim_end_matches("/generate")))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Canned-response adapter used in tests and local runs without a real LLM
/// provider configured. Ignores the request's model/temperature fields.
pub struct StaticAdapter {
    pub prior: PriorDocument,
    pub reward: RewardDocument,
}

impl Default for StaticAdapter {
    fn default() -> Self {
        StaticAdapter {
            prior: PriorDocument {
                terms: vec![prior::PriorTerm {
                    op: "move_to_shape_center".to_string(),
                    weight: 1.0,
                    radius: None,
                    cell_size: None,
                }],
                clamp: prior::ClampSpec::default(),
            },
            reward: RewardDocument { formula: "coverage - 0.1*collisions".to_string(), clamp: Default::default() },
        }
    }
}

#[async_trait]
impl LlmAdapter for StaticAdapter {
    async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse, AppError> {
        Ok(GenerateResponse {
            prior: self.prior.clone(),
            reward: self.reward.clone(),
            raw_model_output: "static adapter: no model was called".to_string(),
        })
    }

    async fn health(&self) -> bool {
        true
    }
}
