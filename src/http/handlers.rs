//! Request handlers. Thin by design: validation and orchestration logic
//! lives in `episode`, `training`, and `dsl`; handlers just translate
//! between the wire format and those calls.

use super::dto::*;
use crate::dsl::{compile_prior_doc, compile_reward_expr};
use crate::episode::EpisodeStore;
use crate::error::AppError;
use crate::llm_adapter::{GenerateRequest, LlmAdapter};
use crate::training::{self, TrainConfig};
use axum::extract::{Query, State};
use axum::response::sse::Event as SseEvent;
use axum::response::Sse;
use axum::Json;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub episodes: Arc<EpisodeStore>,
    pub llm: Arc<dyn LlmAdapter>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn create_episode(
    State(state): State<AppState>,
    Json(req): Json<CreateEpisodeRequest>,
) -> Result<Json<CreateEpisodeResponse>, AppError> {
    let episode = state.episodes.create(req.config)?;
    Ok(Json(CreateEpisodeResponse { id: episode.id.clone() }))
}

/// DSL generation, when requested, runs to completion here -- before the
/// training loop is spawned -- so a generation or post-validation failure
/// surfaces as the request's own error response rather than being lost
/// inside a background task.
pub async fn train(State(state): State<AppState>, Json(req): Json<TrainRequest>) -> Result<Json<TrainResponse>, AppError> {
    let episode = state.episodes.get(&req.episode_id)?;

    if req.use_llm {
        training::install_llm_policy(
            &episode,
            req.task_description.clone().unwrap_or_default(),
            req.model.clone(),
            state.llm.as_ref(),
        )
        .await?;
    }

    let cfg = TrainConfig {
        episodes: req.episodes,
        episode_len: req.episode_len,
        use_llm: req.use_llm,
        task_description: req.task_description,
        model: req.model,
    };
    training::start(episode, cfg);
    Ok(Json(TrainResponse { started: true, use_llm: req.use_llm }))
}

pub async fn stop(State(state): State<AppState>, Query(q): Query<StopQuery>) -> Result<Json<StopResponse>, AppError> {
    let episode = state.episodes.get(&q.episode_id)?;
    episode.stop();
    Ok(Json(StopResponse { episode_id: q.episode_id, stopped: true }))
}

pub async fn stream(
    State(state): State<AppState>,
    Query(q): Query<StreamQuery>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let episode = state.episodes.get(&q.episode_id)?;
    let read_episode = episode.clone();
    Ok(crate::events::sse_stream(
        q.cursor,
        move |cursor| read_episode.events_from(cursor),
        move || episode.is_stopped(),
    ))
}

pub async fn llm_generate(
    State(state): State<AppState>,
    Json(req): Json<LlmGenerateRequest>,
) -> Result<Json<LlmGenerateResponse>, AppError> {
    let request = GenerateRequest {
        task_description: req.task_description,
        env_params: req.env_params,
        model: req.model,
        temperature: req.temperature,
        use_cot: req.use_cot,
        use_basic_apis: req.use_basic_apis,
    };
    let resp = state.llm.generate(&request).await?;
    Ok(Json(LlmGenerateResponse { prior: resp.prior, reward: resp.reward, raw_model_output: resp.raw_model_output }))
}

pub async fn llm_validate(Json(req): Json<LlmValidateRequest>) -> Json<LlmValidateResponse> {
    let result = compile_prior_doc(&req.prior).and(compile_reward_expr(&req.reward).map(|_| ()));
    match result {
        Ok(()) => Json(LlmValidateResponse { valid: true, error: None }),
        Err(e) => Json(LlmValidateResponse { valid: false, error: Some(e.to_string()) }),
    }
}

pub async fn llm_operations() -> Json<LlmOperationsResponse> {
    Json(LlmOperationsResponse {
        operations: vec![
            OperationInfo {
                name: "move_to_shape_center",
                description: "Steers toward the target shape's centroid.",
                parameters: &["weight"],
            },
            OperationInfo {
                name: "avoid_neighbors",
                description: "Repels from neighbors within a radius.",
                parameters: &["weight", "radius"],
            },
            OperationInfo {
                name: "keep_grid_uniformity",
                description: "Pulls gently toward the local neighbor centroid.",
                parameters: &["weight"],
            },
            OperationInfo {
                name: "synchronize_velocity",
                description: "Matches the mean neighbor velocity.",
                parameters: &["weight"],
            },
            OperationInfo {
                name: "explore_empty_cells",
                description: "Steers toward the nearest unoccupied shape cell.",
                parameters: &["weight", "cell_size"],
            },
        ],
        metrics: vec![
            MetricInfo { name: "coverage", range: "[0,1]" },
            MetricInfo { name: "uniformity", range: "[0,inf), alias variance" },
            MetricInfo { name: "collisions", range: "[0,inf)" },
        ],
    })
}

pub async fn llm_health(State(state): State<AppState>) -> Json<LlmHealthResponse> {
    Json(LlmHealthResponse { healthy: state.llm.health().await })
}
