//! HTTP surface tests for the non-streaming endpoints, exercised with
//! `tower::ServiceExt::oneshot` against the router directly (no bound port).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use lamarl_swarm::episode::EpisodeStore;
use lamarl_swarm::http::{self, AppState};
use lamarl_swarm::llm_adapter::StaticAdapter;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> axum::Router {
    let state = AppState { episodes: Arc::new(EpisodeStore::new()), llm: Arc::new(StaticAdapter::default()) };
    http::build(state, None)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn creating_an_episode_returns_an_id_and_training_can_be_started_and_stopped() {
    let app = app();

    let create_req = Request::builder()
        .method("POST")
        .uri("/episodes")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"shape": "circle", "n_robot": 4, "grid_size": 16})).unwrap()))
        .unwrap();
    let create_resp = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(create_resp.status(), StatusCode::OK);
    let created = body_json(create_resp).await;
    let episode_id = created["id"].as_str().unwrap().to_string();
    assert!(episode_id.starts_with("ep-"));

    let train_req = Request::builder()
        .method("POST")
        .uri("/train")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"episode_id": episode_id, "episodes": 1, "episode_len": 10})).unwrap()))
        .unwrap();
    let train_resp = app.clone().oneshot(train_req).await.unwrap();
    assert_eq!(train_resp.status(), StatusCode::OK);
    let trained = body_json(train_resp).await;
    assert_eq!(trained["started"], true);
    assert_eq!(trained["use_llm"], false);

    let stop_req = Request::builder()
        .method("POST")
        .uri(format!("/stop?episode_id={episode_id}"))
        .body(Body::empty())
        .unwrap();
    let stop_resp = app.clone().oneshot(stop_req).await.unwrap();
    assert_eq!(stop_resp.status(), StatusCode::OK);
    let stopped = body_json(stop_resp).await;
    assert_eq!(stopped["stopped"], true);
}

#[tokio::test]
async fn training_an_unknown_episode_is_a_404() {
    let req = Request::builder()
        .method("POST")
        .uri("/train")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"episode_id": "ep-does-not-exist"})).unwrap()))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn llm_operations_lists_the_five_whitelisted_ops() {
    let resp = app().oneshot(Request::builder().uri("/llm/operations").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["operations"].as_array().unwrap().len(), 5);
    assert_eq!(body["metrics"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn llm_validate_rejects_a_disallowed_reward_formula() {
    let req = Request::builder()
        .method("POST")
        .uri("/llm/validate")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "prior": {"terms": [], "clamp": {"max_speed": 0.5}},
                "reward": {"formula": "__import__('os').system('rm -rf /')", "clamp": {"min": -1.0, "max": 1.0}}
            }))
            .unwrap(),
        ))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn llm_validate_accepts_a_whitelisted_document() {
    let req = Request::builder()
        .method("POST")
        .uri("/llm/validate")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "prior": {"terms": [{"op": "move_to_shape_center", "weight": 0.8}], "clamp": {"max_speed": 0.5}},
                "reward": {"formula": "coverage - 0.1*collisions"}
            }))
            .unwrap(),
        ))
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["valid"], true);
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn llm_health_reports_the_static_adapter_as_healthy() {
    let resp = app().oneshot(Request::builder().uri("/llm/health").body(Body::empty()).unwrap()).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["healthy"], true);
}
