//! End-to-end exercises of the episode lifecycle and training loop, driven
//! through the public library API rather than HTTP (the SSE stream endpoint
//! itself is exercised at the unit level in `events.rs`).

use lamarl_swarm::config::Config;
use lamarl_swarm::episode::EpisodeStore;
use lamarl_swarm::error::AppError;
use lamarl_swarm::events::EventKind;
use lamarl_swarm::training::{self, TrainConfig};
use std::time::Duration;

fn small_config() -> Config {
    Config { n_robot: 3, grid_size: 16, r_avoid: 0.1, n_hn: 2, n_hc: 4, ..Config::default() }
}

#[tokio::test]
async fn geometry_infeasible_config_is_rejected_at_creation() {
    let store = EpisodeStore::new();
    let cfg = Config { n_robot: 10_000, r_avoid: 5.0, grid_size: 16, ..Config::default() };
    let err = store.create(cfg).unwrap_err();
    assert!(matches!(err, AppError::GeometryInfeasible));
}

#[tokio::test]
async fn single_episode_run_emits_the_expected_tick_count() {
    let store = EpisodeStore::new();
    let episode = store.create(small_config()).unwrap();

    let cfg = TrainConfig { episodes: 1, episode_len: 40, use_llm: false, task_description: None, model: None };
    training::start(episode.clone(), cfg);

    // Let the spawned task run to completion; 40 steps of an in-memory loop
    // finish well within this budget.
    let mut waited = Duration::ZERO;
    loop {
        let events = episode.events_from(0);
        if events.iter().any(|e| matches!(e.kind, EventKind::EpisodeEnd { .. })) {
            break;
        }
        if waited > Duration::from_secs(5) {
            panic!("training did not finish in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    let events = episode.events_from(0);
    let tick_count = events.iter().filter(|e| matches!(e.kind, EventKind::Tick { .. })).count();
    // TICK_EVERY=20 over episode_len=40 fires at t=0 and t=20.
    assert_eq!(tick_count, 2);
    assert!(matches!(events.first().unwrap().kind, EventKind::EnvConfig { .. }));
    assert!(matches!(events.last().unwrap().kind, EventKind::EpisodeEnd { .. }));
}

#[tokio::test]
async fn stopping_before_the_loop_starts_prevents_any_episode_progress() {
    let store = EpisodeStore::new();
    let episode = store.create(small_config()).unwrap();

    let cfg = TrainConfig { episodes: 5, episode_len: 1000, use_llm: false, task_description: None, model: None };
    training::start(episode.clone(), cfg);
    // The spawned task cannot run before this (single-threaded) test task
    // yields, so this stop() is guaranteed to land before the loop's first
    // is_stopped() check.
    episode.stop();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = episode.events_from(0);
    assert!(events.iter().all(|e| matches!(e.kind, EventKind::EnvConfig { .. })));
    assert!(!events.iter().any(|e| matches!(e.kind, EventKind::EpisodeEnd { .. })));
}

#[tokio::test]
async fn unknown_episode_id_is_not_found() {
    let store = EpisodeStore::new();
    assert!(matches!(store.get("ep-missing"), Err(AppError::NotFound(_))));
}
