//! Episode telemetry: the envelope types appended to an episode's timeline,
//! and the SSE stream that replays them to a connected client.

use async_stream::stream;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;

/// Timeline is truncated back to this many most-recent entries once it
/// passes `TRUNCATE_AT`, keeping the in-memory footprint of a long-running
/// episode bounded without ever re-emitting an already-delivered entry.
pub const TRUNCATE_KEEP: usize = 200;
pub const TRUNCATE_AT: usize = 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    EnvConfig {
        shape: String,
        n_robot: usize,
        r_sense: f32,
        r_avoid: f32,
        grid_size: usize,
        l_cell: f32,
        use_llm: bool,
    },
    Tick {
        episode: usize,
        step: usize,
        global_step: usize,
        reward_mean: f64,
        coverage: f64,
        uniformity: f64,
        positions: Vec<(f32, f32)>,
        velocities: Vec<(f32, f32)>,
        collision_pairs: Vec<(usize, usize)>,
    },
    EpisodeEnd {
        episode: usize,
        step: usize,
        coverage: f64,
        uniformity: f64,
        final_positions: Vec<(f32, f32)>,
        final_velocities: Vec<(f32, f32)>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct EventEnvelope {
    pub global_step: usize,
    pub kind: EventKind,
}

/// Appends `env`, truncating the oldest entries to [`TRUNCATE_KEEP`] once the
/// timeline has grown past [`TRUNCATE_AT`]. Truncation only ever drops
/// entries a streamer has already seen (the streamer's own cursor never
/// rewinds), so no event is re-delivered.
pub fn push_and_truncate(timeline: &mut Vec<EventEnvelope>, env: EventEnvelope) {
    timeline.push(env);
    if timeline.len() > TRUNCATE_AT {
        let drop = timeline.len() - TRUNCATE_KEEP;
        timeline.drain(0..drop);
    }
}

/// Polls `read_from` every 50ms for entries whose `global_step` is at least
/// `cursor`, streams them as SSE `data:` frames, and stops once
/// `stopped` returns true and no further entries are pending.
pub fn sse_stream<F, G>(
    mut cursor: usize,
    read_from: F,
    stopped: G,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>>
where
    F: Fn(usize) -> Vec<EventEnvelope> + Send + 'static,
    G: Fn() -> bool + Send + 'static,
{
    let s = stream! {
        loop {
            let batch = read_from(cursor);
            if batch.is_empty() {
                if stopped() {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            for envelope in batch {
                cursor = envelope.global_step + 1;
                let payload = serde_json::to_string(&envelope).unwrap_or_default();
                yield Ok(SseEvent::default().data(payload));
            }
        }
    };
    Sse::new(s).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(step: usize) -> EventEnvelope {
        EventEnvelope {
            global_step: step,
            kind: EventKind::Tick {
                episode: 0,
                step,
                global_step: step,
                reward_mean: 0.0,
                coverage: 0.0,
                uniformity: 0.0,
                positions: Vec::new(),
                velocities: Vec::new(),
                collision_pairs: Vec::new(),
            },
        }
    }

    #[test]
    fn truncation_keeps_only_the_tail() {
        let mut timeline = Vec::new();
        for i in 0..1500 {
            push_and_truncate(&mut timeline, tick(i));
        }
        assert_eq!(timeline.len(), TRUNCATE_KEEP);
        assert_eq!(timeline.last().unwrap().global_step, 1499);
    }

    #[test]
    fn truncation_never_drops_below_the_trigger_threshold() {
        let mut timeline = Vec::new();
        for i in 0..TRUNCATE_AT {
            push_and_truncate(&mut timeline, tick(i));
        }
        assert_eq!(timeline.len(), TRUNCATE_AT);
    }
}
