//! Multi-agent swarm shape-formation training service.
//!
//! `env` simulates the swarm, `agent`/`net`/`marl` implement the per-robot
//! learners, `dsl` compiles the two whitelisted policy-description
//! languages, `episode`/`training`/`events` run and stream training, and
//! `http` exposes all of it over HTTP/SSE.

pub mod agent;
pub mod app_config;
pub mod buffer;
pub mod config;
pub mod dsl;
pub mod env;
pub mod episode;
pub mod error;
pub mod events;
pub mod http;
pub mod llm_adapter;
pub mod marl;
pub mod metrics;
pub mod net;
pub mod shapes;
pub mod telemetry;
pub mod training;

pub use config::Config;
pub use error::AppError;
