//! Liveness endpoint for hosting platforms that expect an open port.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::chatbot::MessagePipeline;

#[derive(Clone)]
pub struct HealthState {
    pipeline: Arc<MessagePipeline>,
    started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(pipeline: Arc<MessagePipeline>) -> Self {
        Self { pipeline, started_at: Utc::now() }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub questions_answered: u64,
    pub knowledge_days: usize,
    pub knowledge_rules: usize,
    pub cached_answers: usize,
    pub started_at: String,
    pub uptime_secs: i64,
}

async fn root() -> &'static str {
    "Hello World"
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthReport> {
    let knowledge = state.pipeline.knowledge().snapshot();
    Json(HealthReport {
        status: "ok",
        questions_answered: state.pipeline.questions_answered(),
        knowledge_days: knowledge.days.len(),
        knowledge_rules: knowledge.rules.len(),
        cached_answers: state.pipeline.cache().len(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve on `0.0.0.0:port` until the process exits.
pub async fn serve(port: u16, state: HealthState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("🩺 Health endpoint listening on {addr}");
    axum::serve(listener, router(state)).await
}
