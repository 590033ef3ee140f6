pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use prompt_core::{Pipeline, PipelineError, Role, StructuredResponse, SubmitOutcome, Turn};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{
    AppMetrics, DetailedMetricsResponse, EndpointMetrics, EndpointMetricsResponse, SystemMetrics,
};
use crate::validation::{
    validate_chat_length, validate_chat_message, validate_conversation_id, validate_fragment,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: ServerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics: AppMetrics::new(),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

#[derive(Deserialize)]
pub struct FragmentRequest {
    text: String,
    conversation_id: Option<String>,
}

#[derive(Deserialize)]
pub struct FlushRequest {
    conversation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentStatus {
    Ignored,
    Pending,
    Flushed,
}

#[derive(Serialize)]
pub struct FragmentResponse {
    conversation_id: String,
    status: FragmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    buffered: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<StructuredResponse>,
}

#[derive(Deserialize)]
pub struct ChatMessageIn {
    role: String,
    content: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    messages: Vec<ChatMessageIn>,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Routes with state attached; middleware is layered on by the binary.
pub fn build_router(state: AppState) -> Router {
    let _ = START_TIME.get_or_init(Instant::now);

    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/fragment", post(fragment_endpoint))
        .route("/flush", post(flush_endpoint))
        .route("/chat", post(chat_endpoint));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

fn outcome_response(
    state: &AppState,
    conversation_id: String,
    outcome: SubmitOutcome,
) -> FragmentResponse {
    match outcome {
        SubmitOutcome::Ignored => {
            state.metrics.pipeline.record_ignored();
            FragmentResponse {
                conversation_id,
                status: FragmentStatus::Ignored,
                buffered: None,
                response: None,
            }
        }
        SubmitOutcome::Pending { buffered } => {
            state.metrics.pipeline.record_pending();
            FragmentResponse {
                conversation_id,
                status: FragmentStatus::Pending,
                buffered: Some(buffered),
                response: None,
            }
        }
        SubmitOutcome::Flushed(report) => {
            state.metrics.pipeline.record_flush(&report);
            info!(
                "Flushed {}: model={}, provider={:?}, degraded={}",
                conversation_id, report.model, report.provider, report.degraded
            );
            FragmentResponse {
                conversation_id,
                status: FragmentStatus::Flushed,
                buffered: None,
                response: Some(report.response),
            }
        }
    }
}

fn record<T>(
    state: &AppState,
    endpoint: &EndpointMetrics,
    started: Instant,
    result: &Result<T, PipelineError>,
) {
    endpoint.record_request(started.elapsed().as_millis() as u64);
    if let Err(err) = result {
        endpoint.record_error();
        if matches!(err, PipelineError::Upstream(_)) {
            state.metrics.pipeline.record_upstream_error();
        }
    }
}

pub async fn fragment_endpoint(
    State(state): State<AppState>,
    Json(req): Json<FragmentRequest>,
) -> Result<Json<FragmentResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    validate_fragment(&req.text)?;
    let conversation_id = match req.conversation_id {
        Some(id) => {
            validate_conversation_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let result = state
        .pipeline
        .submit(&conversation_id, &req.text, started)
        .await;
    record(&state, &state.metrics.fragment, started, &result);
    Ok(Json(outcome_response(&state, conversation_id, result?)))
}

pub async fn flush_endpoint(
    State(state): State<AppState>,
    Json(req): Json<FlushRequest>,
) -> Result<Json<FragmentResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    validate_conversation_id(&req.conversation_id)?;
    let result = state.pipeline.flush(&req.conversation_id, started).await;
    record(&state, &state.metrics.flush, started, &result);
    Ok(Json(outcome_response(&state, req.conversation_id, result?)))
}

/// Stateless variant: the client sends its message history, like a chat
/// completion request, and gets one structured response back.
pub async fn chat_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<StructuredResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    validate_chat_length(req.messages.len())?;
    let mut turns = Vec::with_capacity(req.messages.len());
    for message in req.messages {
        validate_chat_message(&message.role, &message.content)?;
        let role = if message.role == "assistant" {
            Role::Assistant
        } else {
            Role::User
        };
        turns.push(Turn::new(role, message.content));
    }

    let result = state.pipeline.respond(turns).await;
    record(&state, &state.metrics.chat, started, &result);
    let report = result?;
    state.metrics.pipeline.record_flush(&report);
    Ok(Json(report.response))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    // Get CPU usage (average across all cores)
    let cpu_usage = system.global_cpu_info().cpu_usage();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    // Get system load (Unix-like systems only)
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| {
                    loadavg
                        .split_whitespace()
                        .next()
                        .and_then(|s| s.parse::<f64>().ok())
                })
        }
        #[cfg(not(unix))]
        None
    };

    Json(DetailedMetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024, // Convert bytes to MB
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            system_load,
        },
        endpoints: EndpointMetricsResponse {
            fragment: state.metrics.fragment.stats(),
            flush: state.metrics.flush.stats(),
            chat: state.metrics.chat.stats(),
        },
        pipeline: state.metrics.pipeline.snapshot(),
        conversations: state.pipeline.conversation_count(),
    })
}
