use super::{AppError, AppResult, AppState, JsonResponse};
use crate::render;
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use quarry_core::{Document, IndexStats, Message, ResearchResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default neighbours for `/index/search`.
const DEFAULT_K: usize = 5;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/research", post(research))
        .route("/conversations/:id", get(conversation))
        .route("/index", axum::routing::delete(clear_index))
        .route("/index/search", post(search_index))
        .route("/index/stats", get(index_stats))
        .route("/index/rebuild", post(rebuild_index))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    version: String,
    uptime_seconds: u64,
    indexed_documents: usize,
    conversations: usize,
}

async fn health(State(state): State<AppState>) -> Json<JsonResponse<HealthResponse>> {
    Json(JsonResponse::ok(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        indexed_documents: state.components.index.count(),
        conversations: state.components.conversations.len(),
    }))
}

#[derive(Deserialize)]
struct ResearchRequest {
    query: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct ResearchResponse {
    conversation_id: String,
    message: Message,
    result: ResearchResult,
}

async fn research(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> AppResult<Json<JsonResponse<ResearchResponse>>> {
    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let conversations = &state.components.conversations;
    let history = conversations.history(&conversation_id)?;

    let started = Instant::now();
    let result = match state.components.pipeline.execute(&req.query, &history).await {
        Ok(run) => {
            state.metrics.observe_run(&run, started.elapsed());
            run.into_result()
        }
        Err(e) => {
            state
                .metrics
                .record_outcome(super::metrics::RunOutcome::Rejected, started.elapsed());
            ResearchResult::failed(req.query.as_str(), e.to_string())
        }
    }
    .with_elapsed(started.elapsed());

    tracing::info!(
        conversation = %conversation_id,
        found = result.total_found,
        elapsed = result.elapsed_secs,
        "Research run finished"
    );

    let message = Message::assistant(render::chat_reply(&result));
    conversations.append(
        &conversation_id,
        [Message::user(req.query.as_str()), message.clone()],
    )?;

    Ok(Json(JsonResponse::ok(ResearchResponse {
        conversation_id,
        message,
        result,
    })))
}

async fn conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JsonResponse<Vec<Message>>>> {
    let history = state.components.conversations.history(&id)?;
    Ok(Json(JsonResponse::ok(history)))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
}

#[derive(Serialize)]
struct SearchHit {
    document: Document,
    score: f32,
}

async fn search_index(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Json<JsonResponse<Vec<SearchHit>>>> {
    if req.query.trim().is_empty() {
        return Err(AppError::bad_request("query must not be empty"));
    }

    let index = state.components.index.clone();
    let k = req.k.unwrap_or(DEFAULT_K);
    let threshold = req.threshold.unwrap_or(-1.0);

    let hits = tokio::task::spawn_blocking(move || index.search(&req.query, k, threshold)).await??;

    Ok(Json(JsonResponse::ok(
        hits.into_iter()
            .map(|(document, score)| SearchHit { document, score })
            .collect(),
    )))
}

async fn index_stats(State(state): State<AppState>) -> AppResult<Json<JsonResponse<IndexStats>>> {
    Ok(Json(JsonResponse::ok(state.components.index.stats()?)))
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

async fn rebuild_index(State(state): State<AppState>) -> AppResult<Json<JsonResponse<CountResponse>>> {
    let index = state.components.index.clone();
    let count = tokio::task::spawn_blocking(move || {
        let count = index.rebuild()?;
        index.persist()?;
        Ok::<_, quarry_core::QuarryError>(count)
    })
    .await??;

    tracing::info!("Similarity index rebuilt: {} documents", count);
    Ok(Json(JsonResponse::ok(CountResponse { count })))
}

async fn clear_index(State(state): State<AppState>) -> AppResult<Json<JsonResponse<CountResponse>>> {
    let index = state.components.index.clone();
    let removed = index.count();
    tokio::task::spawn_blocking(move || index.clear()).await??;

    tracing::warn!("Similarity index cleared ({} documents removed)", removed);
    Ok(Json(JsonResponse::ok(CountResponse { count: removed })))
}

async fn metrics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let m = &state.metrics;
    m.indexed_documents
        .set(state.components.index.count() as i64);
    m.conversations
        .set(state.components.conversations.len() as i64);
    m.uptime_seconds
        .set(state.start_time.elapsed().as_secs() as i64);

    let body = m.render()?;
    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    ))
}
