use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::GradingConfig;
use crate::db::models::GradeHistoryRow;
use crate::db::repository;
use crate::db::writer::WriterHandle;
use crate::error::AppError;
use crate::fetcher::parse_feed;
use crate::grading::{grade_opportunity, rank_opportunities, summarize, RankingReport, Summary};
use crate::refresh::ingest;
use crate::state::OpportunityStore;
use crate::types::{sportsbook_key, Exclusion, Grade, GradedOpportunity, OpportunityId, Snapshot};

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<OpportunityStore>,
    pub pool: sqlx::SqlitePool,
    pub grading: Arc<GradingConfig>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
    pub writer: WriterHandle,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/opportunities", get(get_opportunities))
        .route("/opportunities/:id", get(get_opportunity))
        .route("/opportunities/:id/grades", get(get_grade_history))
        .route("/sportsbooks", get(get_sportsbooks))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/latency", get(get_stats_latency))
        .route("/health", get(get_health))
        .route("/snapshots", post(post_snapshots))
        .with_state(state)
}

/// Grade and rank the current active set. Nothing is cached between calls.
fn ranking_pass(state: &ApiState, now: DateTime<Utc>) -> RankingReport {
    let active = state.store.active_opportunities();
    state
        .latency
        .time(|| rank_opportunities(&active, &state.grading, now))
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OpportunitiesQuery {
    pub sportsbook: Option<String>,
    pub grade: Option<String>,
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct OpportunitiesResponse {
    pub generated_at: DateTime<Utc>,
    pub total_active: usize,
    pub ranked: Vec<GradedOpportunity>,
    pub excluded: Vec<Exclusion>,
}

#[derive(Serialize)]
pub struct OpportunityDetailResponse {
    #[serde(flatten)]
    pub graded: GradedOpportunity,
    pub initial: Option<Snapshot>,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SportsbookResponse {
    pub sportsbook: String,
    pub active: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_opportunities: usize,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub polls_failed: u64,
    pub write_queue_depth: usize,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub rows: usize,
    pub parsed: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Ranked list; filters are applied after ranking so the order is kept.
async fn get_opportunities(
    State(state): State<ApiState>,
    Query(params): Query<OpportunitiesQuery>,
) -> Result<Json<OpportunitiesResponse>, AppError> {
    let grade = params
        .grade
        .as_deref()
        .map(Grade::from_str)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let now = Utc::now();
    let report = ranking_pass(&state, now);

    let ranked: Vec<GradedOpportunity> = report
        .ranked
        .into_iter()
        .filter(|o| {
            params
                .sportsbook
                .as_ref()
                .map_or(true, |b| sportsbook_key(&o.current.sportsbook) == sportsbook_key(b))
        })
        .filter(|o| grade.map_or(true, |g| o.grade == g))
        .filter(|o| params.min_score.map_or(true, |m| o.composite_score >= m))
        .take(params.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(OpportunitiesResponse {
        generated_at: now,
        total_active: state.store.len(),
        ranked,
        excluded: report.excluded,
    }))
}

async fn get_opportunity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<OpportunityDetailResponse>, AppError> {
    let id = OpportunityId::from(id);
    let opp = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("opportunity {id}")))?;
    let graded = grade_opportunity(&opp, &state.grading, Utc::now())?;

    Ok(Json(OpportunityDetailResponse {
        graded,
        initial: opp.initial,
        first_seen_at: opp.first_seen_at,
    }))
}

async fn get_grade_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<GradeHistoryRow>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let rows = repository::grade_history(&state.pool, &OpportunityId::from(id), limit).await?;
    Ok(Json(rows))
}

async fn get_sportsbooks(State(state): State<ApiState>) -> Json<Vec<SportsbookResponse>> {
    let counts: BTreeMap<String, usize> = state.store.sportsbook_counts();
    Json(
        counts
            .into_iter()
            .map(|(sportsbook, active)| SportsbookResponse { sportsbook, active })
            .collect(),
    )
}

async fn get_stats_summary(State(state): State<ApiState>) -> Json<Summary> {
    let report = ranking_pass(&state, Utc::now());
    Json(summarize(&report))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_opportunities: state.store.len(),
        last_poll_at: state.health.last_poll_at(),
        polls_failed: state.health.polls_failed(),
        write_queue_depth: state.writer.queue_depth(),
    })
}

/// Accepts one full poll as a JSON array of feed rows.
async fn post_snapshots(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, AppError> {
    let observed_at = Utc::now();
    let (observations, stats) =
        parse_feed(&body, observed_at).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let outcome = ingest(
        &state.store,
        &state.writer,
        &state.health,
        observations,
        observed_at,
    )
    .await?;

    Ok(Json(IngestResponse {
        rows: stats.feed_total,
        parsed: stats.parsed,
        added: outcome.added,
        updated: outcome.updated,
        removed: outcome.removed.len(),
    }))
}
