use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::classifier::DisasterClassifier;
use crate::config::PipelineConfig;
use crate::generate::provider::TextGenerator;
use crate::generate::rank::{self, RankCandidate};
use crate::ingest::{self, IngestReport};
use crate::scrape::PageFetcher;
use crate::store::{Store, UseOutcome, UNRANKED};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub classifier: Arc<DisasterClassifier>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub generator: Arc<dyn TextGenerator>,
    pub cfg: Arc<PipelineConfig>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/headlines/recent-disaster", get(recent_disaster))
        .route(
            "/headlines/generated-relief-effort",
            get(generated_relief_effort),
        )
        .route(
            "/headlines/use-generated-relief-effort/{id}",
            post(use_generated_relief_effort),
        )
        .route("/headlines/save", post(save_headlines))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `p` is the 1-based page index, `c` the page size.
#[derive(Deserialize)]
struct PageQuery {
    p: Option<i64>,
    c: Option<i64>,
}

fn page_bounds(q: &PageQuery) -> (i64, i64) {
    let c = q.c.unwrap_or(10).clamp(1, 100);
    let p = q.p.unwrap_or(1).max(1);
    (c, (p - 1) * c)
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    warn!(target: "api", error = ?e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

#[derive(Serialize)]
struct HeadlineOut {
    id: i64,
    title: String,
    link: String,
    disaster_type: String,
    posted_datetime: chrono::DateTime<chrono::Utc>,
}

async fn recent_disaster(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<HeadlineOut>>, ApiError> {
    let (limit, offset) = page_bounds(&q);
    let rows = state
        .store
        .recent_disasters(limit, offset)
        .await
        .map_err(internal)?;
    let out = rows
        .into_iter()
        .map(|h| HeadlineOut {
            id: h.id,
            title: h.title,
            link: h.link,
            disaster_type: h.disaster_type,
            posted_datetime: h.posted_datetime,
        })
        .collect();
    Ok(Json(out))
}

#[derive(Serialize)]
struct InkindOut {
    item: String,
    item_desc: String,
    quantity: i64,
}

#[derive(Serialize)]
struct GeneratedReliefOut {
    id: i64,
    disaster_type: String,
    relief_title: String,
    description: String,
    headline_title: String,
    date_posted: chrono::DateTime<chrono::Utc>,
    link: String,
    monetary_goal: i64,
    inkind_donation: Vec<InkindOut>,
    deployment_date: chrono::NaiveDate,
    is_used: bool,
    urgency: i64,
}

/// Paginated, ranked candidate templates with denormalized headline and
/// in-kind detail. Ranking runs on demand over the returned page; unrankable
/// batches come back annotated with `-1`, never as an error.
async fn generated_relief_effort(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<GeneratedReliefOut>>, ApiError> {
    let (limit, offset) = page_bounds(&q);
    let rows = state
        .store
        .generated_candidates(limit, offset)
        .await
        .map_err(internal)?;

    let candidates: Vec<RankCandidate> = rows
        .iter()
        .map(|r| RankCandidate {
            relief_title: r.relief_title.clone(),
            description: r.description.clone(),
            headline_title: r.headline_title.clone(),
        })
        .collect();
    let ranks = rank::rank_candidates(state.generator.as_ref(), &candidates).await;

    let mut out = Vec::with_capacity(rows.len());
    for (row, rank) in rows.into_iter().zip(ranks) {
        if rank != UNRANKED {
            // Best-effort: the rank is advisory, a failed write must not fail
            // the listing.
            if let Err(e) = state.store.update_urgency(row.id, rank).await {
                warn!(target: "api", error = ?e, id = row.id, "urgency update failed");
            }
        }
        let items = state.store.inkind_for(row.id).await.map_err(internal)?;
        out.push(GeneratedReliefOut {
            id: row.id,
            disaster_type: row.disaster_type,
            relief_title: row.relief_title,
            description: row.description,
            headline_title: row.headline_title,
            date_posted: row.date_posted,
            link: row.link,
            monetary_goal: row.monetary_goal,
            inkind_donation: items
                .into_iter()
                .map(|i| InkindOut {
                    item: i.item,
                    item_desc: i.item_desc,
                    quantity: i.quantity,
                })
                .collect(),
            deployment_date: row.deployment_date,
            is_used: row.is_used,
            urgency: rank,
        });
    }

    // Ranked rows first (most urgent first), unranked trailing in stored order.
    out.sort_by_key(|r| if r.urgency == UNRANKED { i64::MAX } else { r.urgency });

    Ok(Json(out))
}

#[derive(Serialize)]
struct UseResponse {
    used: bool,
    detail: &'static str,
}

async fn use_generated_relief_effort(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<UseResponse>), ApiError> {
    let outcome = state.store.use_generated(id).await.map_err(internal)?;
    let (status, used, detail) = match outcome {
        UseOutcome::Used => (
            StatusCode::OK,
            true,
            "Generated relief effort used successfully",
        ),
        UseOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            false,
            "Generated relief effort not found",
        ),
        UseOutcome::AlreadyUsed => (
            StatusCode::CONFLICT,
            false,
            "Generated relief effort already in use",
        ),
    };
    Ok((status, Json(UseResponse { used, detail })))
}

/// Manual ingestion trigger for operators, outside the scheduler cadence.
async fn save_headlines(State(state): State<AppState>) -> Json<IngestReport> {
    let report = ingest::run_once(
        state.fetcher.as_ref(),
        &state.classifier,
        &state.store,
        &state.cfg.seed_url,
    )
    .await;
    Json(report)
}
