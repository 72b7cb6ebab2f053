// src/store/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A persisted, disaster-classified news item.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Headline {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub disaster_type: String,
    pub posted_datetime: DateTime<Utc>,
    pub article_body: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a headline; `created_at` is stamped by the store.
#[derive(Debug, Clone)]
pub struct NewHeadline {
    pub title: String,
    pub link: String,
    pub disaster_type: String,
    pub posted_datetime: DateTime<Utc>,
    pub article_body: String,
}

/// A generated relief-effort template awaiting one-time consumption.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct GenerateRelief {
    pub id: i64,
    pub headline_id: i64,
    pub relief_title: String,
    pub description: String,
    pub monetary_goal: i64,
    pub deployment_date: NaiveDate,
    pub is_used: bool,
    pub urgency_rank: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// In-kind requirement line item; never exists without its parent template.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct GeneratedInkind {
    pub id: i64,
    pub generate_relief_id: i64,
    pub item: String,
    pub item_desc: String,
    pub quantity: i64,
}

/// One denormalized listing row: template joined with its source headline.
#[derive(FromRow, Debug, Clone)]
pub struct CandidateRow {
    pub id: i64,
    pub headline_id: i64,
    pub relief_title: String,
    pub description: String,
    pub monetary_goal: i64,
    pub deployment_date: NaiveDate,
    pub is_used: bool,
    pub urgency_rank: i64,
    pub disaster_type: String,
    pub headline_title: String,
    pub link: String,
    pub date_posted: DateTime<Utc>,
}
