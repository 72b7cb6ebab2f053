// src/ingest/mod.rs
//! Headline ingestion: scrape → classify → dedup-by-link → persist.
//!
//! Each insert is its own unit of work, so an interrupted run leaves only
//! committed headlines behind and the next run's dedup check picks up cleanly.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::DisasterClassifier;
use crate::scrape::{self, PageFetcher};
use crate::store::{models::NewHeadline, Store, NON_DISASTER};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_scanned_total", "Scraped articles seen by the ingestor.");
        describe_counter!("ingest_inserted_total", "Headlines persisted.");
        describe_counter!(
            "ingest_duplicate_total",
            "Articles skipped because their link already exists."
        );
        describe_counter!(
            "ingest_non_disaster_total",
            "Articles the classifier rejected below threshold."
        );
        describe_counter!(
            "scrape_skipped_total",
            "Articles dropped on fetch/parse failure."
        );
        describe_counter!("scrape_articles_total", "Articles successfully scraped.");
        describe_histogram!("scrape_run_ms", "Full scrape pass time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingestion last ran.");
    });
}

/// Per-run accounting, returned to the manual-save caller and logged on every run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub scanned: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub non_disaster: usize,
}

/// Run one ingestion pass. Never fails: a run that cannot even reach the index
/// page produces an empty report and is retried on the next tick.
pub async fn run_once(
    fetcher: &dyn PageFetcher,
    classifier: &DisasterClassifier,
    store: &Store,
    seed_url: &str,
) -> IngestReport {
    ensure_metrics_described();

    let mut report = IngestReport::default();

    let articles = match scrape::scrape(fetcher, seed_url).await {
        Ok(articles) => articles,
        Err(e) => {
            warn!(target: "ingest", error = ?e, "scrape pass failed");
            return report;
        }
    };

    for article in articles {
        report.scanned += 1;

        match store.headline_by_link(&article.link).await {
            Ok(Some(_)) => {
                report.duplicates += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(target: "ingest", error = ?e, link = %article.link, "dedup lookup failed");
                continue;
            }
        }

        let classification = classifier.classify(&article.title);
        if classification.category == NON_DISASTER {
            report.non_disaster += 1;
            continue;
        }

        let new = NewHeadline {
            title: article.title.clone(),
            link: article.link.clone(),
            disaster_type: classification.category.clone(),
            posted_datetime: article.posted_at,
            article_body: article.body,
        };
        match store.insert_headline(&new).await {
            Ok(id) => {
                report.inserted += 1;
                info!(
                    target: "ingest",
                    id,
                    disaster_type = %classification.category,
                    confidence = classification.confidence,
                    "headline persisted"
                );
            }
            Err(e) => {
                warn!(target: "ingest", error = ?e, link = %article.link, "insert failed");
            }
        }
    }

    counter!("ingest_scanned_total").increment(report.scanned as u64);
    counter!("ingest_inserted_total").increment(report.inserted as u64);
    counter!("ingest_duplicate_total").increment(report.duplicates as u64);
    counter!("ingest_non_disaster_total").increment(report.non_disaster as u64);
    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    info!(
        target: "ingest",
        scanned = report.scanned,
        inserted = report.inserted,
        duplicates = report.duplicates,
        non_disaster = report.non_disaster,
        "ingest run finished"
    );

    report
}
