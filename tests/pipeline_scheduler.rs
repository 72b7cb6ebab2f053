// tests/pipeline_scheduler.rs
// Scheduler wired to the real ingest job over fixtures: ticks run the pipeline,
// dedup keeps re-runs idempotent, shutdown stops the cadence.

use std::sync::Arc;
use std::time::Duration;

use relief_pipeline::classifier::DisasterClassifier;
use relief_pipeline::ingest;
use relief_pipeline::scheduler::Scheduler;
use relief_pipeline::scrape::FixtureFetcher;
use relief_pipeline::store::Store;

const SEED: &str = "https://news.example/";

#[tokio::test]
async fn scheduled_ingest_populates_the_store_idempotently() {
    let store = Store::in_memory().await.unwrap();
    let classifier = Arc::new(DisasterClassifier::default());
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with_page(SEED, include_str!("fixtures/index.html"))
            .with_page(
                "https://news.example/quake",
                include_str!("fixtures/article_quake.html"),
            )
            .with_page(
                "https://news.example/budget",
                include_str!("fixtures/article_budget.html"),
            )
            .with_page(
                "https://news.example/fire",
                include_str!("fixtures/article_fire.html"),
            ),
    );

    let mut scheduler = Scheduler::new();
    {
        let store = store.clone();
        let classifier = classifier.clone();
        let fetcher = fetcher.clone();
        scheduler.add_job("ingest", Duration::from_millis(20), 3, move || {
            let store = store.clone();
            let classifier = classifier.clone();
            let fetcher = fetcher.clone();
            async move {
                ingest::run_once(fetcher.as_ref(), &classifier, &store, SEED).await;
            }
        });
    }
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(120)).await;
    scheduler.shutdown().await;

    // Several ticks ran, but dedup-by-link kept exactly one row per article.
    let recent = store.recent_disasters(50, 0).await.unwrap();
    assert_eq!(recent.len(), 2);
}
