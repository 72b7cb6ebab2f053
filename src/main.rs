//! Relief Pipeline — Binary Entrypoint
//! Boots the Axum HTTP server and the background scheduler: periodic headline
//! ingestion and relief-template generation, plus the consumption API.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relief_pipeline::api::{self, AppState};
use relief_pipeline::classifier::DisasterClassifier;
use relief_pipeline::config;
use relief_pipeline::generate::{
    self,
    provider::{self, TextGenerator},
    GenerateCfg,
};
use relief_pipeline::ingest;
use relief_pipeline::metrics::Metrics;
use relief_pipeline::scheduler::Scheduler;
use relief_pipeline::scrape::{HttpFetcher, PageFetcher};
use relief_pipeline::store::Store;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relief_pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Arc::new(config::load()?);
    let store = Store::connect(&cfg.database_url).await?;
    let metrics = Metrics::init();

    let classifier = Arc::new(DisasterClassifier::new(cfg.confidence_threshold));
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new());
    let generator: Arc<dyn TextGenerator> =
        provider::build_generator(&cfg.generator_provider, cfg.generator_model.as_deref());
    info!(provider = generator.name(), "generative provider ready");

    // --- Background jobs: ingestion and generation on independent cadences ---
    let mut background = Scheduler::new();
    {
        let store = store.clone();
        let classifier = classifier.clone();
        let fetcher = fetcher.clone();
        let seed_url = cfg.seed_url.clone();
        background.add_job(
            "ingest",
            Duration::from_secs(cfg.ingest_interval_secs),
            cfg.max_instances,
            move || {
                let store = store.clone();
                let classifier = classifier.clone();
                let fetcher = fetcher.clone();
                let seed_url = seed_url.clone();
                async move {
                    ingest::run_once(fetcher.as_ref(), &classifier, &store, &seed_url).await;
                }
            },
        );
    }
    {
        let store = store.clone();
        let generator = generator.clone();
        let gen_cfg = GenerateCfg {
            page_size: cfg.page_size,
            throttle: Duration::from_secs(cfg.throttle_secs),
        };
        background.add_job(
            "generate",
            Duration::from_secs(cfg.generate_interval_secs),
            cfg.max_instances,
            move || {
                let store = store.clone();
                let generator = generator.clone();
                let gen_cfg = gen_cfg.clone();
                async move {
                    generate::run_once(generator.as_ref(), &store, &gen_cfg).await;
                }
            },
        );
    }
    background.start();

    let state = AppState {
        store,
        classifier,
        fetcher,
        generator,
        cfg: cfg.clone(),
    };
    let router = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "serving");
    axum::serve(listener, router).await?;

    background.shutdown().await;
    Ok(())
}
