// src/generate/mod.rs
//! Relief-template generation: for each untemplated disaster headline, draft a
//! template with the generative model, repair it against the fixed schema, and
//! persist it with its in-kind items.
//!
//! Each headline walks an explicit state machine — `Drafted → Normalized →
//! persisted`, or `Failed` at any stage. A failed headline is logged, skipped,
//! and naturally retried on the next scheduled run (its id stays untemplated).

pub mod provider;
pub mod rank;
pub mod schema;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::store::{models::Headline, Store};
use provider::TextGenerator;
use schema::ReliefTemplate;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("generate_attempt_total", "Headlines picked up for templating.");
        describe_counter!("generate_persisted_total", "Templates persisted with their items.");
        describe_counter!(
            "generate_failed_total",
            "Per-headline generation failures (draft/repair/normalize/persist)."
        );
        describe_gauge!("generate_last_run_ts", "Unix ts when generation last ran.");
    });
}

/// Where a headline is in the generation pipeline. Failures carry the stage
/// they happened in, so retries and tests stay explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateOutcome {
    Drafted(String),
    Normalized(ReliefTemplate),
    Failed {
        stage: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct GenerateCfg {
    /// Page size for the untemplated-headline queue.
    pub page_size: i64,
    /// Minimum spacing between successful generations, throttling the
    /// generative service.
    pub throttle: Duration,
}

impl Default for GenerateCfg {
    fn default() -> Self {
        Self {
            page_size: 10,
            throttle: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateReport {
    pub attempted: usize,
    pub persisted: usize,
    pub failed: usize,
}

fn draft_prompt(headline: &Headline) -> String {
    format!(
        "disaster type: {}\n headline title: {}\n article date posted: {}\n article content: {}\n\n \
         Generate a JSON object representing a relief effort for this disaster. \
         Ensure the JSON is well-formed. It should include the following:\n \
         Possible Relief Effort Title\n Relief Effort Description\n \
         Monetary Goal for Donation (use just integer)\n\n \
         List of inkind donation:\n Name of item\n \
         Description of item or specification or further details\n \
         Quantity of such in kind donation\n \
         Deployment date of relief effort. \
         Strictly output just the JSON object. Don't include anything else besides \
         the actual JSON object as I would parse this text. There should be no null fields.",
        headline.disaster_type, headline.title, headline.posted_datetime, headline.article_body
    )
}

fn repair_prompt(draft: &str) -> String {
    format!(
        "I need you to modify the keys in this JSON object {draft}. \
         Output strictly just the JSON object following this format {}. \
         Make sure to output only the JSON object.",
        schema::JSON_TEMPLATE
    )
}

/// Stage 1: ask the model for a free-form draft.
pub async fn draft(generator: &dyn TextGenerator, headline: &Headline) -> TemplateOutcome {
    match generator.generate(&draft_prompt(headline)).await {
        Ok(text) => TemplateOutcome::Drafted(schema::strip_code_fences(&text).to_string()),
        Err(e) => TemplateOutcome::Failed {
            stage: "draft",
            reason: e.to_string(),
        },
    }
}

/// Stage 2: ask the model to re-key the draft, then validate the result.
/// Passes `Normalized` and `Failed` inputs through untouched.
pub async fn normalize(generator: &dyn TextGenerator, outcome: TemplateOutcome) -> TemplateOutcome {
    let draft_text = match outcome {
        TemplateOutcome::Drafted(text) => text,
        done => return done,
    };
    let repaired = match generator.generate(&repair_prompt(&draft_text)).await {
        Ok(text) => text,
        Err(e) => {
            return TemplateOutcome::Failed {
                stage: "repair",
                reason: e.to_string(),
            }
        }
    };
    match schema::parse_template(&repaired) {
        Ok(template) => TemplateOutcome::Normalized(template),
        Err(e) => TemplateOutcome::Failed {
            stage: "normalize",
            reason: e.to_string(),
        },
    }
}

/// One generation pass over the untemplated queue. A single bad headline never
/// aborts the batch.
pub async fn run_once(
    generator: &dyn TextGenerator,
    store: &Store,
    cfg: &GenerateCfg,
) -> GenerateReport {
    ensure_metrics_described();

    let mut report = GenerateReport::default();

    let headlines = match store.untemplated_headlines(cfg.page_size, 0).await {
        Ok(headlines) => headlines,
        Err(e) => {
            warn!(target: "generate", error = ?e, "untemplated query failed");
            return report;
        }
    };

    for headline in headlines {
        report.attempted += 1;

        let outcome = normalize(generator, draft(generator, &headline).await).await;
        match outcome {
            TemplateOutcome::Normalized(template) => {
                match store.insert_template(headline.id, &template).await {
                    Ok(relief_id) => {
                        report.persisted += 1;
                        counter!("generate_persisted_total").increment(1);
                        info!(
                            target: "generate",
                            relief_id,
                            headline_id = headline.id,
                            items = template.inkind.len(),
                            "relief template persisted"
                        );
                        if !cfg.throttle.is_zero() {
                            tokio::time::sleep(cfg.throttle).await;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        counter!("generate_failed_total").increment(1);
                        warn!(
                            target: "generate",
                            error = ?e,
                            headline_id = headline.id,
                            "template persist failed"
                        );
                    }
                }
            }
            TemplateOutcome::Failed { stage, reason } => {
                report.failed += 1;
                counter!("generate_failed_total").increment(1);
                warn!(
                    target: "generate",
                    stage,
                    reason = %reason,
                    headline_id = headline.id,
                    "template generation failed"
                );
            }
            TemplateOutcome::Drafted(_) => {
                // normalize() is total over Drafted; reaching here means a bug,
                // but a skipped item beats a crashed batch.
                report.failed += 1;
                warn!(target: "generate", headline_id = headline.id, "draft left unnormalized");
            }
        }
    }

    counter!("generate_attempt_total").increment(report.attempted as u64);
    gauge!("generate_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    info!(
        target: "generate",
        attempted = report.attempted,
        persisted = report.persisted,
        failed = report.failed,
        "generation run finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::provider::MockGenerator;
    use chrono::{TimeZone, Utc};

    fn headline() -> Headline {
        Headline {
            id: 1,
            title: "Magnitude 7.4 quake rocks region".into(),
            link: "https://news.example/quake".into(),
            disaster_type: "earthquake".into(),
            posted_datetime: Utc.with_ymd_and_hms(2023, 12, 4, 7, 40, 0).unwrap(),
            article_body: "A strong earthquake struck early Monday.".into(),
            created_at: Utc::now(),
        }
    }

    const REPAIRED: &str = r#"{
        "relief_title": "Quake Relief",
        "description": "Aid for affected families.",
        "monetary_goal": 100000,
        "inkind_donation": [{"item": "Water", "item_desc": "Bottled", "quantity": 100}],
        "deployment_date": "2023-12-10"
    }"#;

    #[tokio::test]
    async fn draft_then_normalize_reaches_normalized() {
        let generator = MockGenerator::scripted(["free-form draft text", REPAIRED]);
        let outcome = normalize(&generator, draft(&generator, &headline()).await).await;
        match outcome {
            TemplateOutcome::Normalized(tpl) => {
                assert_eq!(tpl.relief_title, "Quake Relief");
                assert_eq!(tpl.inkind[0].quantity, 100);
            }
            other => panic!("expected Normalized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn draft_prompt_embeds_headline_fields() {
        let generator = MockGenerator::scripted(["draft", REPAIRED]);
        let _ = normalize(&generator, draft(&generator, &headline()).await).await;
        let prompts = generator.seen_prompts();
        assert!(prompts[0].contains("disaster type: earthquake"));
        assert!(prompts[0].contains("Magnitude 7.4 quake rocks region"));
        assert!(prompts[1].contains("modify the keys"));
        assert!(prompts[1].contains("inkind_donation"));
    }

    #[tokio::test]
    async fn repair_garbage_fails_at_normalize() {
        let generator = MockGenerator::scripted(["draft", "not json at all"]);
        let outcome = normalize(&generator, draft(&generator, &headline()).await).await;
        assert!(matches!(
            outcome,
            TemplateOutcome::Failed { stage: "normalize", .. }
        ));
    }

    #[tokio::test]
    async fn generator_error_fails_at_draft() {
        let generator = MockGenerator::scripted(Vec::<String>::new());
        let outcome = draft(&generator, &headline()).await;
        assert!(matches!(
            outcome,
            TemplateOutcome::Failed { stage: "draft", .. }
        ));
    }

    #[tokio::test]
    async fn failed_outcome_passes_through_normalize() {
        let generator = MockGenerator::scripted(Vec::<String>::new());
        let failed = TemplateOutcome::Failed {
            stage: "draft",
            reason: "boom".into(),
        };
        let outcome = normalize(&generator, failed.clone()).await;
        assert_eq!(outcome, failed);
    }
}
