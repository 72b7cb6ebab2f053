// src/config.rs
//! Runtime configuration: TOML file with env-var overrides.
//!
//! Lookup order mirrors the rest of the stack: `PIPELINE_CONFIG_PATH` env var,
//! then `config/pipeline.toml`, then compiled-in defaults. A handful of
//! operationally sensitive knobs can also be overridden per-env.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "CLASSIFIER_THRESHOLD";
pub const ENV_SEED_URL: &str = "SCRAPE_SEED_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// News index page the scraper starts from.
    pub seed_url: String,
    pub database_url: String,
    pub bind_addr: String,
    /// Classifier confidence gate; below it everything is non-disaster.
    pub confidence_threshold: f64,
    pub ingest_interval_secs: u64,
    pub generate_interval_secs: u64,
    /// Overlapping job instances tolerated before ticks are dropped.
    pub max_instances: usize,
    /// Page size for untemplated-queue and listing queries.
    pub page_size: i64,
    /// Spacing between successful generations (seconds).
    pub throttle_secs: u64,
    /// "gemini" | "mock" | "disabled"
    pub generator_provider: String,
    pub generator_model: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed_url: "https://www.philstar.com/".to_string(),
            database_url: "sqlite://relief.db".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            confidence_threshold: crate::classifier::DEFAULT_CONFIDENCE_THRESHOLD,
            ingest_interval_secs: 3600,
            generate_interval_secs: 1200,
            max_instances: crate::scheduler::DEFAULT_MAX_INSTANCES,
            page_size: 10,
            throttle_secs: 120,
            generator_provider: "gemini".to_string(),
            generator_model: None,
        }
    }
}

/// Load config using env var + fallbacks:
/// 1) $PIPELINE_CONFIG_PATH (must exist if set)
/// 2) config/pipeline.toml
/// 3) built-in defaults
pub fn load() -> Result<PipelineConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        load_from(&pb)?
    } else {
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            load_from(default)?
        } else {
            PipelineConfig::default()
        }
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_from(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut PipelineConfig) {
    if let Ok(v) = std::env::var(ENV_DATABASE_URL) {
        if !v.trim().is_empty() {
            cfg.database_url = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_BIND_ADDR) {
        if !v.trim().is_empty() {
            cfg.bind_addr = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_SEED_URL) {
        if !v.trim().is_empty() {
            cfg.seed_url = v;
        }
    }
    if let Some(t) = parse_threshold_env(std::env::var(ENV_CONFIDENCE_THRESHOLD).ok()) {
        cfg.confidence_threshold = t;
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.ingest_interval_secs, 3600);
        assert_eq!(cfg.generate_interval_secs, 1200);
        assert_eq!(cfg.max_instances, 3);
        assert!(cfg.confidence_threshold >= 0.9);
    }

    #[test]
    fn partial_toml_fills_from_defaults() {
        let cfg: PipelineConfig =
            toml::from_str(r#"confidence_threshold = 0.8"#).expect("partial config");
        assert_eq!(cfg.confidence_threshold, 0.8);
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.generator_provider, "gemini");
    }

    #[test]
    fn threshold_env_parse_clamps() {
        assert_eq!(parse_threshold_env(Some("1.5".into())), Some(1.0));
        assert_eq!(parse_threshold_env(Some("-0.2".into())), Some(0.0));
        assert_eq!(parse_threshold_env(Some("0.9".into())), Some(0.9));
        assert_eq!(parse_threshold_env(Some("abc".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_beat_the_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("pipeline.toml");
        std::fs::write(
            &p,
            "confidence_threshold = 0.5\nbind_addr = \"127.0.0.1:9001\"\n",
        )
        .unwrap();

        std::env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        std::env::set_var(ENV_CONFIDENCE_THRESHOLD, "0.75");
        std::env::remove_var(ENV_DATABASE_URL);
        std::env::remove_var(ENV_BIND_ADDR);
        std::env::remove_var(ENV_SEED_URL);

        let cfg = load().unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9001");
        assert_eq!(cfg.confidence_threshold, 0.75);

        std::env::remove_var(ENV_CONFIG_PATH);
        std::env::remove_var(ENV_CONFIDENCE_THRESHOLD);
    }

    #[serial_test::serial]
    #[test]
    fn explicit_config_path_must_exist() {
        std::env::set_var(ENV_CONFIG_PATH, "/nonexistent/pipeline.toml");
        assert!(load().is_err());
        std::env::remove_var(ENV_CONFIG_PATH);
    }
}
