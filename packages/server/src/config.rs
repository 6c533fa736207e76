use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::domains::billing::PlanQuotas;

/// Default LLM credentials forwarded to the extraction service
#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    pub provider: String,
    pub model: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub extraction_service_url: String,
    pub llm: LlmSettings,
    pub plan_quotas: PlanQuotas,
    pub model_rates_path: Option<PathBuf>,
    pub blob_root: PathBuf,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = PlanQuotas::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            extraction_service_url: env::var("EXTRACTION_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            llm: LlmSettings {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "deepseek".to_string()),
                model: optional_var("LLM_MODEL"),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                base_url: optional_var("LLM_BASE_URL"),
            },
            plan_quotas: PlanQuotas {
                free: quota_var("PLAN_FREE_WORDS_QUOTA", defaults.free)?,
                professional: quota_var("PLAN_PROFESSIONAL_WORDS_QUOTA", defaults.professional)?,
                team: quota_var("PLAN_TEAM_WORDS_QUOTA", defaults.team)?,
            },
            model_rates_path: optional_var("MODEL_RATES_PATH").map(PathBuf::from),
            blob_root: env::var("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/blobs")),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn quota_var(name: &str, default: i64) -> Result<i64> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number", name)),
        None => Ok(default),
    }
}
