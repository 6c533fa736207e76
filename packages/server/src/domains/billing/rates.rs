//! Per-model cost multipliers.
//!
//! Rates come from a JSON document shaped like
//! `{"chinese": {"<model>": {"cost_multiplier": 1.5}}, "english": {...}}`.
//! The native-language (`chinese`) catalog is consulted first, then `english`.
//! Model names are matched case-insensitively.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_MULTIPLIER: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ModelRate {
    #[serde(default)]
    pub cost_multiplier: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelRateCatalog {
    #[serde(default)]
    chinese: HashMap<String, ModelRate>,
    #[serde(default)]
    english: HashMap<String, ModelRate>,
}

impl ModelRateCatalog {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: ModelRateCatalog =
            serde_json::from_str(text).context("Invalid model rate catalog")?;
        Ok(Self {
            chinese: lowercase_keys(raw.chinese),
            english: lowercase_keys(raw.english),
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read model rates from {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn with_native_rate(mut self, model: &str, cost_multiplier: f64) -> Self {
        self.chinese
            .insert(model.to_lowercase(), ModelRate { cost_multiplier });
        self
    }

    pub fn with_fallback_rate(mut self, model: &str, cost_multiplier: f64) -> Self {
        self.english
            .insert(model.to_lowercase(), ModelRate { cost_multiplier });
        self
    }

    /// Multiplier for `model`; 1.0 when no model is selected or no positive
    /// rate is configured.
    pub fn cost_multiplier(&self, model: Option<&str>) -> f64 {
        let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) else {
            return DEFAULT_MULTIPLIER;
        };
        let key = model.to_lowercase();

        let configured = [&self.chinese, &self.english]
            .into_iter()
            .filter_map(|catalog| catalog.get(&key))
            .map(|rate| rate.cost_multiplier)
            .find(|m| m.is_finite() && *m > 0.0);

        match configured {
            Some(multiplier) => multiplier,
            None => {
                warn!(
                    model = %model,
                    default = DEFAULT_MULTIPLIER,
                    "No cost multiplier configured for model, using default"
                );
                DEFAULT_MULTIPLIER
            }
        }
    }
}

fn lowercase_keys(rates: HashMap<String, ModelRate>) -> HashMap<String, ModelRate> {
    rates
        .into_iter()
        .map(|(model, rate)| (model.to_lowercase(), rate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "chinese": {
            "DeepSeek-Chat": {"cost_multiplier": 1.5},
            "qwen-max": {"cost_multiplier": 0}
        },
        "english": {
            "deepseek-chat": {"cost_multiplier": 3.0},
            "qwen-max": {"cost_multiplier": 2.0},
            "gpt-4o": {"cost_multiplier": 4.0}
        }
    }"#;

    #[test]
    fn test_native_catalog_wins() {
        let catalog = ModelRateCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.cost_multiplier(Some("deepseek-chat")), 1.5);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = ModelRateCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.cost_multiplier(Some("GPT-4o")), 4.0);
    }

    #[test]
    fn test_zero_native_rate_falls_back() {
        let catalog = ModelRateCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.cost_multiplier(Some("qwen-max")), 2.0);
    }

    #[test]
    fn test_missing_model_defaults_to_one() {
        let catalog = ModelRateCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.cost_multiplier(Some("unknown-model")), 1.0);
        assert_eq!(catalog.cost_multiplier(None), 1.0);
        assert_eq!(catalog.cost_multiplier(Some("  ")), 1.0);
    }

    #[test]
    fn test_builders() {
        let catalog = ModelRateCatalog::default()
            .with_fallback_rate("Claude", 2.5)
            .with_native_rate("glm-4", 0.8);
        assert_eq!(catalog.cost_multiplier(Some("claude")), 2.5);
        assert_eq!(catalog.cost_multiplier(Some("GLM-4")), 0.8);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(ModelRateCatalog::from_json("{not json").is_err());
    }
}
