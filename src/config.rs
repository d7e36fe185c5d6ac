use crate::error::{FinancialsError, Result};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FINANCIALS_";

/// Which line items the oracle is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionScope {
    /// Revenue, cost of revenue and operating expense families only.
    Focused,
    /// Every line item the oracle can discern.
    AllItems,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
    #[serde(default)]
    pub oracle_retries: usize,
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,
    #[serde(default = "default_fiscal_year")]
    pub default_fiscal_year: i32,
    #[serde(default = "default_first_year")]
    pub first_year: i32,
    #[serde(default = "default_last_year")]
    pub last_year: i32,
    #[serde(default = "default_scope")]
    pub extraction_scope: ExtractionScope,
    /// Ask later filings only for the line items found in the most recent one.
    #[serde(default)]
    pub reuse_reference_keys: bool,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_batch_size() -> usize {
    2
}
fn default_oracle_timeout_secs() -> u64 {
    60
}
fn default_max_concurrent_documents() -> usize {
    4
}
fn default_fiscal_year() -> i32 {
    2024
}
fn default_first_year() -> i32 {
    2014
}
fn default_last_year() -> i32 {
    2024
}
fn default_scope() -> ExtractionScope {
    ExtractionScope::Focused
}
fn default_match_threshold() -> f64 {
    0.5
}
fn default_database_path() -> PathBuf {
    PathBuf::from("data.sqlite")
}
fn default_model() -> String {
    "gpt-4o".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            oracle_retries: 0,
            max_concurrent_documents: default_max_concurrent_documents(),
            default_fiscal_year: default_fiscal_year(),
            first_year: default_first_year(),
            last_year: default_last_year(),
            extraction_scope: default_scope(),
            reuse_reference_keys: false,
            match_threshold: default_match_threshold(),
            database_path: default_database_path(),
            model: default_model(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FINANCIALS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("BATCH_SIZE") {
            config.batch_size = parse_var("BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("ORACLE_TIMEOUT_SECS") {
            config.oracle_timeout_secs = parse_var("ORACLE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("ORACLE_RETRIES") {
            config.oracle_retries = parse_var("ORACLE_RETRIES", &v)?;
        }
        if let Some(v) = var("MAX_CONCURRENT_DOCUMENTS") {
            config.max_concurrent_documents = parse_var("MAX_CONCURRENT_DOCUMENTS", &v)?;
        }
        if let Some(v) = var("DEFAULT_FISCAL_YEAR") {
            config.default_fiscal_year = parse_var("DEFAULT_FISCAL_YEAR", &v)?;
        }
        if let Some(v) = var("FIRST_YEAR") {
            config.first_year = parse_var("FIRST_YEAR", &v)?;
        }
        if let Some(v) = var("LAST_YEAR") {
            config.last_year = parse_var("LAST_YEAR", &v)?;
        }
        if let Some(v) = var("EXTRACTION_SCOPE") {
            config.extraction_scope = match v.trim().to_lowercase().as_str() {
                "focused" => ExtractionScope::Focused,
                "all_items" | "all" => ExtractionScope::AllItems,
                other => {
                    return Err(FinancialsError::InvalidConfig(format!(
                        "{}EXTRACTION_SCOPE must be 'focused' or 'all_items', got '{}'",
                        ENV_PREFIX, other
                    )))
                }
            };
        }
        if let Some(v) = var("REUSE_REFERENCE_KEYS") {
            config.reuse_reference_keys = parse_var("REUSE_REFERENCE_KEYS", &v)?;
        }
        if let Some(v) = var("MATCH_THRESHOLD") {
            config.match_threshold = parse_var("MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("MODEL") {
            config.model = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FinancialsError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_documents == 0 {
            return Err(FinancialsError::InvalidConfig(
                "max_concurrent_documents must be at least 1".to_string(),
            ));
        }
        if self.first_year > self.last_year {
            return Err(FinancialsError::InvalidConfig(format!(
                "year range {}..={} is empty",
                self.first_year, self.last_year
            )));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(FinancialsError::InvalidConfig(format!(
                "match_threshold {} must be between 0.0 and 1.0",
                self.match_threshold
            )));
        }
        Ok(())
    }

    pub fn year_range(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        FinancialsError::InvalidConfig(format!(
            "{}{} has an invalid value '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
