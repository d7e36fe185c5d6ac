//! # Annual Report Financials
//!
//! A library for pulling income statement, balance sheet and cash flow figures out of annual
//! report PDFs and accumulating them, year by year, in a per-company SQLite store.
//!
//! ## Core Concepts
//!
//! - **Page classification**: three progressively stricter passes (keywords, table signals,
//!   tabular structure) narrow a report down to its statement pages
//! - **Text blocks**: candidate pages are reduced to table rows and numeric lines and sent to
//!   an extraction oracle (an LLM) in small batches
//! - **Canonical financials**: batch results are merged per statement type; figures for other
//!   years ride along as historical data
//! - **Metric store**: current-year figures are upserted, historical figures are written once
//!   and never overwritten
//!
//! ## Example
//!
//! ```rust,ignore
//! use annual_report_financials::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let store = MetricStore::connect(&config.database_path).await?;
//! let pipeline = Pipeline::new(GeminiClient::from_env()?, config);
//!
//! let filing = Filing::from_path("reports/ASML_2023.pdf", "ASML Holding")?;
//! let result = pipeline.ingest(&store, &filing).await?;
//! println!("{} rows written", result.summary.rows_written());
//!
//! let view = store.read("ASML").await?;
//! println!("{}", serde_json::to_string_pretty(&view)?);
//! ```

pub mod assembler;
pub mod classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod text_blocks;
pub mod utils;

pub use assembler::{assemble, StatementAssembler};
pub use classifier::{has_numbers, Classification, PageClassifier};
pub use config::{ExtractionScope, PipelineConfig};
pub use document::{Document, Page, TextLayer};
pub use error::{FinancialsError, Result};
pub use llm::{
    parse_statement_record, BatchOutcome, ExtractionEvent, ExtractionMode, ExtractionOracle,
    OracleAdapter, OracleOutcome, OracleReply, OracleRequest,
};
#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
#[cfg(feature = "openai")]
pub use llm::OpenAiClient;
pub use normalize::{normalize_value, normalize_with_source, ScaleSource};
pub use pipeline::{filings_in_dir, Filing, FilingResult, Pipeline};
pub use reconcile::{match_metric, reconcile, ReferenceKeys, Reconciler};
pub use schema::*;
pub use store::{MetricStore, MetricView, PersistSummary, Population};
pub use text_blocks::{TextBlock, TextBlockExtractor};
pub use utils::*;

use std::collections::BTreeMap;
use std::path::Path;

/// Opens one report and extracts its financials without touching a store.
pub async fn extract_financials<O: ExtractionOracle>(
    oracle: O,
    path: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<FinancialsReport> {
    config.validate()?;
    let pipeline = Pipeline::new(oracle, config);
    let filing = Filing::new(path.as_ref(), "", "");
    let document = pipeline.open(&filing).await?;
    let financials = pipeline.run(&document).await;
    Ok(pipeline.report(&financials))
}

/// Ingests every `TICKER_YEAR.pdf` in `dir` into the store at `config.database_path`, one
/// ticker at a time, and returns each ticker's stored view. Filings that fail are logged and
/// skipped.
pub async fn ingest_directory<O: ExtractionOracle>(
    oracle: O,
    dir: impl AsRef<Path>,
    company_name: &str,
    config: PipelineConfig,
) -> Result<BTreeMap<String, MetricView>> {
    config.validate()?;
    let store = MetricStore::connect(&config.database_path).await?;

    let mut by_ticker: BTreeMap<String, Vec<Filing>> = BTreeMap::new();
    for filing in filings_in_dir(dir.as_ref(), company_name)? {
        by_ticker.entry(filing.ticker.clone()).or_default().push(filing);
    }

    let pipeline = Pipeline::new(oracle, config);
    let mut views = BTreeMap::new();
    for (ticker, filings) in by_ticker {
        for result in pipeline.ingest_all(&store, filings).await {
            if let Err(e) = result {
                log::warn!("{}: filing skipped: {}", ticker, e);
            }
        }
        views.insert(ticker.clone(), store.read(&ticker).await?);
    }
    Ok(views)
}
