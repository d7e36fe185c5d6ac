use crate::assembler::StatementAssembler;
use crate::classifier::PageClassifier;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{FinancialsError, Result};
use crate::llm::adapter::{OracleAdapter, OracleOutcome};
use crate::llm::oracle::ExtractionOracle;
use crate::llm::prompts::ExtractionMode;
use crate::llm::types::ExtractionEvent;
use crate::reconcile::{ReferenceKeys, Reconciler};
use crate::schema::{CanonicalFinancials, FinancialsReport};
use crate::store::{MetricStore, PersistSummary};
use crate::text_blocks::TextBlockExtractor;
use crate::utils::{fiscal_year_from_path, ticker_from_path};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Sender;

/// One annual report to ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct Filing {
    pub path: PathBuf,
    pub ticker: String,
    pub company_name: String,
    pub ir_url: Option<String>,
    /// Overrides the year read from the file name.
    pub year: Option<i32>,
}

impl Filing {
    pub fn new(
        path: impl Into<PathBuf>,
        ticker: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            ticker: ticker.into(),
            company_name: company_name.into(),
            ir_url: None,
            year: None,
        }
    }

    /// Reads the ticker from a `TICKER_YEAR.pdf` file name.
    pub fn from_path(path: impl Into<PathBuf>, company_name: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let ticker = ticker_from_path(&path).ok_or_else(|| {
            FinancialsError::InvalidInput(format!(
                "no ticker prefix in file name {}",
                path.display()
            ))
        })?;
        Ok(Self::new(path, ticker, company_name))
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_ir_url(mut self, ir_url: impl Into<String>) -> Self {
        self.ir_url = Some(ir_url.into());
        self
    }

    pub fn resolved_year(&self, default_year: i32) -> i32 {
        self.year
            .or_else(|| fiscal_year_from_path(&self.path))
            .unwrap_or(default_year)
    }
}

/// What ingesting one filing produced.
#[derive(Debug, Clone)]
pub struct FilingResult {
    pub filing: Filing,
    pub financials: CanonicalFinancials,
    pub summary: PersistSummary,
}

pub struct Pipeline<O> {
    adapter: OracleAdapter<O>,
    classifier: PageClassifier,
    extractor: TextBlockExtractor,
    config: PipelineConfig,
    progress: Option<Sender<ExtractionEvent>>,
}

impl<O: ExtractionOracle> Pipeline<O> {
    pub fn new(oracle: O, config: PipelineConfig) -> Self {
        Self {
            adapter: OracleAdapter::from_config(oracle, &config),
            classifier: PageClassifier::new(config.year_range()),
            extractor: TextBlockExtractor::new(),
            config,
            progress: None,
        }
    }

    /// Replaces the adapter, e.g. to enable structured output.
    pub fn with_adapter(mut self, adapter: OracleAdapter<O>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_progress(mut self, progress: Sender<ExtractionEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classifies, extracts and assembles one document. Oracle failures only cost the
    /// affected batch; a document without candidate pages yields empty financials.
    pub async fn run(&self, document: &Document) -> CanonicalFinancials {
        self.run_with(&self.adapter, document).await
    }

    async fn run_with<P: ExtractionOracle>(
        &self,
        adapter: &OracleAdapter<P>,
        document: &Document,
    ) -> CanonicalFinancials {
        self.send_event(ExtractionEvent::Starting {
            path: document.path.display().to_string(),
            year: document.year,
        })
        .await;

        let candidates = self.classifier.classify(document).into_candidates();
        self.send_event(ExtractionEvent::Classified {
            pages: document.page_count(),
            candidates: candidates.len(),
        })
        .await;

        let blocks = self
            .extractor
            .extract_batches(document, &candidates, self.config.batch_size);
        info!(
            "{}: {} candidate pages in {} batches",
            document.path.display(),
            candidates.len(),
            blocks.len()
        );

        let mut assembler = StatementAssembler::new(document.year);
        for block in blocks {
            let pages: Vec<usize> = block.pages.iter().map(|p| p + 1).collect();
            let unit = block.unit;
            assembler.observe_unit(unit);

            if block.is_empty() {
                self.send_event(ExtractionEvent::BatchSkipped { pages }).await;
                continue;
            }

            self.send_event(ExtractionEvent::BatchSent {
                pages: pages.clone(),
            })
            .await;
            let outcome = adapter.extract_block(&block, document.year).await;
            assembler.add_usage(outcome.usage);

            match outcome.outcome {
                OracleOutcome::Parsed(record) => {
                    self.send_event(ExtractionEvent::BatchParsed {
                        pages,
                        statement_type: record.statement_type.clone(),
                        items: record.data.len() + record.historical_data.len(),
                    })
                    .await;
                    assembler.absorb_declared(record, unit);
                }
                OracleOutcome::ParseError(raw) => {
                    warn!("Pages {:?}: unreadable oracle reply", pages);
                    self.send_event(ExtractionEvent::BatchFailed {
                        pages,
                        reason: format!("unreadable reply ({} chars)", raw.len()),
                    })
                    .await;
                }
                OracleOutcome::CallFailed(reason) => {
                    warn!("Pages {:?}: {}", pages, reason);
                    self.send_event(ExtractionEvent::BatchFailed { pages, reason })
                        .await;
                }
                OracleOutcome::Empty => {
                    self.send_event(ExtractionEvent::BatchSkipped { pages }).await;
                }
            }
        }

        let financials = assembler.finish();
        self.send_event(ExtractionEvent::Assembled {
            metrics: financials.metric_count(),
            total_tokens: financials.usage.total_tokens,
        })
        .await;
        info!(
            "{}: {} current-year metrics, {} tokens",
            document.path.display(),
            financials.metric_count(),
            financials.usage.total_tokens
        );
        financials
    }

    /// Loads a filing's PDF off the async runtime.
    pub async fn open(&self, filing: &Filing) -> Result<Document> {
        let path = filing.path.clone();
        let year = filing.resolved_year(self.config.default_fiscal_year);
        let mut document = tokio::task::spawn_blocking(move || Document::open(&path, year))
            .await
            .map_err(|e| FinancialsError::DocumentUnreadable {
                path: filing.path.display().to_string(),
                details: e.to_string(),
            })??;
        document.year = year;
        Ok(document)
    }

    /// Runs and persists one filing.
    pub async fn ingest(&self, store: &MetricStore, filing: &Filing) -> Result<FilingResult> {
        let document = self.open(filing).await?;
        let financials = self.run(&document).await;
        self.persist(store, filing, financials).await
    }

    /// Ingests a company's filings, most recent year first.
    ///
    /// The first filing that yields any metric becomes the reference: later filings have
    /// their labels reconciled onto it, and with `reuse_reference_keys` they are asked only
    /// for its line items. Filings after the reference run concurrently.
    pub async fn ingest_all(
        &self,
        store: &MetricStore,
        filings: Vec<Filing>,
    ) -> Vec<Result<FilingResult>> {
        let default_year = self.config.default_fiscal_year;
        let mut pending = filings;
        pending.sort_by_key(|f| std::cmp::Reverse(f.resolved_year(default_year)));
        let mut pending = pending.into_iter();

        let mut results = Vec::new();
        let mut reference = None;

        for filing in pending.by_ref() {
            let result = self.ingest(store, &filing).await;
            if let Ok(done) = &result {
                if !done.financials.is_empty() {
                    reference = Some(ReferenceKeys::from_financials(&done.financials));
                }
            }
            results.push(result);
            if reference.is_some() {
                break;
            }
        }

        let Some(reference) = reference else {
            return results;
        };
        info!("Reference filing has {} line items", reference.len());

        let rest: Vec<Filing> = pending.collect();
        let known = self
            .config
            .reuse_reference_keys
            .then(|| self.adapter.scoped(ExtractionMode::KnownKeys(reference.clone())));
        let reconciler = Reconciler::new(self.config.match_threshold);

        let later: Vec<Result<FilingResult>> = stream::iter(rest)
            .map(|filing| {
                let known = known.as_ref();
                let reference = &reference;
                async move {
                    let document = self.open(&filing).await?;
                    let financials = match known {
                        Some(adapter) => self.run_with(adapter, &document).await,
                        None => self.run(&document).await,
                    };
                    let financials = reconciler.reconcile(&financials, reference);
                    self.persist(store, &filing, financials).await
                }
            })
            .buffer_unordered(self.config.max_concurrent_documents.max(1))
            .collect()
            .await;

        results.extend(later);
        results
    }

    async fn persist(
        &self,
        store: &MetricStore,
        filing: &Filing,
        financials: CanonicalFinancials,
    ) -> Result<FilingResult> {
        let summary = store
            .persist(
                &filing.company_name,
                &filing.ticker,
                filing.ir_url.as_deref(),
                &financials,
            )
            .await?;
        self.send_event(ExtractionEvent::Persisted {
            ticker: filing.ticker.clone(),
            year: financials.year,
            rows: summary.rows_written(),
        })
        .await;

        Ok(FilingResult {
            filing: filing.clone(),
            financials,
            summary,
        })
    }

    pub fn report(&self, financials: &CanonicalFinancials) -> FinancialsReport {
        FinancialsReport::from(financials)
    }

    async fn send_event(&self, event: ExtractionEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

/// Filings for every `TICKER_YEAR.pdf` in `dir`.
pub fn filings_in_dir(dir: &Path, company_name: &str) -> Result<Vec<Filing>> {
    let mut filings = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        match Filing::from_path(&path, company_name) {
            Ok(filing) => filings.push(filing),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    filings.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(filings)
}
