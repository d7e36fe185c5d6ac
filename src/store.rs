//! SQLite-backed metric store.
//!
//! Two tables, `CompanyMetadata` and `Company`, whose layout other tooling may query directly.
//! Current-year figures are upserted; figures for any other year are written once and never
//! overwritten by a later filing.

use crate::error::{FinancialsError, Result};
use crate::normalize::{normalize_items, normalize_value};
use crate::schema::{
    CanonicalFinancials, CompanyMetadata, MetricFact, StatementType, HISTORICAL_STATEMENT,
};
use crate::utils::parse_year_key;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metric -> value for one year.
pub type YearMetrics = BTreeMap<String, f64>;

/// Year -> metrics. Serializes with the most recent year first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementYears(pub BTreeMap<i32, YearMetrics>);

impl StatementYears {
    pub fn get(&self, year: i32) -> Option<&YearMetrics> {
        self.0.get(&year)
    }

    /// Years, most recent first.
    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.keys().rev().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for StatementYears {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (year, metrics) in self.0.iter().rev() {
            map.serialize_entry(year, metrics)?;
        }
        map.end()
    }
}

/// Everything stored for one ticker, grouped by statement type, then year, then metric.
///
/// The three canonical statement types are always present, empty when nothing is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricView {
    sections: BTreeMap<String, StatementYears>,
}

impl Default for MetricView {
    fn default() -> Self {
        let sections = StatementType::ALL
            .iter()
            .map(|st| (st.label().to_string(), StatementYears::default()))
            .collect();
        Self { sections }
    }
}

impl MetricView {
    pub fn statement(&self, statement_type: &str) -> Option<&StatementYears> {
        self.sections.get(statement_type)
    }

    pub fn value(&self, statement_type: &str, year: i32, metric: &str) -> Option<f64> {
        self.statement(statement_type)?.get(year)?.get(metric).copied()
    }

    /// Statement types present, canonical ones first.
    pub fn statement_types(&self) -> Vec<&str> {
        let canonical = StatementType::ALL.iter().map(|st| st.label());
        let others = self
            .sections
            .keys()
            .map(String::as_str)
            .filter(|k| StatementType::from_label(k).is_none());
        canonical.chain(others).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(StatementYears::is_empty)
    }

    fn insert(&mut self, statement_type: String, year: i32, metric: String, value: f64) {
        self.sections
            .entry(statement_type)
            .or_default()
            .0
            .entry(year)
            .or_default()
            .insert(metric, value);
    }
}

impl Serialize for MetricView {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for statement_type in self.statement_types() {
            if let Some(years) = self.sections.get(statement_type) {
                map.serialize_entry(statement_type, years)?;
            }
        }
        map.end()
    }
}

/// Row counts of one `persist` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub current_written: usize,
    pub historical_written: usize,
    /// Historical facts already recorded for that ticker, year and metric.
    pub historical_skipped: usize,
    /// Values that were not numeric or had no usable year.
    pub dropped: usize,
}

impl PersistSummary {
    pub fn rows_written(&self) -> usize {
        self.current_written + self.historical_written
    }
}

/// How far a ticker's stored history reaches into the expected years.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Population {
    NoData,
    PartiallyPopulated { missing: Vec<i32> },
    FullyPopulated,
}

#[derive(Clone)]
pub struct MetricStore {
    pool: SqlitePool,
    ticker_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    attribute_history: bool,
}

impl MetricStore {
    /// Opens (creating if needed) the database at `path` and ensures the tables exist.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            ticker_locks: Arc::new(Mutex::new(HashMap::new())),
            attribute_history: true,
        }
    }

    /// When enabled (the default), figures for years other than the filing's own are stored
    /// under the statement they were reported in. When disabled they are stored under
    /// `"Historical"`.
    pub fn attribute_history(mut self, enabled: bool) -> Self {
        self.attribute_history = enabled;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS CompanyMetadata (
                ticker TEXT PRIMARY KEY,
                name TEXT,
                ir_url TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Company (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                ticker TEXT,
                year INTEGER,
                statement_type TEXT,
                metric TEXT,
                value REAL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(name, ticker, year, statement_type, metric)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_company_ticker_year ON Company(ticker, year)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ticker_lock(&self, ticker: &str) -> Arc<Mutex<()>> {
        let mut locks = self.ticker_locks.lock().await;
        locks.entry(ticker.to_string()).or_default().clone()
    }

    /// Forgets the ticker's lock once no other writer holds or awaits it.
    async fn release_ticker_lock(&self, ticker: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.ticker_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(ticker);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.ticker_locks.lock().await.len()
    }

    /// Writes one filing's financials in a single transaction.
    ///
    /// Metadata is inserted only if the ticker is new. Current-year metrics replace whatever
    /// is stored for the same statement and metric. Other years are skipped when the ticker
    /// already has that metric for that year under any statement type.
    pub async fn persist(
        &self,
        company_name: &str,
        ticker: &str,
        ir_url: Option<&str>,
        financials: &CanonicalFinancials,
    ) -> Result<PersistSummary> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(FinancialsError::InvalidInput(
                "ticker must not be empty".to_string(),
            ));
        }

        let lock = self.ticker_lock(ticker).await;
        let guard = lock.lock().await;
        let result = self
            .persist_locked(company_name, ticker, ir_url, financials)
            .await;
        drop(guard);
        self.release_ticker_lock(ticker, lock).await;
        result
    }

    async fn persist_locked(
        &self,
        company_name: &str,
        ticker: &str,
        ir_url: Option<&str>,
        financials: &CanonicalFinancials,
    ) -> Result<PersistSummary> {
        let mut summary = PersistSummary::default();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO CompanyMetadata (ticker, name, ir_url) VALUES (?, ?, ?) ON CONFLICT(ticker) DO NOTHING",
        )
        .bind(ticker)
        .bind(company_name)
        .bind(ir_url)
        .execute(&mut *tx)
        .await?;

        for statement_type in StatementType::ALL {
            let (values, dropped) = normalize_items(
                financials.statement(statement_type),
                financials.unit_for(statement_type),
            );
            if !dropped.is_empty() {
                debug!("{}: dropped non-numeric {:?}", statement_type, dropped);
            }
            summary.dropped += dropped.len();

            for (metric, value) in values {
                upsert_current(
                    &mut tx,
                    company_name,
                    ticker,
                    financials.year,
                    statement_type.label(),
                    &metric,
                    value,
                )
                .await?;
                summary.current_written += 1;
            }
        }

        for (statement_type, history) in &financials.historical {
            let unit = financials.unit_for(*statement_type);
            let label = if self.attribute_history {
                statement_type.label()
            } else {
                HISTORICAL_STATEMENT
            };

            for (metric, years) in history {
                for (year_key, raw) in years {
                    let year = match parse_year_key(year_key) {
                        Some(year) if year != financials.year => year,
                        _ => {
                            summary.dropped += 1;
                            continue;
                        }
                    };
                    let Some(value) = normalize_value(raw, unit) else {
                        summary.dropped += 1;
                        continue;
                    };

                    if insert_historical(&mut tx, company_name, ticker, year, label, metric, value)
                        .await?
                    {
                        summary.historical_written += 1;
                    } else {
                        summary.historical_skipped += 1;
                    }
                }
            }
        }

        tx.commit().await?;

        if summary.dropped > 0 {
            warn!(
                "{} {}: {} values were not numeric and were dropped",
                ticker, financials.year, summary.dropped
            );
        }
        info!(
            "Stored {} {}: {} current, {} historical, {} historical already present",
            ticker,
            financials.year,
            summary.current_written,
            summary.historical_written,
            summary.historical_skipped
        );

        Ok(summary)
    }

    /// Every stored figure for `ticker`. An unknown ticker yields the empty view.
    pub async fn read(&self, ticker: &str) -> Result<MetricView> {
        let mut view = MetricView::default();
        for fact in self.facts(ticker).await? {
            view.insert(fact.statement_type, fact.year, fact.metric, fact.value);
        }
        Ok(view)
    }

    /// Raw rows for `ticker`, most recent year first.
    pub async fn facts(&self, ticker: &str) -> Result<Vec<MetricFact>> {
        let rows = sqlx::query(
            "SELECT name, ticker, year, statement_type, metric, value FROM Company WHERE ticker = ? ORDER BY year DESC, statement_type, metric",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MetricFact {
                company_name: row.get::<Option<String>, _>("name").unwrap_or_default(),
                ticker: row.get::<Option<String>, _>("ticker").unwrap_or_default(),
                year: row.get::<Option<i64>, _>("year").unwrap_or_default() as i32,
                statement_type: row
                    .get::<Option<String>, _>("statement_type")
                    .unwrap_or_default(),
                metric: row.get::<Option<String>, _>("metric").unwrap_or_default(),
                value: row.get::<Option<f64>, _>("value").unwrap_or_default(),
            })
            .collect())
    }

    pub async fn company_metadata(&self, ticker: &str) -> Result<Option<CompanyMetadata>> {
        let row = sqlx::query(
            "SELECT ticker, name, ir_url, CAST(created_at AS TEXT) AS created_at FROM CompanyMetadata WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CompanyMetadata {
            ticker: row.get("ticker"),
            name: row.get("name"),
            ir_url: row.get("ir_url"),
            created_at: parse_timestamp(row.get("created_at")),
        }))
    }

    /// When any figure for `ticker` was last written.
    pub async fn last_updated(&self, ticker: &str) -> Result<Option<NaiveDateTime>> {
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT CAST(MAX(updated_at) AS TEXT) FROM Company WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_one(&self.pool)
        .await?;

        Ok(parse_timestamp(latest))
    }

    /// Distinct years with at least one figure, most recent first.
    pub async fn years_present(&self, ticker: &str) -> Result<Vec<i32>> {
        let years: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT year FROM Company WHERE ticker = ? AND year IS NOT NULL ORDER BY year DESC",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(years.into_iter().map(|y| y as i32).collect())
    }

    pub async fn has_data(&self, ticker: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM Company WHERE ticker = ?)")
                .bind(ticker)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn population<I>(&self, ticker: &str, expected_years: I) -> Result<Population>
    where
        I: IntoIterator<Item = i32>,
    {
        let present = self.years_present(ticker).await?;
        if present.is_empty() {
            return Ok(Population::NoData);
        }

        let mut missing: Vec<i32> = expected_years
            .into_iter()
            .filter(|year| !present.contains(year))
            .collect();
        missing.sort_unstable();
        missing.dedup();

        Ok(if missing.is_empty() {
            Population::FullyPopulated
        } else {
            Population::PartiallyPopulated { missing }
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn upsert_current(
    tx: &mut Transaction<'_, Sqlite>,
    company_name: &str,
    ticker: &str,
    year: i32,
    statement_type: &str,
    metric: &str,
    value: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO Company (name, ticker, year, statement_type, metric, value)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(name, ticker, year, statement_type, metric) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(company_name)
    .bind(ticker)
    .bind(year)
    .bind(statement_type)
    .bind(metric)
    .bind(value)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Returns false when the ticker already has `metric` for `year`.
async fn insert_historical(
    tx: &mut Transaction<'_, Sqlite>,
    company_name: &str,
    ticker: &str,
    year: i32,
    statement_type: &str,
    metric: &str,
    value: f64,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM Company WHERE ticker = ? AND year = ? AND metric = ?)",
    )
    .bind(ticker)
    .bind(year)
    .bind(metric)
    .fetch_one(&mut **tx)
    .await?;

    if exists {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO Company (name, ticker, year, statement_type, metric, value) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(company_name)
    .bind(ticker)
    .bind(year)
    .bind(statement_type)
    .bind(metric)
    .bind(value)
    .execute(&mut **tx)
    .await?;
    Ok(true)
}

fn parse_timestamp(text: Option<String>) -> Option<NaiveDateTime> {
    text.and_then(|t| NaiveDateTime::parse_from_str(&t, SQLITE_TIMESTAMP_FORMAT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawValue, ReportingUnit};
    use tempfile::TempDir;

    async fn open_store() -> (MetricStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MetricStore::connect(&dir.path().join("metrics.sqlite"))
            .await
            .unwrap();
        (store, dir)
    }

    fn financials(year: i32, revenue: &str) -> CanonicalFinancials {
        let mut financials = CanonicalFinancials::new(year);
        financials.unit = Some(ReportingUnit::Units);
        financials
            .income_statement
            .insert("Revenue".to_string(), RawValue::from(revenue));
        financials
    }

    fn with_history(
        mut financials: CanonicalFinancials,
        metric: &str,
        year: &str,
        value: &str,
    ) -> CanonicalFinancials {
        financials
            .historical
            .entry(StatementType::IncomeStatement)
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .insert(year.to_string(), RawValue::from(value));
        financials
    }

    async fn row_count(store: &MetricStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM Company")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identical_persist_is_idempotent() {
        let (store, _dir) = open_store().await;
        let filing = with_history(financials(2024, "1000"), "Revenue", "2023", "900");

        store.persist("TechCo", "TCO", None, &filing).await.unwrap();
        let second = store.persist("TechCo", "TCO", None, &filing).await.unwrap();

        assert_eq!(row_count(&store).await, 2);
        assert_eq!(second.historical_skipped, 1);
    }

    #[tokio::test]
    async fn test_historical_facts_are_never_overwritten() {
        let (store, _dir) = open_store().await;
        store
            .persist(
                "TechCo",
                "TCO",
                None,
                &with_history(financials(2024, "1000"), "Revenue", "2023", "900"),
            )
            .await
            .unwrap();
        let summary = store
            .persist(
                "TechCo",
                "TCO",
                None,
                &with_history(financials(2024, "1000"), "Revenue", "2023", "950"),
            )
            .await
            .unwrap();

        assert_eq!(summary.historical_written, 0);
        assert_eq!(summary.historical_skipped, 1);
        let view = store.read("TCO").await.unwrap();
        assert_eq!(view.value("Income Statement", 2023, "Revenue"), Some(900.0));
    }

    #[tokio::test]
    async fn test_current_year_is_overwritten() {
        let (store, _dir) = open_store().await;
        store
            .persist("TechCo", "TCO", None, &financials(2024, "1000"))
            .await
            .unwrap();
        store
            .persist("TechCo", "TCO", None, &financials(2024, "1100"))
            .await
            .unwrap();

        assert_eq!(row_count(&store).await, 1);
        let view = store.read("TCO").await.unwrap();
        assert_eq!(view.value("Income Statement", 2024, "Revenue"), Some(1100.0));
    }

    #[tokio::test]
    async fn test_read_reconstructs_nested_view() {
        let (store, _dir) = open_store().await;
        let filing = with_history(financials(2024, "1000"), "Revenue", "2023", "900");
        store
            .persist("TechCo", "TCO", Some("https://ir.techco.example"), &filing)
            .await
            .unwrap();

        let json = serde_json::to_value(store.read("TCO").await.unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Income Statement": {"2024": {"Revenue": 1000.0}, "2023": {"Revenue": 900.0}},
                "Balance Sheet": {},
                "Cash Flow Statement": {}
            })
        );

        let text = serde_json::to_string(&store.read("TCO").await.unwrap()).unwrap();
        assert!(text.find("\"2024\"").unwrap() < text.find("\"2023\"").unwrap());
    }

    #[tokio::test]
    async fn test_unknown_ticker_reads_empty() {
        let (store, _dir) = open_store().await;
        let view = store.read("NOPE").await.unwrap();

        assert!(view.is_empty());
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({"Income Statement": {}, "Balance Sheet": {}, "Cash Flow Statement": {}})
        );
        assert!(!store.has_data("NOPE").await.unwrap());
        assert_eq!(store.company_metadata("NOPE").await.unwrap(), None);
        assert_eq!(store.last_updated("NOPE").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unattributed_history_uses_historical_label() {
        let (store, _dir) = open_store().await;
        let store = store.attribute_history(false);
        let filing = with_history(financials(2024, "1000"), "Revenue", "2022", "800");
        store.persist("TechCo", "TCO", None, &filing).await.unwrap();

        let view = store.read("TCO").await.unwrap();
        assert_eq!(view.value(HISTORICAL_STATEMENT, 2022, "Revenue"), Some(800.0));
        assert_eq!(
            view.statement_types(),
            vec!["Income Statement", "Balance Sheet", "Cash Flow Statement", "Historical"]
        );
    }

    #[tokio::test]
    async fn test_metadata_first_writer_wins() {
        let (store, _dir) = open_store().await;
        store
            .persist("TechCo", "TCO", Some("https://a.example"), &financials(2024, "1"))
            .await
            .unwrap();
        store
            .persist("TechCo Inc", "TCO", Some("https://b.example"), &financials(2024, "2"))
            .await
            .unwrap();

        let meta = store.company_metadata("TCO").await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("TechCo"));
        assert_eq!(meta.ir_url.as_deref(), Some("https://a.example"));
        assert!(meta.created_at.is_some());
        assert!(store.last_updated("TCO").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_numeric_values_are_dropped() {
        let (store, _dir) = open_store().await;
        let mut filing = financials(2024, "n/a");
        filing
            .balance_sheet
            .insert("Cash".to_string(), RawValue::from("7,005"));
        let filing = with_history(filing, "Revenue", "prior year", "900");

        let summary = store.persist("TechCo", "TCO", None, &filing).await.unwrap();
        assert_eq!(summary.current_written, 1);
        assert_eq!(summary.dropped, 2);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_each_statement_uses_its_declared_unit() {
        let (store, _dir) = open_store().await;
        let mut filing = financials(2024, "1,000");
        filing.unit = Some(ReportingUnit::Millions);
        filing
            .units
            .insert(StatementType::IncomeStatement, ReportingUnit::Millions);
        filing
            .units
            .insert(StatementType::BalanceSheet, ReportingUnit::Thousands);
        filing
            .balance_sheet
            .insert("Total assets".to_string(), RawValue::from("300"));
        filing
            .cash_flow_statement
            .insert("Capex".to_string(), RawValue::from("(2)"));
        let mut filing = with_history(filing, "Revenue", "2023", "900");
        filing
            .historical
            .entry(StatementType::BalanceSheet)
            .or_default()
            .entry("Total assets".to_string())
            .or_default()
            .insert("2023".to_string(), RawValue::from("280"));

        store.persist("TechCo", "TCO", None, &filing).await.unwrap();

        let view = store.read("TCO").await.unwrap();
        assert_eq!(view.value("Income Statement", 2024, "Revenue"), Some(1_000_000_000.0));
        assert_eq!(view.value("Income Statement", 2023, "Revenue"), Some(900_000_000.0));
        assert_eq!(view.value("Balance Sheet", 2024, "Total assets"), Some(300_000.0));
        assert_eq!(view.value("Balance Sheet", 2023, "Total assets"), Some(280_000.0));
        // Falls back to the filing-wide unit.
        assert_eq!(view.value("Cash Flow Statement", 2024, "Capex"), Some(-2_000_000.0));
    }

    #[tokio::test]
    async fn test_population_tracks_expected_years() {
        let (store, _dir) = open_store().await;
        assert_eq!(
            store.population("TCO", 2022..=2024).await.unwrap(),
            Population::NoData
        );

        let filing = with_history(financials(2024, "1000"), "Revenue", "2023", "900");
        store.persist("TechCo", "TCO", None, &filing).await.unwrap();

        assert_eq!(store.years_present("TCO").await.unwrap(), vec![2024, 2023]);
        assert_eq!(
            store.population("TCO", 2022..=2024).await.unwrap(),
            Population::PartiallyPopulated {
                missing: vec![2022]
            }
        );
        assert_eq!(
            store.population("TCO", 2023..=2024).await.unwrap(),
            Population::FullyPopulated
        );
    }

    #[tokio::test]
    async fn test_empty_ticker_is_rejected() {
        let (store, _dir) = open_store().await;
        let result = store.persist("TechCo", "  ", None, &financials(2024, "1")).await;
        assert!(matches!(result, Err(FinancialsError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_concurrent_persists_for_one_ticker() {
        let (store, _dir) = open_store().await;
        let filing = with_history(financials(2024, "1000"), "Revenue", "2023", "900");

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let filing = filing.clone();
                tokio::spawn(async move { store.persist("TechCo", "TCO", None, &filing).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(row_count(&store).await, 2);
        assert_eq!(store.tracked_locks().await, 0);
    }
}
