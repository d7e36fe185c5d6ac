use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Statement type under which facts for years other than a filing's own year are recorded
/// when the originating statement is unknown.
pub const HISTORICAL_STATEMENT: &str = "Historical";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum StatementType {
    #[serde(rename = "Income Statement")]
    #[schemars(description = "Revenue, costs and expenses for the fiscal year (period totals)")]
    IncomeStatement,

    #[serde(rename = "Balance Sheet")]
    #[schemars(description = "Assets, liabilities and equity at the fiscal year end (point in time)")]
    BalanceSheet,

    #[serde(rename = "Cash Flow Statement")]
    #[schemars(description = "Operating, investing and financing cash flows for the fiscal year")]
    CashFlowStatement,
}

impl StatementType {
    pub const ALL: [StatementType; 3] = [
        StatementType::IncomeStatement,
        StatementType::BalanceSheet,
        StatementType::CashFlowStatement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "Income Statement",
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::CashFlowStatement => "Cash Flow Statement",
        }
    }

    /// Resolves an oracle-supplied label. Matching ignores case, surrounding whitespace and
    /// inner spacing, so "income statement" and "IncomeStatement" both resolve; anything else
    /// is rejected.
    pub fn from_label(label: &str) -> Option<Self> {
        let squashed: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        Self::ALL.into_iter().find(|st| {
            let canonical: String = st
                .label()
                .chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(char::to_lowercase)
                .collect();
            canonical == squashed
        })
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value exactly as the oracle reported it, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Accepts JSON numbers and strings. Nulls, booleans, arrays and objects carry no figure.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(RawValue::Number),
            serde_json::Value::String(s) => Some(RawValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

pub type LineItems = BTreeMap<String, RawValue>;

/// Line item -> year (as written, e.g. "2023") -> value.
pub type HistoricalData = BTreeMap<String, BTreeMap<String, RawValue>>;

/// The unvalidated result of one oracle call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    /// Label exactly as returned; may be empty or unrecognized.
    pub statement_type: String,
    pub data: LineItems,
    pub historical_data: HistoricalData,
}

impl StatementRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<StatementType> {
        StatementType::from_label(&self.statement_type)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.historical_data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// The scale a report declares for its tables ("in millions", "in thousands", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingUnit {
    Units,
    Thousands,
    Millions,
    Billions,
}

impl ReportingUnit {
    pub fn multiplier(&self) -> f64 {
        match self {
            ReportingUnit::Units => 1.0,
            ReportingUnit::Thousands => 1_000.0,
            ReportingUnit::Millions => 1_000_000.0,
            ReportingUnit::Billions => 1_000_000_000.0,
        }
    }
}

/// Everything extracted from one filing, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFinancials {
    /// Fiscal year the filing reports on; `Data` values belong to this year.
    pub year: i32,
    pub income_statement: LineItems,
    pub balance_sheet: LineItems,
    pub cash_flow_statement: LineItems,
    /// Prior-year values, kept per originating statement.
    pub historical: BTreeMap<StatementType, HistoricalData>,
    /// First unit declared anywhere in the filing.
    pub unit: Option<ReportingUnit>,
    /// Unit declared on the pages each statement was read from.
    pub units: BTreeMap<StatementType, ReportingUnit>,
    pub usage: TokenUsage,
}

impl CanonicalFinancials {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            income_statement: LineItems::new(),
            balance_sheet: LineItems::new(),
            cash_flow_statement: LineItems::new(),
            historical: BTreeMap::new(),
            unit: None,
            units: BTreeMap::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Scale of a statement's figures: its own declared unit, else the filing's.
    pub fn unit_for(&self, statement_type: StatementType) -> Option<ReportingUnit> {
        self.units.get(&statement_type).copied().or(self.unit)
    }

    pub fn statement(&self, statement_type: StatementType) -> &LineItems {
        match statement_type {
            StatementType::IncomeStatement => &self.income_statement,
            StatementType::BalanceSheet => &self.balance_sheet,
            StatementType::CashFlowStatement => &self.cash_flow_statement,
        }
    }

    pub fn statement_mut(&mut self, statement_type: StatementType) -> &mut LineItems {
        match statement_type {
            StatementType::IncomeStatement => &mut self.income_statement,
            StatementType::BalanceSheet => &mut self.balance_sheet,
            StatementType::CashFlowStatement => &mut self.cash_flow_statement,
        }
    }

    /// Historical values of every statement merged into one mapping. Years of the same line
    /// item are unioned; on a clash the later statement (in `StatementType::ALL` order) wins.
    pub fn historical_data(&self) -> HistoricalData {
        let mut combined = HistoricalData::new();
        for statement_type in StatementType::ALL {
            if let Some(history) = self.historical.get(&statement_type) {
                for (item, years) in history {
                    combined
                        .entry(item.clone())
                        .or_default()
                        .extend(years.iter().map(|(y, v)| (y.clone(), v.clone())));
                }
            }
        }
        combined
    }

    pub fn metric_count(&self) -> usize {
        StatementType::ALL
            .iter()
            .map(|st| self.statement(*st).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.metric_count() == 0 && self.historical.values().all(|h| h.is_empty())
    }
}

/// Caller-facing shape of one filing's extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialsReport {
    #[serde(rename = "Income Statement")]
    pub income_statement: LineItems,
    #[serde(rename = "Balance Sheet")]
    pub balance_sheet: LineItems,
    #[serde(rename = "Cash Flow Statement")]
    pub cash_flow_statement: LineItems,
    #[serde(rename = "Historical Data")]
    pub historical_data: HistoricalData,
    #[serde(rename = "Total Tokens Used")]
    pub total_tokens_used: u64,
}

impl From<&CanonicalFinancials> for FinancialsReport {
    fn from(financials: &CanonicalFinancials) -> Self {
        Self {
            income_statement: financials.income_statement.clone(),
            balance_sheet: financials.balance_sheet.clone(),
            cash_flow_statement: financials.cash_flow_statement.clone(),
            historical_data: financials.historical_data(),
            total_tokens_used: financials.usage.total_tokens,
        }
    }
}

/// One persisted row of the `Company` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFact {
    pub company_name: String,
    pub ticker: String,
    pub year: i32,
    pub statement_type: String,
    pub metric: String,
    pub value: f64,
}

/// One persisted row of the `CompanyMetadata` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetadata {
    pub ticker: String,
    pub name: Option<String>,
    pub ir_url: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}
