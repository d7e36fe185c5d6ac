//! Locates financial-statement pages with three progressively stricter filters.
//!
//! Each pass only sees the survivors of the previous one, so the cheap lexical test runs on
//! every page and the structural analysis runs on a handful.

use crate::document::{Document, Page};
use log::{debug, info};
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

/// Phrases naming a financial statement (pass 1).
pub const STATEMENT_KEYWORDS: &[&str] = &[
    "income statement",
    "statement of operations",
    "statement of income",
    "statement of earnings",
    "statement of comprehensive income",
    "profit and loss",
    "profit or loss",
    "balance sheet",
    "statement of financial position",
    "financial condition",
    "cash flow",
    "statement of cash flows",
    "financial statements",
];

/// Narrower phrases that appear on the statements themselves (passes 2 and 3).
pub const SIGNAL_PHRASES: &[&str] = &[
    "for the year ended",
    "for the years ended",
    "consolidated statement",
    "statement of cash flows",
    "statement of financial position",
    "balance sheet",
    "income statement",
    "euros in millions",
    "amounts in",
    "(in millions)",
    "(in thousands)",
    "operating activities",
    "investing activities",
    "financing activities",
    "cash flows",
    "financial statements",
    "fiscal year",
    "depreciation and amortization",
    "accounts payable",
    "cash and cash equivalents",
];

/// Row-label vocabulary of statement tables (passes 2 and 3).
pub const SECTION_HEADERS: &[&str] = &[
    "assets",
    "liabilities",
    "equity",
    "revenue",
    "sales",
    "expenses",
    "cost",
    "cash",
    "operating",
    "investing",
    "financing",
    "depreciation",
    "interest",
    "income",
    "tax",
    "amortization",
    "property",
    "equipment",
    "compensation",
    "dividend",
    "receivable",
    "payable",
    "proceeds",
    "purchase",
    "share",
    "lease",
    "inventory",
];

static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\(?\d[\d,]*(?:\.\d+)?\)?").unwrap());
static YEAR_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static WIDE_COLUMN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,.\s]{3,}").unwrap());

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// True when the text holds a figure: a digit run, a currency symbol or the word "million".
pub fn has_numbers(text: &str) -> bool {
    NUMERIC_TOKEN.is_match(text)
        || text.contains(CURRENCY_SYMBOLS)
        || text.to_lowercase().contains("million")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Page indices surviving each pass, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub pass1: Vec<usize>,
    pub pass2: Vec<usize>,
    pub pass3: Vec<usize>,
}

impl Classification {
    pub fn candidates(&self) -> &[usize] {
        &self.pass3
    }

    pub fn into_candidates(self) -> Vec<usize> {
        self.pass3
    }
}

#[derive(Debug, Clone)]
pub struct PageClassifier {
    year_range: RangeInclusive<i32>,
    min_numeric_lines_table: usize,
    min_numeric_lines_structure: usize,
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::new(2014..=2024)
    }
}

impl PageClassifier {
    pub fn new(year_range: RangeInclusive<i32>) -> Self {
        Self {
            year_range,
            min_numeric_lines_table: 4,
            min_numeric_lines_structure: 3,
        }
    }

    pub fn classify(&self, document: &Document) -> Classification {
        let pages = &document.pages;

        let pass1: Vec<usize> = pages
            .iter()
            .filter(|p| self.lexical_gate(&p.text))
            .map(|p| p.index)
            .collect();

        let pass2: Vec<usize> = pass1
            .iter()
            .copied()
            .filter(|&i| self.table_signal_gate(page_text(pages, i)))
            .collect();

        let pass3: Vec<usize> = pass2
            .iter()
            .copied()
            .filter(|&i| self.structural_gate(page_text(pages, i)))
            .collect();

        info!(
            "Classified {}: {} pages, pass 1 {}, pass 2 {}, pass 3 {}",
            document.path.display(),
            pages.len(),
            pass1.len(),
            pass2.len(),
            pass3.len()
        );
        debug!("Candidate pages (1-based): {:?}", one_based(&pass3));

        Classification {
            pass1,
            pass2,
            pass3,
        }
    }

    /// Pass 1: a statement keyword and at least one figure.
    pub fn lexical_gate(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        contains_any(&lower, STATEMENT_KEYWORDS) && has_numbers(text)
    }

    /// Pass 2: enough numeric lines, a signal phrase and a section header.
    pub fn table_signal_gate(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let numeric_lines = lower.lines().filter(|l| has_numbers(l)).count();

        numeric_lines >= self.min_numeric_lines_table
            && contains_any(&lower, SIGNAL_PHRASES)
            && contains_any(&lower, SECTION_HEADERS)
    }

    /// Pass 3: numeric rows and a signal phrase, plus one sign of tabular structure:
    /// repeated year columns, several header rows, or several wide numeric columns.
    pub fn structural_gate(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let lines: Vec<&str> = lower.lines().collect();

        let numeric_rows = lines.iter().filter(|l| has_numbers(l)).count();
        let signal_phrase = lines.iter().any(|l| contains_any(l, SIGNAL_PHRASES));
        if numeric_rows < self.min_numeric_lines_structure || !signal_phrase {
            return false;
        }

        let year_rows = lines
            .iter()
            .filter(|l| self.year_tokens(l) >= 2)
            .count();
        let header_rows = lines
            .iter()
            .filter(|l| contains_any(l, SECTION_HEADERS))
            .count();
        let column_rows = lines
            .iter()
            .filter(|l| WIDE_COLUMN.find_iter(l).count() >= 2)
            .count();

        year_rows >= 2 || header_rows >= 3 || column_rows >= 2
    }

    fn year_tokens(&self, line: &str) -> usize {
        YEAR_TOKEN
            .captures_iter(line)
            .filter_map(|c| c[1].parse::<i32>().ok())
            .filter(|y| self.year_range.contains(y))
            .count()
    }
}

fn page_text(pages: &[Page], index: usize) -> &str {
    pages.get(index).map(|p| p.text.as_str()).unwrap_or("")
}

fn one_based(indices: &[usize]) -> Vec<usize> {
    indices.iter().map(|i| i + 1).collect()
}
