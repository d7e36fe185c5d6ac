//! Turns candidate pages into the text sent to the extraction oracle.

use crate::document::{Document, Page};
use crate::schema::ReportingUnit;
use log::{debug, warn};
use regex::Regex;
use std::sync::LazyLock;

pub const CELL_DELIMITER: &str = " | ";

static CELL_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t+|\s{2,}").unwrap());
static UNIT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|of)\s+(?:[a-z$€£¥.]+\s+)?(thousand|million|billion)s?\b").unwrap()
});
static UNIT_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*(?:[$€£¥]|usd|eur|gbp)\s*(thousand|million|billion)s?\s*\)").unwrap()
});
static UNIT_THOUSANDS_SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[$€£¥]\s*)?'000s?\b").unwrap());

/// Text for one batch of pages.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub pages: Vec<usize>,
    pub text: String,
    /// Scale declared on these pages ("in millions"), if any.
    pub unit: Option<ReportingUnit>,
}

impl TextBlock {
    /// An empty block means there is nothing worth sending to the oracle.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

type PageStrategy = fn(&Page) -> Option<String>;

/// Tried in order per page; the first one yielding text wins.
const PAGE_STRATEGIES: &[(&str, PageStrategy)] = &[
    ("layout table rows", layout_table_rows),
    ("layout numeric lines", layout_numeric_lines),
    ("plain numeric lines", plain_numeric_lines),
];

#[derive(Debug, Clone, Default)]
pub struct TextBlockExtractor;

impl TextBlockExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Concatenates the content of `page_indices` in the order given. Pages that yield
    /// nothing (or do not exist) are skipped.
    pub fn extract_text(&self, document: &Document, page_indices: &[usize]) -> TextBlock {
        let mut sections = Vec::new();
        let mut unit = None;

        for &index in page_indices {
            let page = match document.page(index) {
                Ok(page) => page,
                Err(e) => {
                    warn!("Skipping page: {}", e);
                    continue;
                }
            };

            if unit.is_none() {
                unit = detect_reporting_unit(&page.text)
                    .or_else(|| page.layout.as_deref().and_then(detect_reporting_unit));
            }

            let extracted = PAGE_STRATEGIES
                .iter()
                .find_map(|(name, strategy)| strategy(page).map(|text| (*name, text)));

            match extracted {
                Some((name, text)) => {
                    debug!("Page {} extracted via {}", index + 1, name);
                    sections.push(text);
                }
                None => debug!("Page {} yielded no numeric content", index + 1),
            }
        }

        TextBlock {
            pages: page_indices.to_vec(),
            text: sections.join("\n"),
            unit,
        }
    }

    /// Splits the candidates into consecutive groups of `batch_size` and extracts each.
    pub fn extract_batches(
        &self,
        document: &Document,
        candidates: &[usize],
        batch_size: usize,
    ) -> Vec<TextBlock> {
        candidates
            .chunks(batch_size.max(1))
            .map(|batch| self.extract_text(document, batch))
            .collect()
    }
}

/// Rows of whitespace-aligned tables: at least two cells, at least one holding a digit.
pub fn table_rows(text: &str) -> Option<String> {
    let rows: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let cells: Vec<&str> = CELL_GAP
                .split(line.trim())
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            let has_digit = cells.iter().any(|c| c.chars().any(|ch| ch.is_ascii_digit()));
            (cells.len() >= 2 && has_digit).then(|| cells.join(CELL_DELIMITER))
        })
        .collect();

    (!rows.is_empty()).then(|| rows.join("\n"))
}

/// Trimmed lines that contain a digit.
pub fn numeric_lines(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.chars().any(|c| c.is_ascii_digit()))
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn layout_table_rows(page: &Page) -> Option<String> {
    page.layout.as_deref().and_then(table_rows)
}

fn layout_numeric_lines(page: &Page) -> Option<String> {
    page.layout.as_deref().and_then(numeric_lines)
}

fn plain_numeric_lines(page: &Page) -> Option<String> {
    numeric_lines(&page.text)
}

/// Reads a declared reporting scale such as "(in millions)", "euros in thousands",
/// "(€ million)" or "$'000".
pub fn detect_reporting_unit(text: &str) -> Option<ReportingUnit> {
    let word = UNIT_PHRASE
        .captures(text)
        .or_else(|| UNIT_PAREN.captures(text))
        .map(|caps| caps[1].to_lowercase());

    match word.as_deref() {
        Some("thousand") => Some(ReportingUnit::Thousands),
        Some("million") => Some(ReportingUnit::Millions),
        Some("billion") => Some(ReportingUnit::Billions),
        _ if UNIT_THOUSANDS_SHORTHAND.is_match(text) => Some(ReportingUnit::Thousands),
        _ => None,
    }
}
