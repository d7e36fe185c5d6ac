//! Aligns the line-item labels of one filing onto those of a reference filing, so the same
//! metric keeps the same name across years ("Net sales" in 2019, "Net Sales" in 2023).

use crate::schema::{CanonicalFinancials, HistoricalData, LineItems, StatementType};
use log::debug;
use std::collections::BTreeMap;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

fn squash(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Finds the label in `available` that names the same metric as `reference`.
pub fn match_metric<'a, I>(reference: &str, available: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    match_metric_with(reference, available, DEFAULT_MATCH_THRESHOLD)
}

/// Exact match ignoring case and spacing first, otherwise the most similar label scoring at
/// least `threshold` (normalized Levenshtein). Ties keep the earliest candidate.
pub fn match_metric_with<'a, I>(reference: &str, available: I, threshold: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = squash(reference);
    let mut best: Option<(&'a str, f64)> = None;

    for candidate in available {
        let squashed = squash(candidate);
        if squashed == wanted {
            return Some(candidate);
        }
        let score = strsim::normalized_levenshtein(&wanted, &squashed);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// The line-item labels of a reference filing, per statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceKeys {
    keys: BTreeMap<StatementType, Vec<String>>,
}

impl ReferenceKeys {
    /// Labels of every statement, current year and historical.
    pub fn from_financials(financials: &CanonicalFinancials) -> Self {
        let mut keys = Self::default();
        for statement_type in StatementType::ALL {
            for label in financials.statement(statement_type).keys() {
                keys.insert(statement_type, label.as_str());
            }
            if let Some(history) = financials.historical.get(&statement_type) {
                for label in history.keys() {
                    keys.insert(statement_type, label.as_str());
                }
            }
        }
        keys
    }

    pub fn insert(&mut self, statement_type: StatementType, label: impl Into<String>) {
        let label = label.into();
        let labels = self.keys.entry(statement_type).or_default();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    pub fn labels(&self, statement_type: StatementType) -> &[String] {
        self.keys
            .get(&statement_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatementType, &Vec<String>)> {
        self.keys.iter().filter(|(_, labels)| !labels.is_empty())
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    threshold: f64,
    strict: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            strict: false,
        }
    }
}

impl Reconciler {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            strict: false,
        }
    }

    /// Drop line items that match no reference label.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn reconcile(
        &self,
        financials: &CanonicalFinancials,
        reference: &ReferenceKeys,
    ) -> CanonicalFinancials {
        let mut aligned = CanonicalFinancials {
            income_statement: LineItems::new(),
            balance_sheet: LineItems::new(),
            cash_flow_statement: LineItems::new(),
            historical: BTreeMap::new(),
            ..financials.clone()
        };

        for statement_type in StatementType::ALL {
            let labels = reference.labels(statement_type);

            let renames = self.renames(financials.statement(statement_type).keys(), labels);
            *aligned.statement_mut(statement_type) =
                self.rename_items(financials.statement(statement_type), &renames);

            if let Some(history) = financials.historical.get(&statement_type) {
                let renames = self.renames(history.keys(), labels);
                let renamed: HistoricalData = self.rename_items(history, &renames);
                if !renamed.is_empty() {
                    aligned.historical.insert(statement_type, renamed);
                }
            }
        }

        aligned
    }

    /// Found label -> reference label. Each found label is claimed by at most one reference.
    fn renames<'a>(
        &self,
        found: impl Iterator<Item = &'a String>,
        reference: &[String],
    ) -> BTreeMap<String, String> {
        let mut unclaimed: Vec<&str> = found.map(String::as_str).collect();
        let mut renames = BTreeMap::new();

        for label in reference {
            if let Some(matched) =
                match_metric_with(label, unclaimed.iter().copied(), self.threshold)
            {
                if matched != label {
                    debug!("Reconciled '{}' -> '{}'", matched, label);
                }
                renames.insert(matched.to_string(), label.clone());
                unclaimed.retain(|c| *c != matched);
            }
        }

        renames
    }

    fn rename_items<V: Clone>(
        &self,
        items: &BTreeMap<String, V>,
        renames: &BTreeMap<String, String>,
    ) -> BTreeMap<String, V> {
        items
            .iter()
            .filter_map(|(label, value)| match renames.get(label) {
                Some(reference) => Some((reference.clone(), value.clone())),
                None if self.strict => None,
                None => Some((label.clone(), value.clone())),
            })
            .collect()
    }
}

/// Renames with the default threshold, keeping unmatched items.
pub fn reconcile(financials: &CanonicalFinancials, reference: &ReferenceKeys) -> CanonicalFinancials {
    Reconciler::default().reconcile(financials, reference)
}
