//! Converts reported values ("(1,234)", "$1.2 million", "n/a") into plain figures.
//!
//! Scale resolution, in order:
//! 1. an explicit unit word on the value itself ("1.2 million", "3bn", "450k");
//! 2. the unit the document declares for its tables ("in millions");
//! 3. when neither is present, a magnitude heuristic: anything at or below 99,999 is taken to
//!    be stated in thousands. This is a guess and is known to be wrong for small genuine
//!    figures and for reports stated in millions; [`ScaleSource::MagnitudeHeuristic`] marks it.

use crate::schema::{LineItems, RawValue, ReportingUnit};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Largest magnitude the heuristic treats as "stated in thousands".
pub const HEURISTIC_CEILING: f64 = 99_999.0;
const HEURISTIC_MULTIPLIER: f64 = 1_000.0;

/// Dollar prefixes naming their country ("US$", "A$", "HK$").
static DOLLAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:us|au|a|ca|c|nz|hk|s|r)\s*\$").unwrap());
static CURRENCY_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[$€£¥]").unwrap());
static CURRENCY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:usd|eur|gbp|jpy|chf|cad|aud|sek|nok|dkk|us\b)").unwrap()
});
/// A figure wrapped in parentheses, optionally followed by its unit word.
static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\s*([^()]*?)\s*\)\s*([a-z]*)$").unwrap());
static FIGURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([+-])?\s*(\d+(?:\.\d+)?|\.\d+)(?:\s*(billions?|bn|millions?|mn|m|thousands?|k))?$",
    )
    .unwrap()
});

/// Where the multiplier applied to a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleSource {
    /// Taken as stated.
    AsStated,
    ExplicitWord,
    Declared,
    /// Lossy: scaled ×1,000 because the figure was small and nothing said otherwise.
    MagnitudeHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub value: f64,
    pub scale: ScaleSource,
}

fn word_multiplier(word: &str) -> f64 {
    match word {
        "billion" | "billions" | "bn" => 1_000_000_000.0,
        "million" | "millions" | "mn" | "m" => 1_000_000.0,
        _ => 1_000.0,
    }
}

/// Sign, magnitude and explicit unit multiplier of a textual figure.
fn parse_figure(text: &str) -> Option<(f64, Option<f64>)> {
    let lowered = text.to_lowercase().replace('−', "-");
    if lowered.contains('%') {
        return None;
    }

    let s = DOLLAR_PREFIX.replace_all(&lowered, "");
    let s = CURRENCY_SYMBOL.replace_all(&s, "");
    let s = CURRENCY_CODE.replace_all(&s, "");
    let mut s = s.replace(',', "").trim().to_string();

    let mut negative = false;
    if let Some(caps) = PARENTHESIZED.captures(&s) {
        negative = true;
        s = format!("{} {}", &caps[1], &caps[2]).trim().to_string();
    }

    let caps = FIGURE.captures(&s)?;
    if caps.get(1).map(|m| m.as_str()) == Some("-") {
        negative = !negative;
    }
    let magnitude: f64 = caps[2].parse().ok()?;
    let multiplier = caps.get(3).map(|m| word_multiplier(m.as_str()));

    let signed = if negative { -magnitude } else { magnitude };
    Some((signed, multiplier))
}

pub fn normalize_with_source(
    raw: &RawValue,
    declared: Option<ReportingUnit>,
) -> Option<Normalized> {
    let (figure, explicit) = match raw {
        RawValue::Number(n) if n.is_finite() => (*n, None),
        RawValue::Number(_) => return None,
        RawValue::Text(text) => parse_figure(text)?,
    };

    let (value, scale) = match (explicit, declared) {
        (Some(multiplier), _) => (figure * multiplier, ScaleSource::ExplicitWord),
        (None, Some(unit)) => (figure * unit.multiplier(), ScaleSource::Declared),
        (None, None) => (figure, ScaleSource::AsStated),
    };

    if declared.is_none() && value.abs() <= HEURISTIC_CEILING {
        return Some(Normalized {
            value: value * HEURISTIC_MULTIPLIER,
            scale: ScaleSource::MagnitudeHeuristic,
        });
    }

    Some(Normalized { value, scale })
}

/// The figure in base currency units, or `None` when the value is not numeric.
pub fn normalize_value(raw: &RawValue, declared: Option<ReportingUnit>) -> Option<f64> {
    normalize_with_source(raw, declared).map(|n| n.value)
}

/// Normalizes every item, returning the figures and the labels that were dropped.
pub fn normalize_items(
    items: &LineItems,
    declared: Option<ReportingUnit>,
) -> (BTreeMap<String, f64>, Vec<String>) {
    let mut values = BTreeMap::new();
    let mut dropped = Vec::new();
    for (label, raw) in items {
        match normalize_value(raw, declared) {
            Some(value) => {
                values.insert(label.clone(), value);
            }
            None => dropped.push(label.clone()),
        }
    }
    (values, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::from(s)
    }

    #[test]
    fn test_large_raw_figures_are_kept() {
        assert_eq!(normalize_value(&text("1234567"), None), Some(1234567.0));
        assert_eq!(normalize_value(&text("$1,234,567"), None), Some(1234567.0));
        assert_eq!(
            normalize_value(&RawValue::Number(2_500_000.0), None),
            Some(2_500_000.0)
        );
    }

    #[test]
    fn test_unit_words_multiply() {
        assert_eq!(normalize_value(&text("1.2 million"), None), Some(1_200_000.0));
        assert_eq!(normalize_value(&text("€3bn"), None), Some(3_000_000_000.0));
        assert_eq!(
            normalize_value(&text("USD 450 thousand"), None),
            Some(450_000.0)
        );
        assert_eq!(
            normalize_with_source(&text("2 billion"), Some(ReportingUnit::Thousands))
                .map(|n| n.scale),
            Some(ScaleSource::ExplicitWord)
        );
    }

    #[test]
    fn test_magnitude_heuristic_is_lossy() {
        let small = normalize_with_source(&text("42"), None).unwrap();
        assert_eq!(small.value, 42_000.0);
        assert_eq!(small.scale, ScaleSource::MagnitudeHeuristic);

        // A genuine count of 42 cannot be told apart from 42 thousand.
        assert_ne!(normalize_value(&text("42"), None), Some(42.0));

        // "5 thousand" is still small after its own multiplier and gets scaled again.
        assert_eq!(normalize_value(&text("5 thousand"), None), Some(5_000_000.0));
    }

    #[test]
    fn test_declared_unit_replaces_heuristic() {
        assert_eq!(
            normalize_value(&text("42"), Some(ReportingUnit::Millions)),
            Some(42_000_000.0)
        );
        assert_eq!(
            normalize_value(&text("7,005"), Some(ReportingUnit::Units)),
            Some(7005.0)
        );
        assert_eq!(
            normalize_with_source(&text("12.5"), Some(ReportingUnit::Thousands)),
            Some(Normalized {
                value: 12_500.0,
                scale: ScaleSource::Declared
            })
        );
    }

    #[test]
    fn test_parentheses_and_minus_are_negative() {
        assert_eq!(
            normalize_value(&text("(1,234)"), Some(ReportingUnit::Units)),
            Some(-1234.0)
        );
        assert_eq!(
            normalize_value(&text("-250,000"), None),
            Some(-250_000.0)
        );
        assert_eq!(normalize_value(&text("($12)"), None), Some(-12_000.0));
        assert_eq!(normalize_value(&text("- 250,000"), None), Some(-250_000.0));
        assert_eq!(normalize_value(&text("−1,500,000"), None), Some(-1_500_000.0));
    }

    #[test]
    fn test_currency_is_stripped_before_sign_detection() {
        assert_eq!(normalize_value(&text("US$1,234,567"), None), Some(1_234_567.0));
        assert_eq!(normalize_value(&text("A$ 2,000,000"), None), Some(2_000_000.0));
        assert_eq!(normalize_value(&text("USD1,234,567"), None), Some(1_234_567.0));
        assert_eq!(normalize_value(&text("$(1,234,567)"), None), Some(-1_234_567.0));
        assert_eq!(normalize_value(&text("€ (2,500,000)"), None), Some(-2_500_000.0));
        assert_eq!(
            normalize_value(&text("US$ (3.5) million"), None),
            Some(-3_500_000.0)
        );
        assert_eq!(
            normalize_value(&text("(HK$ 120)"), Some(ReportingUnit::Thousands)),
            Some(-120_000.0)
        );
    }

    #[test]
    fn test_non_numeric_values_are_dropped() {
        for value in ["n/a", "-", "—", "", "see note 4", "12%", "1.2.3"] {
            assert_eq!(normalize_value(&text(value), None), None, "{value}");
        }
        assert_eq!(normalize_value(&RawValue::Number(f64::NAN), None), None);
    }

    #[test]
    fn test_normalize_items_reports_dropped_labels() {
        let mut items = LineItems::new();
        items.insert("Revenue".to_string(), text("1,000,000"));
        items.insert("Footnote".to_string(), text("n/a"));

        let (values, dropped) = normalize_items(&items, None);
        assert_eq!(values["Revenue"], 1_000_000.0);
        assert_eq!(dropped, vec!["Footnote".to_string()]);
    }
}
