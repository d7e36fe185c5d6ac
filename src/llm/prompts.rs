// Prompts for per-batch statement extraction

use crate::reconcile::ReferenceKeys;

pub const SYSTEM_ROLE: &str = "You are a financial data extractor.";

pub const OUTPUT_FORMAT: &str = r#"
## OUTPUT FORMAT
Return exactly ONE JSON object and nothing else:
{
  "Statement Type": "Income Statement" | "Balance Sheet" | "Cash Flow Statement",
  "Data": { "Line Item": "Value", ... },
  "Historical Data": { "Line Item": { "YYYY": "Value", ... }, ... }
}
- "Statement Type" MUST be one of the three labels above, spelled exactly.
- Copy values exactly as printed (keep commas, parentheses and unit words).
- Do not add commentary, markdown or a second object.
"#;

const FOCUSED_SCOPE: &str = r#"
## WHAT TO EXTRACT
Extract **only the exact line items** (no renaming) related to:
- Revenue / Net Sales
- Cost of Revenues / Cost of Sales
- Operating Expenses (R&D, SG&A, Amortization, etc.)
"#;

const ALL_ITEMS_SCOPE: &str = r#"
## WHAT TO EXTRACT
Extract **every line item** of the statement that carries a numeric value, using the exact
label printed in the report (no renaming). Include subtotals and totals.
"#;

fn year_rules(target_year: i32) -> String {
    format!(
        "\n## FISCAL YEAR RULES\n\
        This is the official annual report for fiscal year {year}.\n\
        1. Put values labelled for {year} under \"Data\".\n\
        2. Put values for every other year under \"Historical Data\", keyed by line item and then by the four-digit year.\n\
        3. Never place a {year} value under \"Historical Data\" and never place another year under \"Data\".\n\
        4. Do not guess, calculate or include unlabelled figures. Only include numeric values.\n",
        year = target_year
    )
}

fn known_keys_scope(keys: &ReferenceKeys) -> String {
    let mut scope = String::from(
        "\n## WHAT TO EXTRACT\n\
        Only extract values for the exact line items below. If a value is not present, skip it.\n\
        Use the label from this list as the key, even if the report words it slightly differently.\n",
    );
    for (statement_type, labels) in keys.iter() {
        scope.push_str(&format!("\n{}:\n", statement_type));
        for label in labels {
            scope.push_str(&format!("- {}\n", label));
        }
    }
    scope
}

/// Which line items a batch asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    Focused,
    AllItems,
    KnownKeys(ReferenceKeys),
}

pub fn build_extraction_prompt(text: &str, target_year: i32, mode: &ExtractionMode) -> String {
    let scope = match mode {
        ExtractionMode::Focused => FOCUSED_SCOPE.to_string(),
        ExtractionMode::AllItems => ALL_ITEMS_SCOPE.to_string(),
        ExtractionMode::KnownKeys(keys) => known_keys_scope(keys),
    };

    format!(
        "This is extracted text from a company's annual report. It contains part of the \
        Income Statement, Balance Sheet, or Cash Flow Statement. Table cells may be separated by \" | \".\n\
        First decide which ONE of the three statements the text represents.\n\
        {scope}\
        {rules}\
        {format}\n\
        --- BEGIN FINANCIAL TEXT ---\n\
        {text}\n\
        --- END FINANCIAL TEXT ---\n",
        scope = scope,
        rules = year_rules(target_year),
        format = OUTPUT_FORMAT,
        text = text
    )
}
