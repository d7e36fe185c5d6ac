use crate::config::{ExtractionScope, PipelineConfig};
use crate::error::{FinancialsError, Result};
use crate::llm::oracle::{ExtractionOracle, OracleRequest};
use crate::llm::prompts::{build_extraction_prompt, ExtractionMode, SYSTEM_ROLE};
use crate::schema::{HistoricalData, LineItems, RawValue, StatementRecord, TokenUsage};
use crate::text_blocks::TextBlock;
use crate::utils::parse_year_key;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

// Shape the oracle is asked to return, used for structured output. Parsing accepts more.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatementPayload {
    #[serde(rename = "Statement Type")]
    #[schemars(
        description = "Exactly one of: Income Statement, Balance Sheet, Cash Flow Statement"
    )]
    pub statement_type: String,

    #[serde(rename = "Data")]
    #[schemars(description = "Line item -> value as printed, for the report's own fiscal year")]
    pub data: BTreeMap<String, RawValue>,

    #[serde(rename = "Historical Data")]
    #[schemars(description = "Line item -> four-digit year -> value, for every other year")]
    pub historical_data: BTreeMap<String, BTreeMap<String, RawValue>>,
}

/// Response schema for [`StatementPayload`] in the subset Gemini accepts: definitions inlined,
/// no `$ref`, `$schema` or `title`.
pub fn statement_payload_schema() -> Value {
    clean_schema(schemars::schema_for!(StatementPayload)).unwrap_or(Value::Null)
}

const MAX_SCHEMA_DEPTH: usize = 16;

fn clean_schema(root: schemars::schema::RootSchema) -> serde_json::Result<Value> {
    let mut schema = serde_json::to_value(root)?;
    let definitions = match schema.as_object_mut() {
        Some(object) => {
            object.remove("$schema");
            match object.remove("definitions") {
                Some(Value::Object(definitions)) => definitions,
                _ => Map::new(),
            }
        }
        None => Map::new(),
    };
    inline_definitions(&mut schema, &definitions, 0);
    Ok(schema)
}

fn inline_definitions(schema: &mut Value, definitions: &Map<String, Value>, depth: usize) {
    if depth > MAX_SCHEMA_DEPTH {
        return;
    }
    match schema {
        Value::Object(object) => {
            let target = object
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name));
            if let Some(definition) = target {
                let description = object.remove("description");
                *schema = definition.clone();
                if let (Some(description), Some(inlined)) = (description, schema.as_object_mut()) {
                    inlined.insert("description".to_string(), description);
                }
                inline_definitions(schema, definitions, depth + 1);
                return;
            }

            object.remove("title");
            for (key, child) in object.iter_mut() {
                match (key.as_str(), child) {
                    // Property names are not keywords; only their schemas are cleaned.
                    ("properties", Value::Object(properties)) => {
                        for property in properties.values_mut() {
                            inline_definitions(property, definitions, depth + 1);
                        }
                    }
                    (_, child) => inline_definitions(child, definitions, depth + 1),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_definitions(item, definitions, depth + 1);
            }
        }
        _ => {}
    }
}

/// What one oracle call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    Parsed(StatementRecord),
    /// The oracle answered but no JSON object could be read; carries the raw reply.
    ParseError(String),
    /// Network failure, timeout or error status.
    CallFailed(String),
    /// Nothing to send; the oracle was not called.
    Empty,
}

impl OracleOutcome {
    pub fn record(&self) -> Option<&StatementRecord> {
        match self {
            OracleOutcome::Parsed(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<StatementRecord> {
        match self {
            OracleOutcome::Parsed(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OracleOutcome::ParseError(_) | OracleOutcome::CallFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub outcome: OracleOutcome,
    /// Zero unless the reply parsed.
    pub usage: TokenUsage,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            outcome: OracleOutcome::Empty,
            usage: TokenUsage::default(),
        }
    }

    /// The record to assemble. Failed and empty batches contribute an empty record.
    pub fn record(&self) -> StatementRecord {
        self.outcome.record().cloned().unwrap_or_default()
    }
}

pub struct OracleAdapter<O> {
    oracle: O,
    mode: ExtractionMode,
    timeout: Duration,
    retries: usize,
    structured_output: bool,
}

impl<O: ExtractionOracle> OracleAdapter<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            mode: ExtractionMode::Focused,
            timeout: Duration::from_secs(60),
            retries: 0,
            structured_output: false,
        }
    }

    pub fn from_config(oracle: O, config: &PipelineConfig) -> Self {
        let mode = match config.extraction_scope {
            ExtractionScope::Focused => ExtractionMode::Focused,
            ExtractionScope::AllItems => ExtractionMode::AllItems,
        };
        Self::new(oracle)
            .with_mode(mode)
            .with_timeout(Duration::from_secs(config.oracle_timeout_secs))
            .with_retries(config.oracle_retries)
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Attach the payload JSON schema to every request.
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    pub fn mode(&self) -> &ExtractionMode {
        &self.mode
    }

    /// A copy of this adapter asking in a different mode, sharing the oracle.
    pub fn scoped(&self, mode: ExtractionMode) -> OracleAdapter<&O> {
        OracleAdapter {
            oracle: &self.oracle,
            mode,
            timeout: self.timeout,
            retries: self.retries,
            structured_output: self.structured_output,
        }
    }

    pub async fn extract_block(&self, block: &TextBlock, target_year: i32) -> BatchOutcome {
        debug!(
            "Sending pages {:?} ({} chars) for {}",
            block.pages.iter().map(|p| p + 1).collect::<Vec<_>>(),
            block.text.len(),
            target_year
        );
        self.extract_batch(&block.text, target_year).await
    }

    /// Asks the oracle for the statement in `text`. Never fails: call errors, timeouts and
    /// unreadable replies are reported in the outcome with zero usage.
    pub async fn extract_batch(&self, text: &str, target_year: i32) -> BatchOutcome {
        if text.trim().is_empty() {
            return BatchOutcome::empty();
        }

        let request = OracleRequest {
            system_role: SYSTEM_ROLE.to_string(),
            user_prompt: build_extraction_prompt(text, target_year, &self.mode),
            response_schema: self.structured_output.then(statement_payload_schema),
        };

        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                debug!("Retrying oracle call (attempt {})", attempt + 1);
            }

            let reply = match tokio::time::timeout(self.timeout, self.oracle.complete(&request))
                .await
            {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!("Oracle call failed: {}", last_error);
                    continue;
                }
                Err(_) => {
                    last_error = FinancialsError::OracleTimeout(self.timeout.as_secs()).to_string();
                    warn!("{}", last_error);
                    continue;
                }
            };

            return match parse_statement_record(&reply.text, target_year) {
                Ok(record) => BatchOutcome {
                    outcome: OracleOutcome::Parsed(record),
                    usage: reply.usage,
                },
                Err(e) => {
                    warn!(
                        "Discarding unreadable oracle reply ({} tokens billed): {}",
                        reply.usage.total_tokens, e
                    );
                    BatchOutcome {
                        outcome: OracleOutcome::ParseError(reply.text),
                        usage: TokenUsage::default(),
                    }
                }
            };
        }

        BatchOutcome {
            outcome: OracleOutcome::CallFailed(last_error),
            usage: TokenUsage::default(),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// The span from the first `{` to the last `}`.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn squash(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Field lookup ignoring case, spaces and underscores ("Historical Data" == "historical_data").
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        let wanted = squash(name);
        object
            .iter()
            .find(|(k, _)| squash(k) == wanted)
            .map(|(_, v)| v)
    })
}

/// Reads the oracle's reply into a [`StatementRecord`].
///
/// Accepts markdown fences and commentary around the object. `Historical Data` may be keyed
/// item -> year -> value, year -> item -> value, or item -> value (taken as the prior year).
/// Anything under `Historical Data` labelled with `target_year` is ignored.
pub fn parse_statement_record(raw: &str, target_year: i32) -> Result<StatementRecord> {
    let unfenced = strip_code_fence(raw);
    let object_text = outermost_object(unfenced).ok_or_else(|| {
        FinancialsError::MalformedResponse("no JSON object in reply".to_string())
    })?;
    let value: Value = serde_json::from_str(object_text)
        .map_err(|e| FinancialsError::MalformedResponse(e.to_string()))?;
    let object = value.as_object().ok_or_else(|| {
        FinancialsError::MalformedResponse("reply is not a JSON object".to_string())
    })?;

    let statement_type = field(object, "Statement Type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let data = field(object, "Data")
        .and_then(Value::as_object)
        .map(|items| data_items(items, target_year))
        .unwrap_or_default();

    let historical_data = field(object, "Historical Data")
        .and_then(Value::as_object)
        .map(|items| historical_items(items, target_year))
        .unwrap_or_default();

    Ok(StatementRecord {
        statement_type,
        data,
        historical_data,
    })
}

fn data_items(items: &Map<String, Value>, target_year: i32) -> LineItems {
    items
        .iter()
        .filter_map(|(item, value)| {
            let raw = match value {
                // Some replies nest the current year: {"Revenue": {"2023": "100"}}
                Value::Object(by_year) => by_year
                    .iter()
                    .find(|(y, _)| parse_year_key(y) == Some(target_year))
                    .and_then(|(_, v)| RawValue::from_json(v)),
                other => RawValue::from_json(other),
            }?;
            Some((item.trim().to_string(), raw))
        })
        .collect()
}

fn historical_items(items: &Map<String, Value>, target_year: i32) -> HistoricalData {
    let mut history = HistoricalData::new();
    let mut put = |item: &str, year: i32, value: &Value| {
        if year == target_year {
            return;
        }
        if let Some(raw) = RawValue::from_json(value) {
            history
                .entry(item.trim().to_string())
                .or_default()
                .insert(year.to_string(), raw);
        }
    };

    for (key, value) in items {
        match (parse_year_key(key), value) {
            (Some(year), Value::Object(by_item)) => {
                for (item, v) in by_item {
                    put(item, year, v);
                }
            }
            (_, Value::Object(by_year)) => {
                for (year_key, v) in by_year {
                    if let Some(year) = parse_year_key(year_key) {
                        put(key, year, v);
                    }
                }
            }
            (_, scalar) => put(key, target_year - 1, scalar),
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::oracle::OracleReply;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedOracle {
        replies: Mutex<Vec<Result<OracleReply>>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<Result<OracleReply>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<OracleReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().remove(0)
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl ExtractionOracle for SlowOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<OracleReply> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(reply("{}", 1))
        }
    }

    fn reply(text: &str, tokens: u64) -> OracleReply {
        OracleReply {
            text: text.to_string(),
            usage: TokenUsage::new(tokens, 0),
        }
    }

    #[test]
    fn test_parses_fenced_payload() {
        let raw = "```json\n{\"Statement Type\": \"Income Statement\", \"Data\": {\"Revenue\": \"100\"}, \"Historical Data\": {\"Revenue\": {\"2023\": \"90\"}}}\n```";
        let record = parse_statement_record(raw, 2024).unwrap();
        assert_eq!(record.statement_type, "Income Statement");
        assert_eq!(record.data["Revenue"], RawValue::from("100"));
        assert_eq!(record.historical_data["Revenue"]["2023"], RawValue::from("90"));
    }

    #[test]
    fn test_locates_object_inside_commentary() {
        let raw = "Here is the data you asked for:\n{\"Statement Type\": \"Balance Sheet\", \"Data\": {\"Total assets\": 5000}}\nLet me know!";
        let record = parse_statement_record(raw, 2024).unwrap();
        assert_eq!(record.statement_type, "Balance Sheet");
        assert_eq!(record.data["Total assets"], RawValue::Number(5000.0));
        assert!(record.historical_data.is_empty());
    }

    #[test]
    fn test_transposed_and_yearless_history() {
        let raw = r#"{
            "Statement Type": "Income Statement",
            "Data": {"Revenue": {"2024": "100", "2023": "90"}},
            "Historical Data": {
                "2022": {"Revenue": "80"},
                "Cost of sales": "40",
                "Revenue": {"FY2021": "70", "2024": "999", "note": "x"}
            }
        }"#;
        let record = parse_statement_record(raw, 2024).unwrap();

        assert_eq!(record.data["Revenue"], RawValue::from("100"));
        let revenue = &record.historical_data["Revenue"];
        assert_eq!(revenue["2022"], RawValue::from("80"));
        assert_eq!(revenue["2021"], RawValue::from("70"));
        assert!(!revenue.contains_key("2024"));
        assert_eq!(
            record.historical_data["Cost of sales"]["2023"],
            RawValue::from("40")
        );
    }

    #[test]
    fn test_non_scalar_values_are_dropped() {
        let raw = r#"{"Statement Type": "Income Statement", "Data": {"Revenue": null, "Notes": [1, 2], "EBIT": "5"}}"#;
        let record = parse_statement_record(raw, 2024).unwrap();
        assert_eq!(record.data.len(), 1);
        assert!(record.data.contains_key("EBIT"));
    }

    #[test]
    fn test_unreadable_replies_are_errors() {
        assert!(parse_statement_record("I could not find any statements.", 2024).is_err());
        assert!(parse_statement_record("{\"Statement Type\": ", 2024).is_err());
        assert!(matches!(
            parse_statement_record("} backwards {", 2024),
            Err(FinancialsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_schema_names_the_payload_keys() {
        let schema = statement_payload_schema();
        assert!(schema["properties"].get("Statement Type").is_some());
        assert!(schema["properties"].get("Historical Data").is_some());

        let text = schema.to_string();
        for keyword in ["$ref", "$schema", "definitions", "\"title\"", "more lenient"] {
            assert!(!text.contains(keyword), "{keyword} in {text}");
        }
        // RawValue is inlined where it is used.
        assert!(schema["properties"]["Data"]["additionalProperties"]
            .get("anyOf")
            .is_some());
    }

    #[test]
    fn test_schema_cleaning_keeps_property_named_title() {
        let schema = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "Root",
            "type": "object",
            "properties": {
                "title": {"$ref": "#/definitions/Name", "description": "heading"}
            },
            "definitions": {"Name": {"title": "Name", "type": "string"}}
        });
        let root: schemars::schema::RootSchema = serde_json::from_value(schema).unwrap();
        let cleaned = clean_schema(root).unwrap();

        assert_eq!(
            cleaned,
            serde_json::json!({
                "type": "object",
                "properties": {"title": {"type": "string", "description": "heading"}}
            })
        );
    }

    #[tokio::test]
    async fn test_empty_text_never_calls_the_oracle() {
        let oracle = ScriptedOracle::new(vec![]);
        let adapter = OracleAdapter::new(&oracle);

        let outcome = adapter.extract_batch("   \n", 2024).await;

        assert_eq!(oracle.calls(), 0);
        assert_eq!(outcome.outcome, OracleOutcome::Empty);
        assert!(outcome.usage.is_zero());
        assert!(outcome.record().is_empty());
    }

    #[tokio::test]
    async fn test_parsed_reply_reports_usage() {
        let oracle = ScriptedOracle::new(vec![Ok(reply(
            r#"{"Statement Type": "Cash Flow Statement", "Data": {"Capex": "(12)"}}"#,
            55,
        ))]);
        let adapter = OracleAdapter::new(&oracle);

        let outcome = adapter.extract_batch("Capex (12)", 2024).await;
        assert_eq!(outcome.usage.total_tokens, 55);
        assert_eq!(outcome.record().statement_type, "Cash Flow Statement");
    }

    #[tokio::test]
    async fn test_garbage_reply_is_a_parse_error_with_zero_usage() {
        let oracle = ScriptedOracle::new(vec![Ok(reply("no json here", 40))]);
        let adapter = OracleAdapter::new(&oracle);

        let outcome = adapter.extract_batch("Revenue 1", 2024).await;
        assert_eq!(
            outcome.outcome,
            OracleOutcome::ParseError("no json here".to_string())
        );
        assert!(outcome.usage.is_zero());
    }

    #[tokio::test]
    async fn test_call_failure_is_retried_then_reported() {
        let oracle = ScriptedOracle::new(vec![
            Err(FinancialsError::OracleFailed("503".to_string())),
            Err(FinancialsError::OracleFailed("503 again".to_string())),
        ]);
        let adapter = OracleAdapter::new(&oracle).with_retries(1);

        let outcome = adapter.extract_batch("Revenue 1", 2024).await;
        assert_eq!(oracle.calls(), 2);
        assert!(matches!(outcome.outcome, OracleOutcome::CallFailed(ref e) if e.contains("503 again")));
        assert!(outcome.usage.is_zero());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failure() {
        let oracle = ScriptedOracle::new(vec![
            Err(FinancialsError::OracleFailed("reset".to_string())),
            Ok(reply(r#"{"Statement Type": "Balance Sheet", "Data": {}}"#, 7)),
        ]);
        let adapter = OracleAdapter::new(&oracle).with_retries(2);

        let outcome = adapter.extract_batch("Assets 1", 2024).await;
        assert_eq!(oracle.calls(), 2);
        assert!(outcome.outcome.record().is_some());
        assert_eq!(outcome.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_timeout_is_a_call_failure() {
        let adapter = OracleAdapter::new(SlowOracle).with_timeout(Duration::from_millis(20));

        let outcome = adapter.extract_batch("Revenue 1", 2024).await;
        assert!(matches!(outcome.outcome, OracleOutcome::CallFailed(ref e) if e.contains("timed out")));
        assert!(outcome.usage.is_zero());
    }
}
