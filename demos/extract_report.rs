use annual_report_financials::*;
use dotenv::dotenv;
use std::error::Error;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    dotenv().ok();
    println!("🚀 Starting annual report extraction with Gemini...");

    // 1. Which report to read
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: extract_report <TICKER_YEAR.pdf>")?;
    let config = PipelineConfig::from_env()?;

    // 2. Load the PDF and locate the statement pages
    let filing = Filing::from_path(&path, "Demo Company")?;
    let client = GeminiClient::from_env()?;
    let adapter = OracleAdapter::from_config(client.clone(), &config).with_structured_output(true);

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let pipeline = Pipeline::new(client, config)
        .with_adapter(adapter)
        .with_progress(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExtractionEvent::Classified { pages, candidates } => {
                    println!("📄 {} pages, {} look like financial statements", pages, candidates)
                }
                ExtractionEvent::BatchSent { pages } => println!("🤖 Sending pages {:?}...", pages),
                ExtractionEvent::BatchParsed {
                    statement_type,
                    items,
                    ..
                } => println!("📥 {}: {} line items", statement_type, items),
                ExtractionEvent::BatchFailed { pages, reason } => {
                    eprintln!("⚠️  Pages {:?} failed: {}", pages, reason)
                }
                _ => {}
            }
        }
    });

    let document = pipeline.open(&filing).await?;
    println!("🔍 Fiscal year {} for {}", document.year, filing.ticker);

    // 3. Extract and assemble
    let financials = pipeline.run(&document).await;
    drop(pipeline);
    printer.await?;

    // 4. Show the caller-facing JSON and normalized figures
    let report = FinancialsReport::from(&financials);
    println!("📝 Extracted report:\n{}\n", serde_json::to_string_pretty(&report)?);

    for statement_type in StatementType::ALL {
        for (item, raw) in financials.statement(statement_type) {
            match normalize_with_source(raw, financials.unit) {
                Some(n) => println!("  {} / {}: {} ({:?})", statement_type, item, n.value, n.scale),
                None => println!("  {} / {}: '{}' is not numeric", statement_type, item, raw),
            }
        }
    }

    std::fs::write("extracted_report.json", serde_json::to_string_pretty(&report)?)?;
    println!("✅ Saved extracted_report.json ({} tokens used)", report.total_tokens_used);

    Ok(())
}
