use annual_report_financials::*;
use dotenv::dotenv;
use std::collections::BTreeMap;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    println!("🚀 Building a multi-year history with OpenAI...");

    // 1. A directory of TICKER_YEAR.pdf files
    let dir = std::env::args()
        .nth(1)
        .ok_or_else(|| {
            anyhow::anyhow!("usage: openai_history <directory of TICKER_YEAR.pdf files> [company name]")
        })?;
    let company = std::env::args().nth(2).unwrap_or_else(|| "Demo Company".to_string());

    let config = PipelineConfig::from_env()?;
    let expected_years = config.year_range();
    let client = OpenAiClient::from_env()?.with_model(config.model.clone());

    // 2. Ingest each ticker's filings, most recent first
    let store = MetricStore::connect(&config.database_path).await?;
    let mut by_ticker: BTreeMap<String, Vec<Filing>> = BTreeMap::new();
    for filing in filings_in_dir(Path::new(&dir), &company)? {
        by_ticker.entry(filing.ticker.clone()).or_default().push(filing);
    }
    println!("📂 Found filings for {} tickers", by_ticker.len());

    let pipeline = Pipeline::new(client, config);
    for (ticker, filings) in by_ticker {
        for result in pipeline.ingest_all(&store, filings).await {
            match result {
                Ok(done) => println!(
                    "📥 {} {}: {} rows written, {} historical already known, {} tokens",
                    ticker,
                    done.financials.year,
                    done.summary.rows_written(),
                    done.summary.historical_skipped,
                    done.financials.usage.total_tokens
                ),
                Err(e) => eprintln!("❌ {}: {}", ticker, e),
            }
        }

        // 3. Report what the store now holds
        match store.population(&ticker, expected_years.clone()).await? {
            Population::FullyPopulated => println!("✅ {} covers every expected year", ticker),
            Population::PartiallyPopulated { missing } => {
                println!("⚠️  {} is missing {:?}", ticker, missing)
            }
            Population::NoData => println!("❌ {} has no data", ticker),
        }

        let view = store.read(&ticker).await?;
        let filename = format!("{}_history.json", ticker);
        std::fs::write(&filename, serde_json::to_string_pretty(&view)?)?;
        println!("📝 Saved {}", filename);
    }

    store.close().await;
    Ok(())
}
