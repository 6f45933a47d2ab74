//! Stock quote lookup via Alpha Vantage `GLOBAL_QUOTE`

use super::{cancellable, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";

pub struct StockPriceTool {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockPriceInput {
    symbol: String,
}

impl StockPriceTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_key }
    }

    async fn fetch(&self, api_key: &str, symbol: &str) -> ToolOutput {
        let result = self
            .client
            .get(ALPHAVANTAGE_URL)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", api_key),
            ])
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => return ToolOutput::error_json(format!("Quote request failed: {e}")),
        };
        let status = response.status();
        match response.text().await {
            Ok(body) if status.is_success() => ToolOutput::success(body),
            Ok(body) => ToolOutput::error_json(format!("Quote service returned {status}: {body}")),
            Err(e) => ToolOutput::error_json(format!("Failed to read quote response: {e}")),
        }
    }
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "get_stock_price"
    }

    fn description(&self) -> String {
        "Fetch the latest stock price for a given ticker symbol (e.g. 'AAPL', 'TSLA').".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["symbol"],
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Ticker symbol"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: StockPriceInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error_json(format!("Invalid input: {e}")),
        };
        let symbol = input.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return ToolOutput::error_json("symbol must not be empty");
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return ToolOutput::error_json(
                "Stock price lookup is not configured (ALPHAVANTAGE_API_KEY is not set)",
            );
        };

        tracing::debug!(symbol = %symbol, "Fetching stock quote");
        cancellable(&ctx, self.fetch(api_key, &symbol)).await
    }
}
