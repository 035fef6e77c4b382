//! Stock quotes from the Yahoo Finance chart endpoint.

use crate::{gather, samples, FeedClient, FeedError};
use serde::Deserialize;

/// One ticker's price and day change.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub ticker: String,
    pub name: String,
    pub currency: String,
    /// `None` when neither live nor sample data exists.
    pub price: Option<f64>,
    pub change: f64,
    pub percent: f64,
    pub live: bool,
}

impl Quote {
    /// Build a quote from the current price and the previous close.
    ///
    /// A missing or zero previous close counts as "no change".
    pub fn from_prices(
        ticker: &str,
        name: Option<String>,
        currency: Option<String>,
        price: f64,
        previous_close: Option<f64>,
    ) -> Self {
        let prev = previous_close.filter(|p| *p != 0.0).unwrap_or(price);
        let change = price - prev;
        let percent = if prev != 0.0 { change / prev * 100.0 } else { 0.0 };
        Self {
            ticker: ticker.to_string(),
            name: name.unwrap_or_else(|| ticker.to_string()),
            currency: currency.unwrap_or_else(|| "USD".to_string()),
            price: Some(price),
            change,
            percent,
            live: true,
        }
    }

    /// Sample data for known tickers, otherwise an "N/A" placeholder.
    pub fn fallback(ticker: &str) -> Self {
        match samples::quote(ticker) {
            Some((price, change)) => Self {
                live: false,
                ..Self::from_prices(ticker, None, None, price, Some(price - change))
            },
            None => Self {
                ticker: ticker.to_string(),
                name: ticker.to_string(),
                currency: "USD".to_string(),
                price: None,
                change: 0.0,
                percent: 0.0,
                live: false,
            },
        }
    }

    pub fn price_text(&self) -> String {
        self.price
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn change_text(&self) -> String {
        format!("{:+.2}", self.change)
    }

    pub fn percent_text(&self) -> String {
        format!("{:+.2}%", self.percent)
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
}

fn parse_chart(ticker: &str, body: &str) -> Result<Quote, FeedError> {
    let parsed: ChartResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;
    let meta = parsed
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| FeedError::Malformed(format!("no chart result for {ticker}")))?;
    let price = meta
        .regular_market_price
        .ok_or_else(|| FeedError::Malformed(format!("no price for {ticker}")))?;

    Ok(Quote::from_prices(
        ticker,
        meta.short_name,
        meta.currency,
        price,
        meta.previous_close.or(meta.chart_previous_close),
    ))
}

impl FeedClient {
    /// Fetch a live quote for one ticker.
    pub async fn fetch_quote(&self, ticker: &str) -> Result<Quote, FeedError> {
        let url = format!("{}/{}", self.config.quote_url.trim_end_matches('/'), ticker);
        let response = self
            .http
            .get(url)
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        parse_chart(ticker, &response.text().await?)
    }

    /// Quotes for every ticker, in the order given, with per-ticker fallback.
    pub async fn quotes(&self, tickers: &[String]) -> Vec<Quote> {
        let client = self.clone();
        let mut results = gather(tickers, self.config.overall_timeout, move |ticker| {
            let client = client.clone();
            async move { client.fetch_quote(&ticker).await }
        })
        .await;

        tickers
            .iter()
            .map(|ticker| match results.remove(ticker) {
                Some(Ok(quote)) => quote,
                Some(Err(e)) => {
                    tracing::warn!(ticker = %ticker, error = %e, "quote fetch failed, using fallback");
                    Quote::fallback(ticker)
                }
                None => Quote::fallback(ticker),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeedConfig;
    use std::time::Duration;

    #[test]
    fn test_from_prices() {
        let q = Quote::from_prices("AAPL", None, None, 110.0, Some(100.0));
        assert!((q.change - 10.0).abs() < 1e-9);
        assert!((q.percent - 10.0).abs() < 1e-9);
        assert_eq!(q.name, "AAPL");
        assert_eq!(q.currency, "USD");
        assert_eq!(q.change_text(), "+10.00");
        assert_eq!(q.percent_text(), "+10.00%");
    }

    #[test]
    fn test_zero_previous_close_means_no_change() {
        let q = Quote::from_prices("X", None, None, 12.5, Some(0.0));
        assert_eq!(q.change, 0.0);
        assert_eq!(q.percent, 0.0);
        let q = Quote::from_prices("X", None, None, 0.0, None);
        assert_eq!(q.percent, 0.0);
    }

    #[test]
    fn test_fallback() {
        let q = Quote::fallback("TSLA");
        assert_eq!(q.price_text(), "175.34");
        assert_eq!(q.change_text(), "-5.67");
        assert!(!q.live);

        let q = Quote::fallback("ZZZZ");
        assert_eq!(q.price_text(), "N/A");
        assert_eq!(q.change_text(), "+0.00");
        assert_eq!(q.percent_text(), "+0.00%");
    }

    #[test]
    fn test_parse_chart() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"MSFT",
            "shortName":"Microsoft Corporation","regularMarketPrice":420.0,
            "chartPreviousClose":400.0}}],"error":null}}"#;
        let q = parse_chart("MSFT", body).unwrap();
        assert_eq!(q.name, "Microsoft Corporation");
        assert_eq!(q.price, Some(420.0));
        assert!((q.percent - 5.0).abs() < 1e-9);
        assert!(q.live);

        let missing = r#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#;
        assert!(matches!(parse_chart("NOPE", missing), Err(FeedError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back_in_order() {
        let config = FeedConfig {
            quote_url: "http://127.0.0.1:9/chart".into(),
            request_timeout: Duration::from_millis(500),
            overall_timeout: Duration::from_secs(2),
            ..FeedConfig::default()
        };
        let client = FeedClient::new(config).unwrap();
        let quotes = client
            .quotes(&["META".to_string(), "ZZZZ".to_string()])
            .await;
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].ticker, "META");
        assert_eq!(quotes[0].price_text(), "475.89");
        assert_eq!(quotes[1].price_text(), "N/A");
    }
}
