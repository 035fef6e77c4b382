//! Offline fallback data shown when a live lookup fails.

pub const NO_HEADLINES: &str = "No headlines available";

const SAMPLE_NEWS: [(&str, [&str; 3]); 4] = [
    (
        "Sports",
        [
            "Lakers win championship in dramatic overtime game",
            "Olympic committee announces new sports for 2028",
            "Record-breaking run at track and field championship",
        ],
    ),
    (
        "Politics",
        [
            "New legislation passed addressing climate change",
            "International summit concludes with new trade agreements",
            "Presidential approval ratings show significant shift",
        ],
    ),
    (
        "Business",
        [
            "Tech giant announces breakthrough AI model",
            "Stock market reaches all-time high",
            "Major merger creates new industry leader",
        ],
    ),
    (
        "Science",
        [
            "Researchers discover potential cure for common disease",
            "Space telescope captures images of distant galaxy",
            "Breakthrough in renewable energy storage announced",
        ],
    ),
];

/// (ticker, price, change); percent is derived.
const SAMPLE_STOCKS: [(&str, f64, f64); 6] = [
    ("AAPL", 185.92, 1.25),
    ("MSFT", 417.56, -2.34),
    ("GOOGL", 147.78, 0.89),
    ("AMZN", 178.45, 3.21),
    ("TSLA", 175.34, -5.67),
    ("META", 475.89, 8.45),
];

/// Sample headlines for a category, or the "no headlines" placeholder.
pub fn headlines(category: &str) -> Vec<String> {
    SAMPLE_NEWS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(category))
        .map(|(_, h)| h.iter().map(|s| s.to_string()).collect())
        .unwrap_or_else(|| vec![NO_HEADLINES.to_string()])
}

/// Sample `(price, change)` for a known ticker.
pub fn quote(ticker: &str) -> Option<(f64, f64)> {
    SAMPLE_STOCKS
        .iter()
        .find(|(t, _, _)| t.eq_ignore_ascii_case(ticker))
        .map(|&(_, price, change)| (price, change))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_headlines() {
        assert_eq!(headlines("science").len(), 3);
        assert_eq!(headlines("Weather"), vec![NO_HEADLINES.to_string()]);
    }

    #[test]
    fn test_sample_quote() {
        assert_eq!(quote("msft"), Some((417.56, -2.34)));
        assert_eq!(quote("ZZZZ"), None);
    }
}
