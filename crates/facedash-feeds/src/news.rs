//! Top headlines per category from NewsAPI.

use crate::{gather, samples, FeedClient, FeedError};
use serde::Deserialize;

const HEADLINES_PER_CATEGORY: usize = 3;

/// Headlines for one category, and whether they are live or sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct Headlines {
    pub category: String,
    pub titles: Vec<String>,
    pub live: bool,
}

#[derive(Deserialize)]
struct TopHeadlines {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Deserialize)]
struct Article {
    title: Option<String>,
}

/// NewsAPI category parameter for a profile category.
///
/// NewsAPI has no politics category; general news is the closest.
pub fn api_category(category: &str) -> String {
    match category.to_ascii_lowercase().as_str() {
        "politics" => "general".to_string(),
        other => other.to_string(),
    }
}

fn parse_titles(body: &str) -> Result<Vec<String>, FeedError> {
    let parsed: TopHeadlines =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;
    Ok(parsed
        .articles
        .into_iter()
        .filter_map(|a| a.title)
        .filter(|t| !t.trim().is_empty())
        .take(HEADLINES_PER_CATEGORY)
        .collect())
}

impl FeedClient {
    /// Fetch live headlines for one category.
    pub async fn fetch_headlines(&self, category: &str) -> Result<Vec<String>, FeedError> {
        let key = self
            .config
            .news_api_key
            .as_deref()
            .ok_or(FeedError::MissingApiKey)?;

        let response = self
            .http
            .get(&self.config.news_url)
            .query(&[
                ("country", "us"),
                ("category", api_category(category).as_str()),
                ("apiKey", key),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        parse_titles(&response.text().await?)
    }

    /// Headlines for every category, in the order given.
    ///
    /// Categories are fetched concurrently; any category that fails or
    /// misses the overall deadline gets sample headlines instead.
    pub async fn headlines(&self, categories: &[String]) -> Vec<Headlines> {
        let mut results = if self.config.news_api_key.is_some() {
            let client = self.clone();
            gather(categories, self.config.overall_timeout, move |category| {
                let client = client.clone();
                async move { client.fetch_headlines(&category).await }
            })
            .await
        } else {
            tracing::debug!("no news API key, using sample headlines");
            Default::default()
        };

        categories
            .iter()
            .map(|category| match results.remove(category) {
                Some(Ok(titles)) => Headlines {
                    category: category.clone(),
                    titles,
                    live: true,
                },
                outcome => {
                    if let Some(Err(e)) = outcome {
                        tracing::warn!(category = %category, error = %e, "news fetch failed, using samples");
                    }
                    Headlines {
                        category: category.clone(),
                        titles: samples::headlines(category),
                        live: false,
                    }
                }
            })
            .collect()
    }
}
