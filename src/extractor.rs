use crate::config::Config;
use crate::error::Error;
use crate::model::{make_row, RawMetricRow};
use chrono::NaiveDate;
use reqwest::{header::AUTHORIZATION, Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Supplies the bearer token used against the ads platform. Injected so the
/// pipeline never touches token storage directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AccessTokenProvider: Send + Sync + 'static {
    async fn access_token(&self) -> Result<String, Error>;

    /// Asks the provider for a fresh token after an auth rejection.
    async fn refresh(&self) -> Result<(), Error>;
}

/// Token provider backed by a fixed configured token. `refresh` is a no-op;
/// an expired static token surfaces as an API failure on the retry.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(config: &Config) -> Self {
        StaticTokenProvider {
            token: config.api_token.clone(),
        }
    }
}

#[async_trait::async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, Error> {
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AdsExtractor: Send + Sync + 'static {
    /// Fetches per-campaign daily metrics for one channel over the given
    /// date range (inclusive). Auth, rate-limit and network failures all
    /// surface as [`Error::ExternalApi`].
    async fn fetch(
        &self,
        channel: &str,
        start: &NaiveDate,
        end: &NaiveDate,
    ) -> Result<Vec<RawMetricRow>, Error>;
}

#[derive(Deserialize)]
struct InsightEntry {
    campaign_name: String,
    date: String,
    impressions: u64,
    clicks: u64,
    cost_micros: u64,
    conversions: u64,
}

#[derive(Deserialize)]
struct InsightsResponse {
    data: Vec<InsightEntry>,
}

/// Extractor backed by the ads platform's HTTP insights endpoint.
#[derive(Clone)]
pub struct HttpExtractor {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl HttpExtractor {
    pub fn new(config: &Config, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        HttpExtractor {
            client: Client::new(),
            base_url: config.api_url.to_string(),
            tokens,
        }
    }

    fn insights_url(
        &self,
        channel: &str,
        start: &NaiveDate,
        end: &NaiveDate,
    ) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .extend(&["v1", "insights", channel]);
        url.query_pairs_mut()
            .append_pair("start", &start.format("%Y-%m-%d").to_string())
            .append_pair("end", &end.format("%Y-%m-%d").to_string());
        Ok(url)
    }
}

/// Converts one wire entry into a [`RawMetricRow`]. Spend arrives in micros
/// of the account currency; derived metrics are recomputed rather than read
/// off the wire.
fn entry_to_row(channel: &str, entry: &InsightEntry) -> Result<RawMetricRow, Error> {
    let date =
        NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").map_err(|_| Error::InvalidDate {
            date: entry.date.clone(),
        })?;
    let spend = entry.cost_micros as f64 / MICROS_PER_UNIT;

    Ok(make_row(
        channel,
        &entry.campaign_name,
        date,
        entry.impressions,
        entry.clicks,
        spend,
        entry.conversions,
    ))
}

#[async_trait::async_trait]
impl AdsExtractor for HttpExtractor {
    async fn fetch(
        &self,
        channel: &str,
        start: &NaiveDate,
        end: &NaiveDate,
    ) -> Result<Vec<RawMetricRow>, Error> {
        if start > end {
            return Err(Error::StartDateAfterEndDate {
                start_date: start.to_string(),
                end_date: end.to_string(),
            });
        }

        let url = self.insights_url(channel, start, end)?;

        let mut resp = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.tokens.access_token().await?))
            .send()
            .await?;

        // One refresh-and-retry on an auth rejection; anything else is the
        // caller's problem.
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.tokens.refresh().await?;
            resp = self
                .client
                .get(url)
                .header(
                    AUTHORIZATION,
                    format!("Bearer {}", self.tokens.access_token().await?),
                )
                .send()
                .await?;
        }

        let resp = resp.error_for_status()?;
        let insights = resp.json::<InsightsResponse>().await?;

        insights
            .data
            .iter()
            .map(|entry| entry_to_row(channel, entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_config(api_url: &str) -> Config {
        let mut config = Config::for_tests();
        config.api_url = api_url.to_string();
        config
    }

    #[tokio::test]
    async fn test_fetch_invalid_base_url() {
        let config = test_config("invalid_url");
        let tokens = Arc::new(StaticTokenProvider::new(&config));
        let extractor = HttpExtractor::new(&config, tokens);

        let start = NaiveDate::from_str("2025-09-12").unwrap();
        let end = NaiveDate::from_str("2025-09-18").unwrap();
        let result = extractor.fetch("google ads", &start, &end).await;
        assert!(matches!(result.unwrap_err(), Error::UrlParsingFailed(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_reversed_range() {
        let config = test_config("https://api.example.com");
        let tokens = Arc::new(StaticTokenProvider::new(&config));
        let extractor = HttpExtractor::new(&config, tokens);

        let start = NaiveDate::from_str("2025-09-18").unwrap();
        let end = NaiveDate::from_str("2025-09-12").unwrap();
        let result = extractor.fetch("google ads", &start, &end).await;
        assert!(matches!(result.unwrap_err(), Error::StartDateAfterEndDate { .. }));
    }

    #[test]
    fn test_insights_url_shape() {
        let config = test_config("https://api.example.com");
        let tokens = Arc::new(StaticTokenProvider::new(&config));
        let extractor = HttpExtractor::new(&config, tokens);

        let start = NaiveDate::from_str("2025-09-12").unwrap();
        let end = NaiveDate::from_str("2025-09-18").unwrap();
        let url = extractor.insights_url("google ads", &start, &end).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/insights/google%20ads?start=2025-09-12&end=2025-09-18"
        );
    }

    #[test]
    fn test_entry_to_row_converts_micros_and_recomputes() {
        let entry = InsightEntry {
            campaign_name: "brand".to_string(),
            date: "2025-09-15".to_string(),
            impressions: 1000,
            clicks: 50,
            cost_micros: 100_000_000, // $100
            conversions: 4,
        };

        let row = entry_to_row("google ads", &entry).unwrap();
        assert_eq!(row.spend, 100.0);
        assert_eq!(row.cpc, 2.0);
        assert_eq!(row.cost_per_conversion, 25.0);
        assert_eq!(row.day_of_week, chrono::Weekday::Mon);
    }

    #[test]
    fn test_entry_to_row_invalid_date() {
        let entry = InsightEntry {
            campaign_name: "brand".to_string(),
            date: "2025-13-01".to_string(),
            impressions: 0,
            clicks: 0,
            cost_micros: 0,
            conversions: 0,
        };
        let result = entry_to_row("google ads", &entry);
        assert!(matches!(result.unwrap_err(), Error::InvalidDate { date } if date == "2025-13-01"));
    }

    #[tokio::test]
    async fn test_static_token_provider_roundtrip() {
        let config = test_config("https://api.example.com");
        let provider = StaticTokenProvider::new(&config);
        assert_eq!(provider.access_token().await.unwrap(), "test_token");
        provider.refresh().await.unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "test_token");
    }
}
