use std::fmt::Write as _;

use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::Error;
use crate::insights::InsightSet;
use crate::model::{ratio, DailySummary};

/// Optional hosted-model narrative for the report. The pipeline constructs
/// no model when the API key is absent; a narrative failure never fails a
/// run.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NarrativeModel: Send + Sync + 'static {
    async fn summarize(
        &self,
        summaries: &[DailySummary],
        insights: &InsightSet,
    ) -> Result<String, Error>;
}

/// Client for a `generateContent`-style hosted model endpoint.
#[derive(Clone)]
pub struct GenerativeApiClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl GenerativeApiClient {
    /// Returns `None` when no API key is configured, which disables the
    /// narrative stage without affecting the rest of the pipeline.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.llm_api_key.clone()?;
        Some(GenerativeApiClient {
            client: Client::new(),
            api_url: config.llm_api_url.clone(),
            api_key,
        })
    }
}

/// Builds the compact prompt sent to the model: window KPIs plus the rule
/// output, with a hard instruction to stay short.
fn build_prompt(summaries: &[DailySummary], insights: &InsightSet) -> String {
    let total_clicks: u64 = summaries.iter().map(|d| d.total_clicks).sum();
    let total_spend: f64 = summaries.iter().map(|d| d.total_spend).sum();
    let total_conversions: u64 = summaries.iter().map(|d| d.total_conversions).sum();

    let mut prompt = String::from(
        "You are a marketing analyst. In at most three sentences, summarize this \
         week's ads performance for a non-technical manager.\n",
    );
    let _ = writeln!(
        prompt,
        "Days: {}. Spend: ${:.2}. Clicks: {}. Conversions: {}. Avg CPC: ${:.2}.",
        summaries.len(),
        total_spend,
        total_clicks,
        total_conversions,
        ratio(total_spend, total_clicks as f64),
    );
    for warning in &insights.warnings {
        let _ = writeln!(prompt, "Warning: {warning}");
    }
    for positive in &insights.positive_insights {
        let _ = writeln!(prompt, "Highlight: {positive}");
    }
    prompt
}

/// Pulls the generated text out of a `generateContent` response body.
fn extract_text(body: &Value) -> Result<String, Error> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| Error::Narrative {
            message: "response carried no candidate text".to_string(),
        })
}

#[async_trait::async_trait]
impl NarrativeModel for GenerativeApiClient {
    async fn summarize(
        &self,
        summaries: &[DailySummary],
        insights: &InsightSet,
    ) -> Result<String, Error> {
        let prompt = build_prompt(summaries, insights);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload = resp.json::<Value>().await?;
        extract_text(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{aggregate_daily, make_row};
    use chrono::NaiveDate;

    #[test]
    fn test_from_config_requires_key() {
        let mut config = Config::for_tests();
        config.llm_api_key = None;
        assert!(GenerativeApiClient::from_config(&config).is_none());

        config.llm_api_key = Some("k".to_string());
        assert!(GenerativeApiClient::from_config(&config).is_some());
    }

    #[test]
    fn test_prompt_carries_kpis_and_insights() {
        let rows = vec![make_row(
            "google ads",
            "brand",
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            1000,
            100,
            50.0,
            5,
        )];
        let summaries = aggregate_daily(&rows);
        let insights = InsightSet {
            warnings: vec!["w1".to_string()],
            positive_insights: vec!["p1".to_string()],
        };

        let prompt = build_prompt(&summaries, &insights);
        assert!(prompt.contains("Spend: $50.00"));
        assert!(prompt.contains("Warning: w1"));
        assert!(prompt.contains("Highlight: p1"));
    }

    #[test]
    fn test_extract_text_happy_path() {
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "  A solid week. " }] } }]
        });
        assert_eq!(extract_text(&body).unwrap(), "A solid week.");
    }

    #[test]
    fn test_extract_text_rejects_empty_response() {
        let body = serde_json::json!({ "candidates": [] });
        assert!(matches!(
            extract_text(&body).unwrap_err(),
            Error::Narrative { .. }
        ));
    }
}
