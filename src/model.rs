use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One row of campaign metrics for a single calendar date, as extracted
/// from an ads platform.
///
/// `cpc` and `cost_per_conversion` are derived values and are always
/// recomputed from spend and the matching denominator; figures arriving
/// over the wire are never treated as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRow {
    pub channel: String,
    pub campaign_name: String,
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub cpc: f64,
    pub conversions: u64,
    pub cost_per_conversion: f64,
}

impl RawMetricRow {
    /// Recomputes the derived metrics from spend, clicks and conversions.
    pub fn recompute_derived(&mut self) {
        self.cpc = ratio(self.spend, self.clicks as f64);
        self.cost_per_conversion = ratio(self.spend, self.conversions as f64);
    }
}

/// Metrics for one calendar date summed across every campaign reported
/// that day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_spend: f64,
    pub total_conversions: u64,
    pub avg_cpc: f64,
}

/// Division that yields 0 instead of dividing by zero. Used for every
/// derived metric in the pipeline.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Groups raw rows by date and sums their metrics, one [`DailySummary`]
/// per distinct date, ordered ascending by date.
///
/// Rows from different campaigns or channels on the same date are merged
/// into a single summary. An empty input produces an empty output.
pub fn aggregate_daily(rows: &[RawMetricRow]) -> Vec<DailySummary> {
    let mut by_date: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();

    for row in rows {
        let entry = by_date.entry(row.date).or_insert_with(|| DailySummary {
            date: row.date,
            day_of_week: row.day_of_week,
            total_impressions: 0,
            total_clicks: 0,
            total_spend: 0.0,
            total_conversions: 0,
            avg_cpc: 0.0,
        });
        entry.total_impressions += row.impressions;
        entry.total_clicks += row.clicks;
        entry.total_spend += row.spend;
        entry.total_conversions += row.conversions;
    }

    by_date
        .into_values()
        .map(|mut summary| {
            summary.avg_cpc = ratio(summary.total_spend, summary.total_clicks as f64);
            summary
        })
        .collect()
}

/// The contiguous date range covered by one report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWindow {
    pub const DAYS: i64 = 7;

    /// The 7-day window ending on `end` (inclusive).
    pub fn ending_on(end: NaiveDate) -> Self {
        ReportWindow {
            start: end - Duration::days(Self::DAYS - 1),
            end,
        }
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }
}

/// Builds a row with derived metrics already recomputed and the weekday
/// filled in from the date.
pub fn make_row(
    channel: &str,
    campaign_name: &str,
    date: NaiveDate,
    impressions: u64,
    clicks: u64,
    spend: f64,
    conversions: u64,
) -> RawMetricRow {
    let mut row = RawMetricRow {
        channel: channel.to_string(),
        campaign_name: campaign_name.to_string(),
        date,
        day_of_week: date.weekday(),
        impressions,
        clicks,
        spend,
        cpc: 0.0,
        conversions,
        cost_per_conversion: 0.0,
    };
    row.recompute_derived();
    row
}
