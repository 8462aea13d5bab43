use serde::Serialize;

use crate::model::{ratio, DailySummary, RawMetricRow};

/// Warnings and favorable highlights derived from one reporting window.
/// Both lists keep insertion order; there is no ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsightSet {
    pub warnings: Vec<String>,
    pub positive_insights: Vec<String>,
}

impl InsightSet {
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.positive_insights.is_empty()
    }
}

const SPEND_SPIKE_FACTOR: f64 = 1.5;
const CLICK_DROP_FACTOR: f64 = 0.5;
const LOW_CONVERSION_RATE_PCT: f64 = 2.0;
const GOOD_CONVERSION_RATE_PCT: f64 = 3.0;
const HIGH_CPC: f64 = 2.0;
const EFFICIENT_CPC: f64 = 1.0;
const TREND_UP_FACTOR: f64 = 1.1;
const TREND_STABLE_BAND: f64 = 0.1;
const TREND_SPLIT: usize = 3;

/// Applies the threshold rules to the daily summaries and the raw row set.
///
/// Every rule is evaluated independently; all that match fire. Absence of
/// data suppresses the corresponding insight and never produces an error;
/// an empty summary sequence yields an empty [`InsightSet`].
pub fn analyze(summaries: &[DailySummary], rows: &[RawMetricRow]) -> InsightSet {
    let mut insights = InsightSet::default();
    if summaries.is_empty() {
        return insights;
    }

    let day_count = summaries.len() as f64;
    let total_spend: f64 = summaries.iter().map(|d| d.total_spend).sum();
    let total_clicks: u64 = summaries.iter().map(|d| d.total_clicks).sum();
    let total_conversions: u64 = summaries.iter().map(|d| d.total_conversions).sum();
    let mean_spend = ratio(total_spend, day_count);
    let mean_clicks = ratio(total_clicks as f64, day_count);

    for day in summaries {
        if day.total_spend > SPEND_SPIKE_FACTOR * mean_spend {
            let pct_above = ratio(day.total_spend - mean_spend, mean_spend) * 100.0;
            insights.warnings.push(format!(
                "Spend spike on {} {}: ${:.2} is {:.1}% above the daily average",
                day.day_of_week, day.date, day.total_spend, pct_above
            ));
        }
        if (day.total_clicks as f64) < CLICK_DROP_FACTOR * mean_clicks {
            let pct_below = ratio(mean_clicks - day.total_clicks as f64, mean_clicks) * 100.0;
            insights.warnings.push(format!(
                "Click drop on {} {}: {} clicks is {:.1}% below the daily average",
                day.day_of_week, day.date, day.total_clicks, pct_below
            ));
        }
    }

    let conversion_rate = ratio(total_conversions as f64 * 100.0, total_clicks as f64);
    if conversion_rate < LOW_CONVERSION_RATE_PCT {
        insights.warnings.push(format!(
            "Conversion rate {:.2}% is below the {:.1}% floor",
            conversion_rate, LOW_CONVERSION_RATE_PCT
        ));
    }

    let avg_cpc = ratio(total_spend, total_clicks as f64);
    if avg_cpc > HIGH_CPC {
        insights.warnings.push(format!(
            "Average CPC ${:.2} is above the ${:.2} ceiling",
            avg_cpc, HIGH_CPC
        ));
    }

    // Ties go to the earliest day in the window, so a strict `>` scan
    // rather than max_by (which keeps the last maximum).
    let mut best_spend = &summaries[0];
    let mut best_clicks = &summaries[0];
    for day in &summaries[1..] {
        if day.total_spend > best_spend.total_spend {
            best_spend = day;
        }
        if day.total_clicks > best_clicks.total_clicks {
            best_clicks = day;
        }
    }
    insights.positive_insights.push(format!(
        "Highest spend day: {} {} (${:.2})",
        best_spend.day_of_week, best_spend.date, best_spend.total_spend
    ));
    insights.positive_insights.push(format!(
        "Most clicks: {} {} ({} clicks)",
        best_clicks.day_of_week, best_clicks.date, best_clicks.total_clicks
    ));

    if conversion_rate >= GOOD_CONVERSION_RATE_PCT {
        insights.positive_insights.push(format!(
            "Healthy conversion rate: {:.2}% across the window",
            conversion_rate
        ));
    }
    if avg_cpc <= EFFICIENT_CPC {
        insights
            .positive_insights
            .push(format!("Efficient average CPC: ${:.2}", avg_cpc));
    }

    trend_insight(summaries, &mut insights);
    best_campaign_insight(rows, &mut insights);

    insights
}

/// Compares spend in the first three days of the window against the rest.
/// Only evaluated when both halves are populated.
fn trend_insight(summaries: &[DailySummary], insights: &mut InsightSet) {
    let split = TREND_SPLIT.min(summaries.len());
    let (first, second) = summaries.split_at(split);
    if second.is_empty() {
        return;
    }

    let first_spend: f64 = first.iter().map(|d| d.total_spend).sum();
    let second_spend: f64 = second.iter().map(|d| d.total_spend).sum();
    let diff_pct = ratio((second_spend - first_spend).abs(), first_spend);

    if second_spend > TREND_UP_FACTOR * first_spend {
        insights.positive_insights.push(format!(
            "Spend is trending up: second half of the window is {:.1}% above the first",
            ratio(second_spend - first_spend, first_spend) * 100.0
        ));
    } else if diff_pct < TREND_STABLE_BAND {
        insights
            .positive_insights
            .push("Spend is stable across the window".to_string());
    } else if second_spend < (1.0 - TREND_STABLE_BAND) * first_spend {
        insights.warnings.push(format!(
            "Spend is trending down: second half of the window is {:.1}% below the first",
            ratio(first_spend - second_spend, first_spend) * 100.0
        ));
    }
}

/// Names the campaign with the cheapest conversions. Skipped silently when
/// no raw row converted at all.
fn best_campaign_insight(rows: &[RawMetricRow], insights: &mut InsightSet) {
    let best = rows
        .iter()
        .filter(|row| row.conversions > 0)
        .map(|row| (row, ratio(row.spend, row.conversions as f64)))
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if let Some((row, cost)) = best {
        insights.positive_insights.push(format!(
            "Best cost per conversion: '{}' on {} at ${:.2}",
            row.campaign_name, row.channel, cost
        ));
    }
}
