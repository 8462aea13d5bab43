use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;

use crate::chart::ChartRenderer;
use crate::extractor::AdsExtractor;
use crate::insights;
use crate::mailer::Mailer;
use crate::model::{aggregate_daily, RawMetricRow, ReportWindow};
use crate::narrative::NarrativeModel;
use crate::report;
use crate::warehouse::WarehouseLoader;

/// Per-stage result. A stage error is recorded, not propagated: downstream
/// stages still run with whatever data is in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Error { message: String },
    Skipped,
}

impl StageStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, StageStatus::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatuses {
    pub extract: StageStatus,
    pub load: StageStatus,
    pub analyze: StageStatus,
    pub narrative: StageStatus,
    pub assemble: StageStatus,
    pub deliver: StageStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// The JSON status document for one report run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub rows_extracted: usize,
    pub stages: StageStatuses,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// One report run over a fixed window: extract, load, analyze, assemble,
/// deliver, strictly in that order. Every collaborator is injected; a run
/// owns all of its data and nothing outlives it.
pub struct Pipeline {
    extractor: Arc<dyn AdsExtractor>,
    loader: Arc<dyn WarehouseLoader>,
    chart: Arc<dyn ChartRenderer>,
    narrative: Option<Arc<dyn NarrativeModel>>,
    mailer: Arc<dyn Mailer>,
    channels: Vec<String>,
    recipient: String,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn AdsExtractor>,
        loader: Arc<dyn WarehouseLoader>,
        chart: Arc<dyn ChartRenderer>,
        narrative: Option<Arc<dyn NarrativeModel>>,
        mailer: Arc<dyn Mailer>,
        channels: Vec<String>,
        recipient: String,
    ) -> Self {
        Pipeline {
            extractor,
            loader,
            chart,
            narrative,
            mailer,
            channels,
            recipient,
        }
    }

    pub async fn run(&self, window: ReportWindow) -> RunOutcome {
        let (rows, extract) = self.extract_stage(&window).await;
        let load = self.load_stage(&rows, &extract).await;

        // Analysis works over the in-memory rows, never a warehouse
        // re-read, so a load failure does not change its input.
        let summaries = aggregate_daily(&rows);
        let insight_set = insights::analyze(&summaries, &rows);
        if insight_set.is_empty() {
            info!("no insight rules fired for window {}", window.label());
        }
        let analyze = StageStatus::Success;

        let (narrative_text, narrative) = self.narrative_stage(&summaries, &insight_set).await;

        let chart_ref = self.chart.render(&summaries);
        let html = report::assemble(
            &summaries,
            &insight_set,
            &chart_ref,
            &window.label(),
            narrative_text.as_deref(),
        );
        let assemble = if html.is_empty() {
            StageStatus::Error {
                message: "report assembly produced no document".to_string(),
            }
        } else {
            StageStatus::Success
        };

        let deliver = if html.is_empty() {
            StageStatus::Skipped
        } else {
            self.deliver_stage(&window, &html).await
        };

        let stages = StageStatuses {
            extract,
            load,
            analyze,
            narrative,
            assemble,
            deliver,
        };
        // The narrative is decorative; its failure never fails the run.
        let failed = stages.extract.is_error()
            || stages.load.is_error()
            || stages.analyze.is_error()
            || stages.assemble.is_error()
            || stages.deliver.is_error();

        RunOutcome {
            status: if failed {
                RunStatus::Error
            } else {
                RunStatus::Success
            },
            window_start: window.start,
            window_end: window.end,
            rows_extracted: rows.len(),
            stages,
        }
    }

    async fn extract_stage(&self, window: &ReportWindow) -> (Vec<RawMetricRow>, StageStatus) {
        let mut rows = Vec::new();
        let mut failures = Vec::new();

        for channel in &self.channels {
            match self
                .extractor
                .fetch(channel, &window.start, &window.end)
                .await
            {
                Ok(channel_rows) => {
                    info!("extracted {} rows for channel {}", channel_rows.len(), channel);
                    rows.extend(channel_rows);
                }
                Err(err) => {
                    error!("extraction failed for channel {}: {}", channel, err);
                    failures.push(format!("{channel}: {err}"));
                }
            }
        }

        let status = if failures.is_empty() {
            StageStatus::Success
        } else {
            StageStatus::Error {
                message: failures.join("; "),
            }
        };
        (rows, status)
    }

    async fn load_stage(&self, rows: &[RawMetricRow], extract: &StageStatus) -> StageStatus {
        if rows.is_empty() {
            return if extract.is_error() {
                StageStatus::Skipped
            } else {
                StageStatus::Success
            };
        }

        let mut by_channel: BTreeMap<&str, Vec<RawMetricRow>> = BTreeMap::new();
        for row in rows {
            by_channel
                .entry(row.channel.as_str())
                .or_default()
                .push(row.clone());
        }

        let mut failures = Vec::new();
        for (channel, channel_rows) in by_channel {
            match self.loader.upsert(&channel_rows, channel).await {
                Ok(receipt) => {
                    info!(
                        "warehouse table '{}' now holds {} rows",
                        channel, receipt.rows_written
                    );
                }
                Err(err) => {
                    error!("warehouse load failed for '{}': {}", channel, err);
                    failures.push(format!("{channel}: {err}"));
                }
            }
        }

        if failures.is_empty() {
            StageStatus::Success
        } else {
            StageStatus::Error {
                message: failures.join("; "),
            }
        }
    }

    async fn narrative_stage(
        &self,
        summaries: &[crate::model::DailySummary],
        insight_set: &insights::InsightSet,
    ) -> (Option<String>, StageStatus) {
        let Some(model) = &self.narrative else {
            return (None, StageStatus::Skipped);
        };
        match model.summarize(summaries, insight_set).await {
            Ok(text) => (Some(text), StageStatus::Success),
            Err(err) => {
                warn!("narrative model failed, report ships without it: {}", err);
                (
                    None,
                    StageStatus::Error {
                        message: err.to_string(),
                    },
                )
            }
        }
    }

    async fn deliver_stage(&self, window: &ReportWindow, html: &str) -> StageStatus {
        let subject = format!("Weekly Ads Performance Report ({})", window.label());
        let text = report::html_to_text(html);

        match self.mailer.send(&self.recipient, &subject, html, &text).await {
            Ok(receipt) => {
                info!("report delivered: {}", receipt.server_response);
                StageStatus::Success
            }
            Err(err) => {
                error!("report delivery failed: {}", err);
                StageStatus::Error {
                    message: err.to_string(),
                }
            }
        }
    }
}
