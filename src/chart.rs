use std::fmt::Write;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;

use crate::model::DailySummary;

/// Renders the daily summary series into an opaque image reference suitable
/// for embedding in the report. Implementations must never fail loudly: an
/// empty string signals "no chart".
pub trait ChartRenderer: Send + Sync + 'static {
    fn render(&self, summaries: &[DailySummary]) -> String;
}

/// Inline SVG renderer: spend as bars, clicks as a polyline, encoded into a
/// `data:` URI so the report stays self-contained in transit.
pub struct SvgChartRenderer {
    width: u32,
    height: u32,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        SvgChartRenderer {
            width: 640,
            height: 260,
        }
    }
}

const MARGIN: f64 = 30.0;

impl SvgChartRenderer {
    fn render_svg(&self, summaries: &[DailySummary]) -> Result<String, std::fmt::Error> {
        let w = self.width as f64;
        let h = self.height as f64;
        let plot_w = w - 2.0 * MARGIN;
        let plot_h = h - 2.0 * MARGIN;

        let max_spend = summaries
            .iter()
            .map(|d| d.total_spend)
            .fold(0.0_f64, f64::max)
            .max(1.0);
        let max_clicks = summaries
            .iter()
            .map(|d| d.total_clicks)
            .max()
            .unwrap_or(0)
            .max(1) as f64;

        let n = summaries.len() as f64;
        let slot = plot_w / n;
        let bar_w = (slot * 0.6).max(1.0);

        let mut svg = String::new();
        write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
            self.width, self.height, self.width, self.height
        )?;
        write!(
            svg,
            r##"<rect width="{}" height="{}" fill="#ffffff"/>"##,
            self.width, self.height
        )?;

        // Spend bars.
        for (i, day) in summaries.iter().enumerate() {
            let bar_h = day.total_spend / max_spend * plot_h;
            let x = MARGIN + i as f64 * slot + (slot - bar_w) / 2.0;
            let y = h - MARGIN - bar_h;
            write!(
                svg,
                r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="#4a7fc1"/>"##,
                x, y, bar_w, bar_h
            )?;
            write!(
                svg,
                r##"<text x="{:.1}" y="{:.1}" font-size="10" text-anchor="middle" fill="#555">{}</text>"##,
                MARGIN + i as f64 * slot + slot / 2.0,
                h - MARGIN + 14.0,
                day.day_of_week
            )?;
        }

        // Clicks polyline.
        let points: Vec<String> = summaries
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let x = MARGIN + i as f64 * slot + slot / 2.0;
                let y = h - MARGIN - (day.total_clicks as f64 / max_clicks * plot_h);
                format!("{x:.1},{y:.1}")
            })
            .collect();
        write!(
            svg,
            r##"<polyline points="{}" fill="none" stroke="#d97642" stroke-width="2"/>"##,
            points.join(" ")
        )?;

        write!(
            svg,
            r##"<text x="{:.1}" y="18" font-size="11" fill="#4a7fc1">spend</text><text x="{:.1}" y="18" font-size="11" fill="#d97642">clicks</text>"##,
            MARGIN,
            MARGIN + 50.0
        )?;
        svg.push_str("</svg>");
        Ok(svg)
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, summaries: &[DailySummary]) -> String {
        if summaries.is_empty() {
            return String::new();
        }
        match self.render_svg(summaries) {
            Ok(svg) => format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)),
            Err(err) => {
                warn!("chart rendering failed, report will omit the chart: {}", err);
                String::new()
            }
        }
    }
}
