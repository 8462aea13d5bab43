use std::fmt::Write as _;

use log::error;

use crate::error::Error;
use crate::insights::InsightSet;
use crate::model::{ratio, DailySummary};

/// Combines aggregates, insights and the chart into one self-contained HTML
/// document. All styling is inline so the report survives mail clients that
/// strip remote resources.
///
/// On any internal error this returns an empty string; callers must treat
/// that as "report generation failed", never as an empty report.
pub fn assemble(
    summaries: &[DailySummary],
    insights: &InsightSet,
    chart_ref: &str,
    range_label: &str,
    narrative: Option<&str>,
) -> String {
    match assemble_inner(summaries, insights, chart_ref, range_label, narrative) {
        Ok(html) => html,
        Err(err) => {
            error!("report assembly failed: {}", err);
            String::new()
        }
    }
}

fn assemble_inner(
    summaries: &[DailySummary],
    insights: &InsightSet,
    chart_ref: &str,
    range_label: &str,
    narrative: Option<&str>,
) -> Result<String, Error> {
    let template = include_str!("templates/report.html");

    let total_impressions: u64 = summaries.iter().map(|d| d.total_impressions).sum();
    let total_clicks: u64 = summaries.iter().map(|d| d.total_clicks).sum();
    let total_spend: f64 = summaries.iter().map(|d| d.total_spend).sum();
    let total_conversions: u64 = summaries.iter().map(|d| d.total_conversions).sum();
    let avg_cpc = ratio(total_spend, total_clicks as f64);

    let values = [
        ("range_label", escape(range_label)),
        ("total_impressions", total_impressions.to_string()),
        ("total_clicks", total_clicks.to_string()),
        ("total_spend", format!("{total_spend:.2}")),
        ("total_conversions", total_conversions.to_string()),
        ("avg_cpc", format!("{avg_cpc:.2}")),
        ("narrative_block", narrative_block(narrative)?),
        (
            "warnings_block",
            insight_block("warnings", "Warnings", &insights.warnings)?,
        ),
        (
            "positive_block",
            insight_block("positives", "Highlights", &insights.positive_insights)?,
        ),
        ("chart_block", chart_block(chart_ref)?),
        ("table_rows", table_rows(summaries)?),
    ];

    substitute(template, &values)
}

/// Fills `{{name}}` markers in one pass over the template. Marker syntax in
/// substituted values stays literal, so insight or narrative text can never
/// inject or corrupt other blocks. Unknown or unterminated markers mean the
/// template and this module disagree; ship nothing rather than a broken
/// document.
fn substitute(template: &str, values: &[(&str, String)]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(Error::Assembly {
                message: "unterminated placeholder in template".to_string(),
            });
        };
        let name = &after[..close];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                return Err(Error::Assembly {
                    message: format!("unknown template placeholder '{name}'"),
                })
            }
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

fn narrative_block(narrative: Option<&str>) -> Result<String, Error> {
    let Some(text) = narrative else {
        return Ok(String::new());
    };
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(format!(
        "  <div class=\"block narrative\"><h2>Summary</h2><p>{}</p></div>\n",
        escape(text)
    ))
}

fn insight_block(css_class: &str, title: &str, items: &[String]) -> Result<String, Error> {
    if items.is_empty() {
        return Ok(String::new());
    }
    let mut block = format!("  <div class=\"block {css_class}\"><h2>{title}</h2><ul>\n");
    for item in items {
        writeln!(block, "    <li>{}</li>", escape(item)).map_err(|e| Error::Assembly {
            message: e.to_string(),
        })?;
    }
    block.push_str("  </ul></div>\n");
    Ok(block)
}

fn chart_block(chart_ref: &str) -> Result<String, Error> {
    if chart_ref.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(
        "  <div class=\"chart\"><img src=\"{chart_ref}\" alt=\"Daily spend and clicks\"></div>\n"
    ))
}

fn table_rows(summaries: &[DailySummary]) -> Result<String, Error> {
    let mut rows = String::new();
    for day in summaries {
        writeln!(
            rows,
            "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>${:.2}</td><td>{}</td><td>${:.2}</td></tr>",
            day.date,
            day.day_of_week,
            day.total_impressions,
            day.total_clicks,
            day.total_spend,
            day.total_conversions,
            day.avg_cpc,
        )
        .map_err(|e| Error::Assembly {
            message: e.to_string(),
        })?;
    }
    Ok(rows)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Derives the plain-text mail fallback from the HTML body: tags stripped,
/// the entities the template emits decoded, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    let mut in_style = false;

    for c in html.chars() {
        if in_tag {
            if c == '>' {
                in_tag = false;
                let closing = tag.starts_with('/');
                let name = tag.trim_start_matches('/').to_ascii_lowercase();
                if name.starts_with("style") {
                    in_style = !closing;
                }
                tag.clear();
            } else {
                tag.push(c);
            }
        } else if c == '<' {
            in_tag = true;
            text.push(' ');
        } else if !in_style {
            text.push(c);
        }
    }

    let decoded = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
