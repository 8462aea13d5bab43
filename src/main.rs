mod chart;
mod config;
mod error;
mod extractor;
mod insights;
mod mailer;
mod model;
mod narrative;
mod pipeline;
mod report;
mod server;
mod warehouse;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::error;

use chart::SvgChartRenderer;
use config::Config;
use error::Error;
use extractor::{HttpExtractor, StaticTokenProvider};
use mailer::SmtpMailer;
use model::ReportWindow;
use narrative::{GenerativeApiClient, NarrativeModel};
use pipeline::Pipeline;
use warehouse::ParquetWarehouse;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one weekly report and print the run outcome as JSON.
    Run {
        #[arg(long, help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date)]
        report_date: Option<NaiveDate>,
    },
    /// Serve the HTTP report trigger.
    Serve,
}

fn validate_date(s: &str) -> Result<NaiveDate, String> {
    let error_message = "Invalid date, expected YYYY-MM-DD";

    let parts = s
        .split("-")
        .map(|part| part.parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| error_message)?;

    match parts.as_slice() {
        &[year, month, day] if month <= 12 && day <= 31 => {
            Ok(
                NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .ok_or(error_message)?,
            )
        }
        _ => Err(error_message.to_string()),
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline, Error> {
    let tokens = Arc::new(StaticTokenProvider::new(config));
    let extractor = Arc::new(HttpExtractor::new(config, tokens));
    let loader = Arc::new(ParquetWarehouse::new(config));
    let chart = Arc::new(SvgChartRenderer::default());
    let narrative = GenerativeApiClient::from_config(config)
        .map(|client| Arc::new(client) as Arc<dyn NarrativeModel>);
    let mailer = Arc::new(SmtpMailer::new(config)?);

    Ok(Pipeline::new(
        extractor,
        loader,
        chart,
        narrative,
        mailer,
        config.channels.clone(),
        config.recipient.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::init();

    let pipeline = build_pipeline(&args.config)?;

    match args.command {
        Command::Run { report_date } => {
            let end = report_date.unwrap_or_else(server::yesterday_utc);
            let outcome = pipeline.run(ReportWindow::ending_on(end)).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.succeeded() {
                error!("report run finished with stage errors");
                std::process::exit(1);
            }
        }
        Command::Serve => {
            if let Err(err) = server::serve(&args.config.bind_addr, Arc::new(pipeline)).await {
                error!("report server failed: {}", err);
                std::process::exit(1);
            }
        }
    };

    Ok(())
}
