use datafusion::{arrow::error::ArrowError, error::DataFusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("DataFusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("'The date supplied {date} is invalid'")]
    InvalidDate { date: String },

    #[error("The start date: '{start_date}' is greater than the end date: '{end_date}'")]
    StartDateAfterEndDate {
        start_date: String,
        end_date: String,
    },

    #[error("Ads API responded with error: {0}")]
    ExternalApi(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("Narrative model returned an unusable response: {message}")]
    Narrative { message: String },

    #[error("Report assembly failed: {message}")]
    Assembly { message: String },

    #[error("Mail address invalid: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Mail message could not be built: {0}")]
    MailMessage(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Delivery(#[from] lettre::transport::smtp::Error),

    #[error("JSON serialization: {0}")]
    Json(#[from] serde_json::Error),
}
