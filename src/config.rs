use clap::Args as ClapArgs;

const DEFAULT_API_URL: &str = "https://ads.data-in-stage.example.io";
const DEFAULT_WAREHOUSE_DIR: &str = "./warehouse";
const DEFAULT_CHANNELS: &str = "google ads,meta ads";
const DEFAULT_LLM_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// All runtime configuration, flag- or environment-provided. Passed into
/// each collaborator at construction time; nothing here is global.
#[derive(ClapArgs)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_API_URL, env = "API_URL")]
    pub(crate) api_url: String,

    #[arg(long, env = "API_TOKEN")]
    pub(crate) api_token: String,

    #[arg(long, env = "CHANNELS", value_delimiter = ',', default_value = DEFAULT_CHANNELS)]
    pub(crate) channels: Vec<String>,

    #[arg(long, default_value = DEFAULT_WAREHOUSE_DIR, env = "WAREHOUSE_DIR")]
    pub(crate) warehouse_dir: String,

    #[arg(long, env = "REPORT_RECIPIENT")]
    pub(crate) recipient: String,

    #[arg(long, env = "REPORT_SENDER")]
    pub(crate) sender: String,

    #[arg(long, default_value = "localhost", env = "SMTP_HOST")]
    pub(crate) smtp_host: String,

    #[arg(long, default_value_t = 587, env = "SMTP_PORT")]
    pub(crate) smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME")]
    pub(crate) smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD")]
    pub(crate) smtp_password: Option<String>,

    /// Absent key disables the narrative stage, not the pipeline.
    #[arg(long, env = "LLM_API_KEY")]
    pub(crate) llm_api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_LLM_API_URL, env = "LLM_API_URL")]
    pub(crate) llm_api_url: String,

    #[arg(long, default_value = DEFAULT_BIND_ADDR, env = "BIND_ADDR")]
    pub(crate) bind_addr: String,
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests() -> Self {
        Config {
            api_url: "https://api.example.com".to_string(),
            api_token: "test_token".to_string(),
            channels: vec!["google ads".to_string()],
            warehouse_dir: "./warehouse".to_string(),
            recipient: "manager@example.com".to_string(),
            sender: "reports@example.com".to_string(),
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            llm_api_key: None,
            llm_api_url: "https://llm.example.com/generate".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}
