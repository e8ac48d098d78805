use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("CINELIST_API_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .context("CINELIST_API_URL not set")?;

        let data_dir = match env::var("CINELIST_DATA_DIR").ok().filter(|s| !s.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .context("No local data directory on this platform, set CINELIST_DATA_DIR")?
                .join("cinelist"),
        };

        let request_timeout = match env::var("CINELIST_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("CINELIST_TIMEOUT_SECS is not a number: {raw}"))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url,
            data_dir,
            request_timeout: Duration::from_secs(request_timeout),
        })
    }
}
