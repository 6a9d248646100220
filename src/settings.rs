use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

/// Run configuration, read once at startup from `AID_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub store_path: PathBuf,
    pub keyword: String,
    pub pages: u32,
    pub region: String,
    pub export_path: PathBuf,
    pub fetch_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub geocoder_client_id: String,
    pub geocoder_client_secret: String,
    pub geocoder_url: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_source(Environment::with_prefix("AID").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .set_default("store_path", "data/latest_data.sqlite")?
            .set_default("keyword", "河南暴雨互助")?
            .set_default("pages", 50)?
            .set_default("region", "河南")?
            .set_default("export_path", "final.json")?
            .set_default("fetch_delay_ms", 1000)?
            .set_default("http_timeout_secs", 30)?
            .set_default("geocoder_client_id", "")?
            .set_default("geocoder_client_secret", "")?
            .set_default("geocoder_url", "https://aip.baidubce.com")?
            .add_source(source)
            .build()?
            .try_deserialize()
            .context("Invalid AID_* configuration")
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
