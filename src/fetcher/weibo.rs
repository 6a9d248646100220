use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{FetchError, PostDetail, PostSource};

const SEARCH_URL: &str = "https://m.weibo.cn/api/container/getIndex";
const DETAIL_URL: &str = "https://m.weibo.cn/detail/";
const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?s)"id":"(.{16})","#).unwrap());
static RENDER_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)var \$render_data = \[(\{.*\})\]\[0\]").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").unwrap());

pub fn detail_url(id: &str) -> String {
    format!("{}{}", DETAIL_URL, id)
}

/// Pull 16-character post ids out of a search response, in order.
pub fn extract_ids(body: &str) -> Vec<String> {
    ID_RE
        .captures_iter(body)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Parse the `$render_data` blob embedded in a detail page.
pub fn parse_detail(id: &str, html: &str) -> Result<PostDetail, FetchError> {
    let blob = RENDER_DATA_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| FetchError::NoRenderData(id.to_string()))?;

    let data: serde_json::Value = serde_json::from_str(blob.as_str())?;
    let status = data.get("status").ok_or(FetchError::MissingField("status"))?;
    let created_at = status
        .get("created_at")
        .and_then(|v| v.as_str())
        .ok_or(FetchError::MissingField("created_at"))?;
    let text = status
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or(FetchError::MissingField("text"))?;

    Ok(PostDetail {
        created_at: created_at.to_string(),
        link: detail_url(id),
        text: strip_tags(text),
    })
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").to_string()
}

/// Weibo mobile site client.
pub struct WeiboClient {
    client: reqwest::Client,
}

impl WeiboClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PostSource for WeiboClient {
    async fn search(&self, keyword: &str, page: u32) -> Result<String, FetchError> {
        debug!("Searching {:?} page {}", keyword, page);
        let body = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("containerid", format!("100103type=1&q={}", keyword)),
                ("page_type", "searchall".to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn fetch_detail(&self, id: &str) -> Result<PostDetail, FetchError> {
        let html = self
            .client
            .get(detail_url(id))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_detail(id, &html)
    }
}
