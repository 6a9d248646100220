use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::normalize::normalize;
use crate::record::{Geocoding, Location};

const BAIDU_HOST: &str = "https://aip.baidubce.com";
const TOKEN_PATH: &str = "/oauth/2.0/token";
const ADDRESS_PATH: &str = "/rpc/2.0/nlp/v1/address";

#[async_trait]
pub trait AddressResolver {
    /// Geocode free post text. Failures come back as `Geocoding::Unresolved`.
    async fn geocode(&mut self, text: &str) -> Geocoding;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fields of the address-extraction response that matter here.
#[derive(Debug, Default, Deserialize)]
pub struct AddressResponse {
    /// Set by the API on failures such as 110/111 (invalid or expired token).
    pub error_code: Option<i64>,
    pub province: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub town: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl AddressResponse {
    pub fn into_geocoding(self) -> Geocoding {
        let Some(province) = self.province else {
            return Geocoding::Unresolved;
        };
        let address = format!("{}{}{}", province, self.city, self.town);
        if address.is_empty() {
            return Geocoding::Unresolved;
        }
        let location = match (self.lng, self.lat) {
            (Some(lng), Some(lat)) => Some(Location { lng, lat }),
            _ => None,
        };
        Geocoding::Resolved { address, location }
    }
}

/// Baidu AIP address extraction, authenticated with client credentials.
pub struct BaiduGeocoder {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Option<String>,
}

impl BaiduGeocoder {
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: BAIDU_HOST.to_string(),
            client_id,
            client_secret,
            token: None,
        })
    }

    /// Send requests to another host, e.g. a local stand-in.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Access token for this run; fetched once and refetched only after the
    /// API rejects it. `None` if the exchange fails.
    pub async fn token(&mut self) -> Option<String> {
        if self.token.is_none() {
            self.token = self.request_token().await;
        }
        self.token.clone()
    }

    async fn request_token(&self) -> Option<String> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, TOKEN_PATH))
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Token exchange rejected: {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("Token exchange failed: {}", e);
                return None;
            }
        };
        match response.json::<TokenResponse>().await {
            Ok(t) => Some(t.access_token),
            Err(e) => {
                warn!("Malformed token response: {}", e);
                None
            }
        }
    }

    async fn query(&self, token: &str, text: &str) -> reqwest::Result<AddressResponse> {
        self.client
            .post(format!("{}{}", self.base_url, ADDRESS_PATH))
            .query(&[("access_token", token)])
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?
            .json::<AddressResponse>()
            .await
    }
}

#[async_trait]
impl AddressResolver for BaiduGeocoder {
    async fn geocode(&mut self, text: &str) -> Geocoding {
        let text = normalize(text);
        let Some(token) = self.token().await else {
            return Geocoding::Unresolved;
        };
        match self.query(&token, &text).await {
            Ok(resp) => {
                debug!(?resp, "address response");
                if resp.province.is_none() && resp.error_code.is_some() {
                    warn!("Address query rejected with error {:?}, dropping token", resp.error_code);
                    self.token = None;
                }
                resp.into_geocoding()
            }
            Err(e) => {
                warn!("Address query failed: {}", e);
                Geocoding::Unresolved
            }
        }
    }
}

/// Geocode every record that has never been geocoded, then save once.
///
/// Records already geocoded, including those where nothing was found, are
/// left alone. Returns how many records were queried.
pub async fn enrich_all<R: AddressResolver + ?Sized>(
    store: &mut Store,
    resolver: &mut R,
) -> Result<usize> {
    let pending = store.iter().filter(|(_, r)| r.geocoding.is_pending()).count();

    let pb = ProgressBar::new(pending as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut count = 0usize;
    for (_, record) in store.iter_mut().filter(|(_, r)| r.geocoding.is_pending()) {
        record.geocoding = resolver.geocode(&record.post).await;
        count += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    store.save()?;
    info!("Geocoded {} posts", count);
    Ok(count)
}
