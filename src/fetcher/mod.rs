pub mod weibo;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Store;
use crate::record::Record;

pub use weibo::{extract_ids, WeiboClient};

/// Why a single post could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no render data in detail page of {0}")]
    NoRenderData(String),
    #[error("malformed render data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("render data missing field `{0}`")]
    MissingField(&'static str),
}

/// A post as read from its detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub created_at: String,
    pub link: String,
    pub text: String,
}

#[async_trait]
pub trait PostSource {
    /// Raw body of one keyword search page.
    async fn search(&self, keyword: &str, page: u32) -> Result<String, FetchError>;
    async fn fetch_detail(&self, id: &str) -> Result<PostDetail, FetchError>;
}

/// Fetch one search page and add every post not yet in the store.
///
/// Known ids are skipped, or end the page early when `stop_if_repeat` is set.
/// Failed items are logged and left out. Saves the store and returns the
/// number of records added.
pub async fn acquire<S: PostSource + ?Sized>(
    store: &mut Store,
    source: &S,
    keyword: &str,
    page: u32,
    stop_if_repeat: bool,
    delay: Duration,
) -> Result<usize> {
    let ids = match source.search(keyword, page).await {
        Ok(body) => extract_ids(&body),
        Err(e) => {
            warn!("Search for {:?} page {} failed: {}", keyword, page, e);
            Vec::new()
        }
    };

    let mut added = 0usize;
    for id in ids {
        if store.contains(&id) {
            if stop_if_repeat {
                break;
            }
            continue;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match source.fetch_detail(&id).await {
            Ok(detail) => {
                info!("{} {} {}", detail.created_at, detail.link, detail.text);
                let record = Record::new(detail.created_at, detail.link, detail.text);
                store.insert(record.id(), record);
                added += 1;
            }
            Err(e) => warn!("Fetching post {} failed: {}", id, e),
        }
    }

    store.save()?;
    info!("Acquired {} posts from page {}", added, page);
    Ok(added)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::record::Geocoding;

    /// In-memory stand-in for the Weibo site.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub pages: HashMap<u32, String>,
        pub details: HashMap<String, PostDetail>,
        pub fetched: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub fn with_page(mut self, page: u32, ids: &[&str]) -> Self {
            let cards: Vec<String> = ids
                .iter()
                .map(|id| format!(r#"{{"mblog":{{"id":"{}","text":"…"}}}}"#, id))
                .collect();
            self.pages
                .insert(page, format!(r#"{{"data":{{"cards":[{}]}}}}"#, cards.join(",")));
            self
        }

        pub fn with_post(mut self, id: &str, text: &str) -> Self {
            self.details.insert(
                id.to_string(),
                PostDetail {
                    created_at: format!("created {}", id),
                    link: weibo::detail_url(id),
                    text: text.to_string(),
                },
            );
            self
        }

        pub fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PostSource for FakeSource {
        async fn search(&self, _keyword: &str, page: u32) -> Result<String, FetchError> {
            self.pages
                .get(&page)
                .cloned()
                .ok_or_else(|| FetchError::NoRenderData(format!("page {}", page)))
        }

        async fn fetch_detail(&self, id: &str) -> Result<PostDetail, FetchError> {
            self.fetched.lock().unwrap().push(id.to_string());
            self.details
                .get(id)
                .cloned()
                .ok_or(FetchError::MissingField("status"))
        }
    }

    const A: &str = "4661688706009874";
    const B: &str = "4661702141379712";
    const C: &str = "4661711192100532";

    #[tokio::test]
    async fn adds_new_posts_in_order() {
        let source = FakeSource::default()
            .with_page(0, &[A, B, A])
            .with_post(A, "a")
            .with_post(B, "b");
        let mut store = Store::in_memory().unwrap();

        let added = acquire(&mut store, &source, "k", 0, false, Duration::ZERO).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(source.fetched(), [A, B]);
        let ids: Vec<&str> = store.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, [A, B]);
        let a = store.get(A).unwrap();
        assert_eq!(a.time, format!("created {}", A));
        assert_eq!(a.link, format!("https://m.weibo.cn/detail/{}", A));
        assert_eq!(a.post, "a");
        assert!(a.valid);
        assert_eq!(a.geocoding, Geocoding::Pending);
    }

    #[tokio::test]
    async fn stop_if_repeat_ends_page_at_first_known_id() {
        let source = FakeSource::default()
            .with_page(0, &[B, A, C])
            .with_post(A, "a")
            .with_post(B, "b")
            .with_post(C, "c");
        let mut store = Store::in_memory().unwrap();
        let known = Record::new("t".into(), weibo::detail_url(A), "old".into());
        store.insert(A.to_string(), known);

        let added = acquire(&mut store, &source, "k", 0, true, Duration::ZERO).await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(source.fetched(), [B]);
        assert!(!store.contains(C));
        assert_eq!(store.get(A).unwrap().post, "old");
    }

    #[tokio::test]
    async fn known_ids_are_skipped_without_stop() {
        let source = FakeSource::default()
            .with_page(0, &[B, A, C])
            .with_post(B, "b")
            .with_post(C, "c");
        let mut store = Store::in_memory().unwrap();
        store.insert(A.to_string(), Record::new("t".into(), weibo::detail_url(A), "old".into()));

        let added = acquire(&mut store, &source, "k", 0, false, Duration::ZERO).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(source.fetched(), [B, C]);
    }

    #[tokio::test]
    async fn failed_items_are_skipped() {
        let source = FakeSource::default()
            .with_page(0, &[A, B, C])
            .with_post(A, "a")
            .with_post(C, "c");
        let mut store = Store::in_memory().unwrap();

        let added = acquire(&mut store, &source, "k", 0, false, Duration::ZERO).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(source.fetched(), [A, B, C]);
        assert!(!store.contains(B));
    }

    #[tokio::test]
    async fn failed_search_adds_nothing() {
        let source = FakeSource::default();
        let mut store = Store::in_memory().unwrap();

        let added = acquire(&mut store, &source, "k", 7, false, Duration::ZERO).await.unwrap();

        assert_eq!(added, 0);
        assert!(store.is_empty());
    }
}
