use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Store;
use crate::record::{Geocoding, LocationField, Record};

/// A post as it appears in the visualization JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPost {
    #[serde(rename = "Time")]
    pub time: String,
    pub address: String,
    pub location: LocationField,
    pub post: String,
    pub link: String,
}

impl From<&Record> for ExportedPost {
    fn from(r: &Record) -> Self {
        ExportedPost {
            time: r.time.clone(),
            address: r.geocoding.address().to_string(),
            location: r.geocoding.location().into(),
            post: r.post.clone(),
            link: r.link.clone(),
        }
    }
}

/// Valid records geocoded inside `region`, in store order.
pub fn select(store: &Store, region: &str) -> Vec<ExportedPost> {
    store
        .iter()
        .map(|(_, r)| r)
        .filter(|r| r.valid)
        .filter(|r| matches!(&r.geocoding, Geocoding::Resolved { address, .. } if address.contains(region)))
        .map(ExportedPost::from)
        .collect()
}

/// Write the selected posts to `path` as an indented UTF-8 JSON array.
pub fn export(store: &Store, region: &str, path: &Path) -> Result<usize> {
    let posts = select(store, region);

    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    posts.serialize(&mut ser)?;
    writer.flush()?;

    info!("Exported {} posts to {:?}", posts.len(), path);
    Ok(posts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Location;

    fn resolved(id: &str, address: &str, valid: bool) -> (String, Record) {
        let mut r = Record::new(format!("time {}", id), format!("https://m.weibo.cn/detail/{}", id), format!("post {}", id));
        r.geocoding = Geocoding::Resolved {
            address: address.into(),
            location: Some(Location { lng: 113.66, lat: 34.8 }),
        };
        r.valid = valid;
        (id.to_string(), r)
    }

    fn sample_store() -> Store {
        let mut store = Store::in_memory().unwrap();
        let entries = [
            resolved("1111111111111111", "河南省郑州市金水区", true),
            resolved("2222222222222222", "北京市海淀区", true),
            resolved("3333333333333333", "河南省新乡市卫辉市", false),
            resolved("4444444444444444", "河南省新乡市", true),
        ];
        for (id, r) in entries {
            store.insert(id, r);
        }
        let mut unresolved = Record::new("t".into(), "l/5555555555555555".into(), "河南".into());
        unresolved.geocoding = Geocoding::Unresolved;
        store.insert(unresolved.id(), unresolved);
        let pending = Record::new("t".into(), "l/6666666666666666".into(), "河南".into());
        store.insert(pending.id(), pending);
        store
    }

    #[test]
    fn selects_valid_records_in_region_in_order() {
        let store = sample_store();
        let links: Vec<String> = select(&store, "河南").into_iter().map(|p| p.link).collect();
        assert_eq!(
            links,
            [
                "https://m.weibo.cn/detail/1111111111111111",
                "https://m.weibo.cn/detail/4444444444444444",
            ]
        );
    }

    #[test]
    fn writes_indented_unescaped_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.json");
        let store = sample_store();

        assert_eq!(export(&store, "郑州", &path).unwrap(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("河南省郑州市金水区"));
        assert!(text.contains("\n        \"Time\": \"time 1111111111111111\""));

        let back: Vec<ExportedPost> = serde_json::from_str(&text).unwrap();
        assert_eq!(
            back,
            [ExportedPost {
                time: "time 1111111111111111".into(),
                address: "河南省郑州市金水区".into(),
                location: LocationField::Point(Location { lng: 113.66, lat: 34.8 }),
                post: "post 1111111111111111".into(),
                link: "https://m.weibo.cn/detail/1111111111111111".into(),
            }]
        );
    }

    #[test]
    fn resolved_without_coordinates_exports_blank_location() {
        let mut r = Record::new("t".into(), "l/7777777777777777".into(), "p".into());
        r.geocoding = Geocoding::Resolved {
            address: "河南省".into(),
            location: None,
        };
        let value = serde_json::to_value(ExportedPost::from(&r)).unwrap();
        assert_eq!(value["location"], "");
        assert_eq!(value["Time"], "t");
    }

    #[test]
    fn empty_selection_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.json");
        let store = Store::in_memory().unwrap();

        assert_eq!(export(&store, "河南", &path).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
