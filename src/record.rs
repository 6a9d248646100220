use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the post identifier carried at the end of every detail link.
pub const ID_LEN: usize = 16;

/// Derive the store key from a post link: its trailing 16 characters.
pub fn id_from_link(link: &str) -> String {
    let skip = link.chars().count().saturating_sub(ID_LEN);
    link.chars().skip(skip).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lng: f64,
    pub lat: f64,
}

/// On-disk shape of `location` in import/export files: `{lng, lat}` or `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationField {
    Point(Location),
    Blank(String),
}

impl From<Option<Location>> for LocationField {
    fn from(loc: Option<Location>) -> Self {
        match loc {
            Some(l) => LocationField::Point(l),
            None => LocationField::Blank(String::new()),
        }
    }
}

impl LocationField {
    pub fn into_point(self) -> Option<Location> {
        match self {
            LocationField::Point(l) => Some(l),
            LocationField::Blank(_) => None,
        }
    }
}

/// Geocoding state of a record.
///
/// `Pending` records have never been sent to the geocoder. `Unresolved` ones
/// were sent (or imported with an empty address) and are never re-queried.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Geocoding {
    #[default]
    Pending,
    Unresolved,
    Resolved {
        address: String,
        location: Option<Location>,
    },
}

impl Geocoding {
    /// Build from an imported `(address, location)` pair.
    pub fn from_parts(address: String, location: LocationField) -> Self {
        if address.is_empty() {
            Geocoding::Unresolved
        } else {
            Geocoding::Resolved {
                address,
                location: location.into_point(),
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Geocoding::Pending)
    }

    /// Human-readable address, empty unless resolved.
    pub fn address(&self) -> &str {
        match self {
            Geocoding::Resolved { address, .. } => address,
            _ => "",
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Geocoding::Resolved { location, .. } => *location,
            _ => None,
        }
    }

    pub(crate) fn state_label(&self) -> &'static str {
        match self {
            Geocoding::Pending => "pending",
            Geocoding::Unresolved => "unresolved",
            Geocoding::Resolved { .. } => "resolved",
        }
    }
}

/// One persisted post.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub time: String,
    pub link: String,
    pub post: String,
    pub geocoding: Geocoding,
    pub valid: bool,
    pub fetched_at: DateTime<Utc>,
}

impl Record {
    /// A freshly acquired, active, not yet geocoded record.
    pub fn new(time: String, link: String, post: String) -> Self {
        Record {
            time,
            link,
            post,
            geocoding: Geocoding::Pending,
            valid: true,
            fetched_at: Utc::now(),
        }
    }

    pub fn id(&self) -> String {
        id_from_link(&self.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_trailing_sixteen_chars() {
        assert_eq!(
            id_from_link("https://m.weibo.cn/detail/4661688706009874"),
            "4661688706009874"
        );
        assert_eq!(id_from_link("http://x/0000000000001234"), "0000000000001234");
        for link in ["abc", "", "no_link_河南郑州市金水区", "https://a.b/c/ddddddddddddddddd"] {
            let id = id_from_link(link);
            assert_eq!(id.chars().count(), link.chars().count().min(ID_LEN));
            assert!(link.ends_with(&id));
        }
    }

    #[test]
    fn record_id_follows_link() {
        let r = Record::new("t".into(), "https://m.weibo.cn/detail/1234567890abcdef".into(), "p".into());
        assert_eq!(r.id(), "1234567890abcdef");
        assert!(r.valid);
        assert!(r.geocoding.is_pending());
    }

    #[test]
    fn location_field_shapes() {
        let point: LocationField = serde_json::from_str(r#"{"lng": 113.6, "lat": 34.7}"#).unwrap();
        assert_eq!(point.into_point(), Some(Location { lng: 113.6, lat: 34.7 }));

        let blank: LocationField = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(blank.into_point(), None);

        assert_eq!(serde_json::to_string(&LocationField::from(None)).unwrap(), r#""""#);
    }

    #[test]
    fn empty_imported_address_is_unresolved() {
        let g = Geocoding::from_parts(String::new(), LocationField::Blank(String::new()));
        assert_eq!(g, Geocoding::Unresolved);
        assert!(!g.is_pending());
        assert_eq!(g.address(), "");
    }
}
