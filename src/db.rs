use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rusqlite::Connection;

use crate::record::{Geocoding, Location, Record};

/// The full id → record mapping, held in memory and persisted to one SQLite
/// file. Every `save` rewrites the file's contents completely.
pub struct Store {
    conn: Connection,
    records: IndexMap<String, Record>,
}

impl Store {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let records = load_records(&conn)?;
        Ok(Store { conn, records })
    }

    /// Overwrite the persisted mapping with the in-memory one.
    pub fn save(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM records", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records
                 (seq, id, time, link, post, geocoding, address, lng, lat, valid, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (seq, (id, r)) in self.records.iter().enumerate() {
                let address = match &r.geocoding {
                    Geocoding::Pending => None,
                    g => Some(g.address()),
                };
                let loc = r.geocoding.location();
                stmt.execute(rusqlite::params![
                    seq as i64,
                    id,
                    r.time,
                    r.link,
                    r.post,
                    r.geocoding.state_label(),
                    address,
                    loc.map(|l| l.lng),
                    loc.map(|l| l.lat),
                    r.valid,
                    r.fetched_at,
                ])?;
            }
        }
        tx.commit().context("Failed to save store")?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, id: String, record: Record) {
        self.records.insert(id, record);
    }

    pub fn entry(&mut self, id: String) -> indexmap::map::Entry<'_, String, Record> {
        self.records.entry(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Record)> {
        self.records.iter_mut()
    }

    pub fn stats(&self) -> Stats {
        let mut s = Stats {
            total: self.records.len(),
            ..Default::default()
        };
        for r in self.records.values() {
            if r.valid {
                s.valid += 1;
            } else {
                s.invalid += 1;
            }
            match r.geocoding {
                Geocoding::Pending => s.pending += 1,
                Geocoding::Unresolved => s.unresolved += 1,
                Geocoding::Resolved { .. } => s.resolved += 1,
            }
        }
        s
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            seq        INTEGER PRIMARY KEY,
            id         TEXT UNIQUE NOT NULL,
            time       TEXT NOT NULL,
            link       TEXT NOT NULL,
            post       TEXT NOT NULL,
            geocoding  TEXT NOT NULL CHECK(geocoding IN ('pending','unresolved','resolved')),
            address    TEXT,
            lng        REAL,
            lat        REAL,
            valid      BOOLEAN DEFAULT 1,
            fetched_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

struct RecordRow {
    id: String,
    time: String,
    link: String,
    post: String,
    geocoding: String,
    address: Option<String>,
    lng: Option<f64>,
    lat: Option<f64>,
    valid: Option<bool>,
    fetched_at: DateTime<Utc>,
}

fn load_records(conn: &Connection) -> Result<IndexMap<String, Record>> {
    let mut stmt = conn.prepare(
        "SELECT id, time, link, post, geocoding, address, lng, lat, valid, fetched_at
         FROM records ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RecordRow {
                id: row.get(0)?,
                time: row.get(1)?,
                link: row.get(2)?,
                post: row.get(3)?,
                geocoding: row.get(4)?,
                address: row.get(5)?,
                lng: row.get(6)?,
                lat: row.get(7)?,
                valid: row.get(8)?,
                fetched_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = IndexMap::with_capacity(rows.len());
    for row in rows {
        let location = match (row.lng, row.lat) {
            (Some(lng), Some(lat)) => Some(Location { lng, lat }),
            _ => None,
        };
        let geocoding = match row.geocoding.as_str() {
            "pending" => Geocoding::Pending,
            "unresolved" => Geocoding::Unresolved,
            "resolved" => Geocoding::Resolved {
                address: row.address.unwrap_or_default(),
                location,
            },
            other => bail!("Unknown geocoding state {:?} for record {}", other, row.id),
        };
        records.insert(
            row.id,
            Record {
                time: row.time,
                link: row.link,
                post: row.post,
                geocoding,
                // Rows written before the flag existed count as active.
                valid: row.valid.unwrap_or(true),
                fetched_at: row.fetched_at,
            },
        );
    }
    Ok(records)
}

#[derive(Debug, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub pending: usize,
    pub unresolved: usize,
    pub resolved: usize,
}
