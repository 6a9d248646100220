use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Reader};
use indexmap::map::Entry;
use tracing::info;

use crate::db::Store;
use crate::export::ExportedPost;
use crate::record::{id_from_link, Geocoding, Record};

/// One spreadsheet row: time, link, post.
pub type SheetRow = [String; 3];

/// Merge an import file into the store and save it.
///
/// `.xlsx`/`.xls`/`.ods` files are read as (time, link, post) rows from the
/// first sheet; `.json` files as an exported post array. Existing records are
/// updated field by field. Returns the number of rows merged.
pub fn load_into(store: &mut Store, path: &Path) -> Result<usize> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let merged = match ext.as_deref() {
        Some("xlsx" | "xlsm" | "xls" | "ods") => merge_rows(store, read_sheet(path)?),
        Some("json") => merge_exported(store, read_json(path)?),
        _ => bail!("Unsupported import file {:?}, expected a spreadsheet or .json", path),
    };

    store.save()?;
    info!("Imported {} rows from {:?}", merged, path);
    Ok(merged)
}

fn read_sheet(path: &Path) -> Result<Vec<SheetRow>> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Failed to open {:?}", path))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{:?} has no sheets", path))?
        .with_context(|| format!("Failed to read first sheet of {:?}", path))?;

    range
        .rows()
        .enumerate()
        .map(|(i, row)| match row {
            [time, link, post, ..] => Ok([time.to_string(), link.to_string(), post.to_string()]),
            _ => bail!("Row {} of {:?} has {} cells, expected 3", i + 1, path, row.len()),
        })
        .collect()
}

fn read_json(path: &Path) -> Result<Vec<ExportedPost>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed post array in {:?}", path))
}

pub fn merge_rows(store: &mut Store, rows: impl IntoIterator<Item = SheetRow>) -> usize {
    let mut n = 0;
    for [time, link, post] in rows {
        match store.entry(id_from_link(&link)) {
            Entry::Occupied(mut e) => {
                let r = e.get_mut();
                r.time = time;
                r.link = link;
                r.post = post;
            }
            Entry::Vacant(e) => {
                e.insert(Record::new(time, link, post));
            }
        }
        n += 1;
    }
    n
}

pub fn merge_exported(store: &mut Store, posts: Vec<ExportedPost>) -> usize {
    let n = posts.len();
    for p in posts {
        let geocoding = Geocoding::from_parts(p.address, p.location);
        match store.entry(id_from_link(&p.link)) {
            Entry::Occupied(mut e) => {
                let r = e.get_mut();
                r.time = p.time;
                r.geocoding = geocoding;
                r.post = p.post;
                r.link = p.link;
            }
            Entry::Vacant(e) => {
                let mut r = Record::new(p.time, p.link, p.post);
                r.geocoding = geocoding;
                e.insert(r);
            }
        }
    }
    n
}
