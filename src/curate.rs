use anyhow::Result;
use tracing::info;

use crate::db::Store;

/// Soft-delete valid posts containing `keyword`, and the post `id` if given.
///
/// Both paths run in one call and the store is saved once. An empty keyword
/// matches nothing. Returns the ids that were switched off.
pub fn mark_invalid(store: &mut Store, id: Option<&str>, keyword: Option<&str>) -> Result<Vec<String>> {
    let mut removed = Vec::new();

    if let Some(kw) = keyword.filter(|k| !k.is_empty()) {
        for (rid, r) in store.iter_mut() {
            if r.valid && r.post.contains(kw) {
                info!("delete {} {}", r.link, r.post);
                r.valid = false;
                removed.push(rid.clone());
            }
        }
    }

    if let Some(id) = id {
        if let Some(r) = store.get_mut(id) {
            info!("delete {}", r.post);
            if r.valid {
                removed.push(id.to_string());
            }
            r.valid = false;
        }
    }

    store.save()?;
    Ok(removed)
}

/// Restore a soft-deleted post. Returns false when `id` is unknown.
pub fn recover(store: &mut Store, id: &str) -> Result<bool> {
    let found = match store.get_mut(id) {
        Some(r) => {
            r.valid = true;
            info!("recover {}", r.post);
            true
        }
        None => false,
    };
    store.save()?;
    Ok(found)
}
