use crate::error::Result;
use crate::report::SUBCATEGORY_KEY;
use log::{info, warn};
use serde_json::Value;
use std::path::Path;

/// Removes `year` from every category and from every subcategory under
/// `"소분류"`. Returns the number of entries removed; a second call on the
/// same document removes nothing.
pub fn prune_year(document: &mut Value, year: i32) -> usize {
    let key = year.to_string();
    let Some(categories) = document.as_object_mut() else {
        return 0;
    };

    let mut removed = 0;
    for (category, tree) in categories.iter_mut() {
        let Some(tree) = tree.as_object_mut() else {
            continue;
        };

        if tree.shift_remove(&key).is_some() {
            info!("{}: removed {}", category, key);
            removed += 1;
        }

        if let Some(subcategories) = tree.get_mut(SUBCATEGORY_KEY).and_then(Value::as_object_mut) {
            for (subcategory, series) in subcategories.iter_mut() {
                if let Some(series) = series.as_object_mut() {
                    if series.shift_remove(&key).is_some() {
                        info!("{}/{}/{}: removed {}", category, SUBCATEGORY_KEY, subcategory, key);
                        removed += 1;
                    }
                }
            }
        }
    }

    removed
}

/// Prunes `year` from the report at `path`, rewriting it only when
/// something was removed. A missing file is reported and removes nothing.
pub fn prune_year_in_file(path: &Path, year: i32) -> Result<usize> {
    if !path.exists() {
        warn!("Report not found: {}", path.display());
        return Ok(0);
    }

    let contents = std::fs::read_to_string(path)?;
    let mut document: Value = serde_json::from_str(&contents)?;

    let removed = prune_year(&mut document, year);
    if removed > 0 {
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        info!("{}: {} entries for {} removed", path.display(), removed, year);
    } else {
        info!("{}: nothing to remove for {}", path.display(), year);
    }

    Ok(removed)
}
