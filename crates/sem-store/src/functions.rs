//! SQL scalar functions available to downstream queries.

use std::collections::HashSet;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Register `similarity(a, b)` and `tagged(tags, tag)`.
pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("similarity", 2, flags, |ctx| {
        let a = ctx.get_raw(0).as_str().ok();
        let b = ctx.get_raw(1).as_str().ok();
        Ok(match (a, b) {
            (Some(a), Some(b)) => Some(similarity(a, b)),
            _ => None,
        })
    })?;

    conn.create_scalar_function("tagged", 2, flags, |ctx| {
        let tags = ctx.get_raw(0).as_str().ok();
        let tag = ctx.get_raw(1).as_str().ok();
        Ok(match (tags, tag) {
            (Some(tags), Some(tag)) => tagged(tags, tag),
            _ => false,
        })
    })?;

    Ok(())
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the lowercase word sets.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (tokens(a), tokens(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }

    a.intersection(&b).count() as f64 / union as f64
}

/// Whether a comma or whitespace separated tag list contains `tag`.
pub fn tagged(tags: &str, tag: &str) -> bool {
    tags.split(|c: char| c == ',' || c.is_whitespace())
        .any(|t| !t.is_empty() && t == tag)
}
