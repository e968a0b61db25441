//! On-disk form of the translation memory: a pretty-printed JSON array,
//! kept sorted and free of duplicate keys.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::model::TMEntry;
use super::{hash, normalize};
use crate::error::{Error, Result};

type EntryKey = (String, String, String);

/// Reads the memory file. A missing or unreadable file yields an empty
/// memory. Stale keys are refreshed and duplicates merged; the cleaned list
/// is written back when that changed anything.
pub fn load(path: &Path) -> Vec<TMEntry> {
    if !path.exists() {
        return Vec::new();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| serde_json::from_str::<Vec<TMEntry>>(&data).map_err(|e| e.to_string()));
    let raw = match parsed {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("translation memory {} ignored: {e}", path.display());
            return Vec::new();
        }
    };

    let count = raw.len();
    let (entries, refreshed) = compact(raw);
    if refreshed || entries.len() != count {
        tracing::debug!(
            "translation memory {}: {} entries, {} merged",
            path.display(),
            entries.len(),
            count - entries.len()
        );
        if let Err(e) = save(path, &entries) {
            tracing::warn!("could not rewrite translation memory: {e}");
        }
    }

    entries
}

pub fn save(path: &Path, entries: &[TMEntry]) -> Result<()> {
    let (entries, _) = compact(entries.to_vec());
    let json = serde_json::to_string_pretty(&entries).map_err(|e| Error::json(path, e))?;
    write_atomic(path, json.as_bytes())
}

/// Recomputes `normalized` and `hash` from `original`. Returns whether
/// either was out of date.
pub(super) fn ensure_norm_hash(e: &mut TMEntry) -> bool {
    let normalized = normalize::normalize(&e.original);
    let digest = hash::hash_norm(&normalized);
    let stale = e.normalized != normalized || e.hash != digest;
    e.normalized = normalized;
    e.hash = digest;
    stale
}

/// Empty translations lose to anything; otherwise the longer one wins.
fn rank(e: &TMEntry) -> (bool, usize) {
    let t = e.translation.trim();
    (!t.is_empty(), t.len())
}

/// Refreshes every key and keeps one entry per language pair and source
/// text, ordered by language pair then normalized text.
fn compact(entries: Vec<TMEntry>) -> (Vec<TMEntry>, bool) {
    let mut refreshed = false;
    let mut merged: BTreeMap<EntryKey, TMEntry> = BTreeMap::new();

    for mut e in entries {
        refreshed |= ensure_norm_hash(&mut e);
        let key = (e.source_lang.clone(), e.target_lang.clone(), e.normalized.clone());
        match merged.get_mut(&key) {
            Some(kept) if rank(&e) > rank(kept) => *kept = e,
            Some(_) => {}
            None => {
                merged.insert(key, e);
            }
        }
    }

    (merged.into_values().collect(), refreshed)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
