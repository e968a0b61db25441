//! Persistent memory of source text -> accepted translation, reused across
//! runs before anything is sent to the API.

pub mod hash;
pub mod model;
pub mod normalize;
pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use model::TMEntry;

#[derive(Debug)]
pub struct TranslationMemory {
    path: Option<PathBuf>,
    source_lang: String,
    target_lang: String,
    entries: Vec<TMEntry>,
    /// hash of normalized text -> entry index, for this language pair only.
    index: HashMap<String, usize>,
    dirty: bool,
}

impl TranslationMemory {
    pub fn open(path: &Path, source_lang: &str, target_lang: &str) -> TranslationMemory {
        let entries = store::load(path);
        let tm = TranslationMemory::with_entries(
            Some(path.to_path_buf()),
            source_lang,
            target_lang,
            entries,
        );
        tracing::debug!(
            "translation memory {} holds {} entries, {} for {source_lang} -> {target_lang}",
            path.display(),
            tm.len(),
            tm.index.len()
        );
        tm
    }

    /// In-process only; nothing is read or written.
    pub fn ephemeral(source_lang: &str, target_lang: &str) -> TranslationMemory {
        TranslationMemory::with_entries(None, source_lang, target_lang, Vec::new())
    }

    fn with_entries(
        path: Option<PathBuf>,
        source_lang: &str,
        target_lang: &str,
        entries: Vec<TMEntry>,
    ) -> TranslationMemory {
        let mut tm = TranslationMemory {
            path,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            entries,
            index: HashMap::new(),
            dirty: false,
        };
        for i in 0..tm.entries.len() {
            tm.index_entry(i);
        }
        tm
    }

    fn index_entry(&mut self, i: usize) {
        let e = &self.entries[i];
        if e.source_lang == self.source_lang
            && e.target_lang == self.target_lang
            && !e.translation.trim().is_empty()
        {
            self.index.insert(e.hash.clone(), i);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, original: &str) -> Option<&str> {
        let norm = normalize::normalize(original);
        if norm.is_empty() {
            return None;
        }
        let h = hash::hash_norm(&norm);
        self.index
            .get(&h)
            .map(|&i| &self.entries[i])
            .filter(|e| e.normalized == norm)
            .map(|e| e.translation.as_str())
    }

    pub fn record(&mut self, original: &str, translation: &str) {
        if original.trim().is_empty() || translation.trim().is_empty() {
            return;
        }

        let mut entry = TMEntry {
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            original: original.to_string(),
            translation: translation.to_string(),
            normalized: String::new(),
            hash: String::new(),
        };
        store::ensure_norm_hash(&mut entry);

        match self.index.get(&entry.hash).copied() {
            Some(i) if self.entries[i].translation == entry.translation => return,
            Some(i) => self.entries[i] = entry,
            None => {
                self.entries.push(entry);
                self.index_entry(self.entries.len() - 1);
            }
        }
        self.dirty = true;
    }

    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        store::save(path, &self.entries)?;
        self.dirty = false;
        tracing::debug!("saved {} memory entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_whitespace_differences_but_not_case() {
        let mut tm = TranslationMemory::ephemeral("en", "zh-CN");
        tm.record("Iron gear wheel", "铁齿轮");

        assert_eq!(tm.lookup("  Iron   gear wheel "), Some("铁齿轮"));
        assert_eq!(tm.lookup("iron gear wheel"), None);
        assert_eq!(tm.lookup(""), None);
    }

    #[test]
    fn record_replaces_and_skips_empty() {
        let mut tm = TranslationMemory::ephemeral("en", "zh-CN");
        tm.record("Gear", "齿轮");
        tm.record("Gear", "齿轮组");
        tm.record("Gear", " ");
        tm.record(" ", "空");
        assert_eq!(tm.len(), 1);
        assert_eq!(tm.lookup("Gear"), Some("齿轮组"));
    }

    #[test]
    fn persists_per_language_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tm.json");

        let mut tm = TranslationMemory::open(&path, "en", "zh-CN");
        tm.record("Steel", "钢");
        tm.save().unwrap();

        let reopened = TranslationMemory::open(&path, "en", "zh-CN");
        assert_eq!(reopened.lookup("Steel"), Some("钢"));

        let other_pair = TranslationMemory::open(&path, "en", "ja");
        assert_eq!(other_pair.lookup("Steel"), None);
        assert_eq!(other_pair.len(), 1);
    }
}
