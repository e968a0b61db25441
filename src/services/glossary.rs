//! Term glossary: `English term: Chinese term`, one per line.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::services::text::protected_re;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlossaryTerm {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct Glossary {
    terms: Vec<GlossaryTerm>,
    by_lower: HashMap<String, usize>,
    /// Case-insensitive pattern per term, aligned with `terms`.
    patterns: Vec<Regex>,
    /// Term indices, longest source first.
    longest_first: Vec<usize>,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Matches of `re` in `text` that are not glued to neighbouring ASCII word
/// characters. CJK text around a term counts as a boundary.
fn bounded_matches(re: &Regex, term: &str, text: &str) -> Vec<(usize, usize)> {
    let need_before = term.chars().next().is_some_and(is_word_char);
    let need_after = term.chars().next_back().is_some_and(is_word_char);

    let mut out = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = re.find_at(text, pos) else {
            break;
        };

        let before_ok = !need_before
            || text[..m.start()].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok =
            !need_after || text[m.end()..].chars().next().map_or(true, |c| !is_word_char(c));

        if before_ok && after_ok && m.end() > m.start() {
            out.push((m.start(), m.end()));
            pos = m.end();
        } else {
            pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
        }
    }
    out
}

impl Glossary {
    pub fn load(path: &Path) -> Result<Glossary> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let glossary = Glossary::parse(&text);
        if glossary.is_empty() {
            tracing::warn!("glossary {} has no `term: translation` lines", path.display());
        } else {
            tracing::info!("loaded {} glossary terms from {}", glossary.len(), path.display());
        }
        Ok(glossary)
    }

    /// Like [`Glossary::load`] but a missing file yields an empty glossary.
    pub fn load_optional(path: &Path) -> Result<Glossary> {
        if path.exists() {
            Glossary::load(path)
        } else {
            tracing::warn!("glossary {} not found, translating without it", path.display());
            Ok(Glossary::default())
        }
    }

    pub fn parse(text: &str) -> Glossary {
        let mut glossary = Glossary::default();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim_start_matches('\u{feff}').trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let split = line
                .char_indices()
                .find(|&(_, c)| c == ':' || c == '：')
                .map(|(pos, c)| (&line[..pos], &line[pos + c.len_utf8()..]));

            match split {
                Some((source, target)) if !source.trim().is_empty() && !target.trim().is_empty() => {
                    glossary.insert(source.trim(), target.trim());
                }
                _ => tracing::debug!("glossary line {} skipped: {line}", i + 1),
            }
        }

        glossary.sort_terms();
        glossary
    }

    fn insert(&mut self, source: &str, target: &str) {
        let lower = source.to_lowercase();
        if let Some(&idx) = self.by_lower.get(&lower) {
            self.terms[idx].target = target.to_string();
            return;
        }

        let pattern = match RegexBuilder::new(&regex::escape(source))
            .case_insensitive(true)
            .build()
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("glossary term `{source}` skipped: {e}");
                return;
            }
        };

        self.by_lower.insert(lower, self.terms.len());
        self.terms.push(GlossaryTerm {
            source: source.to_string(),
            target: target.to_string(),
        });
        self.patterns.push(pattern);
    }

    fn sort_terms(&mut self) {
        let terms = &self.terms;
        let mut order: Vec<usize> = (0..terms.len()).collect();
        order.sort_by(|&a, &b| {
            terms[b]
                .source
                .len()
                .cmp(&terms[a].source.len())
                .then_with(|| a.cmp(&b))
        });
        self.longest_first = order;
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.lookup(source).is_some()
    }

    pub fn lookup(&self, source: &str) -> Option<&GlossaryTerm> {
        self.by_lower
            .get(&source.to_lowercase())
            .map(|&i| &self.terms[i])
    }

    /// Glossary terms that occur in any of `texts`, in glossary order.
    pub fn relevant_terms<'a, I>(&self, texts: I) -> Vec<&GlossaryTerm>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let texts: Vec<&str> = texts.into_iter().collect();

        self.terms
            .iter()
            .zip(&self.patterns)
            .filter(|(term, re)| {
                texts
                    .iter()
                    .any(|t| !bounded_matches(re, &term.source, t).is_empty())
            })
            .map(|(term, _)| term)
            .collect()
    }

    /// Replaces source-language glossary terms left in `translation` with
    /// their target terms, longest term first. Tags and placeholders are
    /// left untouched.
    pub fn enforce(&self, translation: &str) -> String {
        if self.is_empty() {
            return translation.to_string();
        }

        let mut out = String::with_capacity(translation.len());
        let mut last = 0;
        for m in protected_re().find_iter(translation) {
            out.push_str(&self.substitute(&translation[last..m.start()]));
            out.push_str(m.as_str());
            last = m.end();
        }
        out.push_str(&self.substitute(&translation[last..]));
        out
    }

    fn substitute(&self, segment: &str) -> String {
        let mut text = segment.to_string();

        for &idx in &self.longest_first {
            let term = &self.terms[idx];
            let hits = bounded_matches(&self.patterns[idx], &term.source, &text);
            if hits.is_empty() {
                continue;
            }

            let mut next = String::with_capacity(text.len());
            let mut last = 0;
            for (start, end) in hits {
                next.push_str(&text[last..start]);
                next.push_str(&term.target);
                last = end;
            }
            next.push_str(&text[last..]);
            text = next;
        }

        text
    }

    /// Writes `entries` in glossary format, one `source: target` per line.
    pub fn write(path: &Path, header: &str, entries: &[GlossaryTerm]) -> Result<()> {
        let mut out = String::new();
        for line in header.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        for e in entries {
            out.push_str(&format!("{}: {}\n", e.source, e.target));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(path, out).map_err(|e| Error::io(path, e))
    }
}
