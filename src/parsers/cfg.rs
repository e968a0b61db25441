//! Factorio locale `.cfg` files.
//!
//! The document keeps every source line and its line terminator so that
//! rendering an unmodified file reproduces it exactly. Edits touch only the
//! lines they rewrite or insert; inserted lines use the file's dominant
//! terminator.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

/// Section name for entries that appear before the first header.
pub const ROOT_SECTION: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEntry {
    pub indent: String,
    pub commented: bool,
    pub key: String,
    pub value: String,
    /// Source text of an unmodified line.
    raw: Option<String>,
}

impl CfgEntry {
    fn render(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        format!(
            "{}{}{}={}",
            self.indent,
            if self.commented { "##" } else { "" },
            self.key,
            self.value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgLine {
    Blank(String),
    Comment(String),
    Section { raw: String, name: String },
    Entry(CfgEntry),
    Other(String),
}

impl CfgLine {
    fn is_blank(&self) -> bool {
        matches!(self, CfgLine::Blank(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Updated,
    Inserted,
}

#[derive(Debug, Clone)]
pub struct CfgDocument {
    lines: Vec<CfgLine>,
    /// Per line: terminated by `\r\n` rather than `\n`.
    crlf_lines: Vec<bool>,
    /// More `\r\n` than bare `\n` terminators in the input.
    crlf: bool,
    trailing_newline: bool,
    index: HashMap<(String, String), usize>,
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").expect("static regex"))
}

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<indent>\s*)(?P<key>[^=]+)=(?P<value>.*)$").expect("static regex"))
}

fn parse_line(line: &str) -> CfgLine {
    let logical = line.trim();

    if logical.is_empty() {
        return CfgLine::Blank(line.to_string());
    }

    if let Some(caps) = section_re().captures(line) {
        return CfgLine::Section {
            raw: line.to_string(),
            name: caps[1].trim().to_string(),
        };
    }

    if let Some(rest) = logical.strip_prefix("##") {
        if let Some(caps) = entry_re().captures(rest.trim_start()) {
            let key = caps["key"].trim();
            if !key.is_empty() {
                let indent_len = line.len() - line.trim_start().len();
                return CfgLine::Entry(CfgEntry {
                    indent: line[..indent_len].to_string(),
                    commented: true,
                    key: key.to_string(),
                    value: caps["value"].trim().to_string(),
                    raw: Some(line.to_string()),
                });
            }
        }
    }

    if logical.starts_with(';') || logical.starts_with('#') {
        return CfgLine::Comment(line.to_string());
    }

    if let Some(caps) = entry_re().captures(line) {
        let key = caps["key"].trim();
        if !key.is_empty() {
            return CfgLine::Entry(CfgEntry {
                indent: caps["indent"].to_string(),
                commented: false,
                key: key.to_string(),
                value: caps["value"].trim().to_string(),
                raw: Some(line.to_string()),
            });
        }
    }

    CfgLine::Other(line.to_string())
}

impl CfgDocument {
    pub fn parse(text: &str) -> CfgDocument {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);

        let raw_lines: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        };

        let terminated = if trailing_newline {
            raw_lines.len()
        } else {
            raw_lines.len().saturating_sub(1)
        };
        let crlf_count = raw_lines[..terminated]
            .iter()
            .filter(|l| l.ends_with('\r'))
            .count();
        let crlf = crlf_count * 2 > terminated;

        let mut lines = Vec::with_capacity(raw_lines.len());
        let mut crlf_lines = Vec::with_capacity(raw_lines.len());
        for (i, raw) in raw_lines.iter().enumerate() {
            let (line, cr) = match raw.strip_suffix('\r') {
                Some(l) if i < terminated => (l, true),
                _ => (*raw, i >= terminated && crlf),
            };
            lines.push(parse_line(line));
            crlf_lines.push(cr);
        }

        let mut doc = CfgDocument {
            lines,
            crlf_lines,
            crlf,
            trailing_newline,
            index: HashMap::new(),
        };
        doc.reindex();
        doc
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);

        for (i, (line, &cr)) in self.lines.iter().zip(&self.crlf_lines).enumerate() {
            match line {
                CfgLine::Blank(raw)
                | CfgLine::Comment(raw)
                | CfgLine::Other(raw)
                | CfgLine::Section { raw, .. } => out.push_str(raw),
                CfgLine::Entry(e) => out.push_str(&e.render()),
            }
            if i < last || self.trailing_newline {
                out.push_str(if cr { "\r\n" } else { "\n" });
            }
        }
        out
    }

    fn insert_line(&mut self, at: usize, line: CfgLine) {
        self.lines.insert(at, line);
        self.crlf_lines.insert(at, self.crlf);
    }

    fn push_line(&mut self, line: CfgLine) {
        self.insert_line(self.lines.len(), line);
    }

    fn reindex(&mut self) {
        self.index.clear();
        let mut section = ROOT_SECTION.to_string();
        for (i, line) in self.lines.iter().enumerate() {
            match line {
                CfgLine::Section { name, .. } => section = name.clone(),
                CfgLine::Entry(e) => {
                    self.index.insert((section.clone(), e.key.clone()), i);
                }
                _ => {}
            }
        }
    }

    /// Every entry line in file order, paired with its section. Duplicate
    /// keys are yielded once per occurrence.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CfgEntry)> + '_ {
        let mut section = ROOT_SECTION;
        self.lines.iter().filter_map(move |line| match line {
            CfgLine::Section { name, .. } => {
                section = name.as_str();
                None
            }
            CfgLine::Entry(e) => Some((section, e)),
            _ => None,
        })
    }

    /// Distinct `(section, key)` pairs in order of first appearance, with
    /// the entry that wins (the last occurrence).
    pub fn unique_entries(&self) -> Vec<(&str, &CfgEntry)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (section, e) in self.entries() {
            if seen.insert((section, e.key.as_str())) {
                if let Some(last) = self.get(section, &e.key) {
                    out.push((section, last));
                }
            }
        }
        out
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&CfgEntry> {
        let idx = self.index.get(&(section.to_string(), key.to_string()))?;
        match &self.lines[*idx] {
            CfgLine::Entry(e) => Some(e),
            _ => None,
        }
    }

    /// 1-based line number of the winning entry.
    pub fn line_of(&self, section: &str, key: &str) -> Option<usize> {
        self.index
            .get(&(section.to_string(), key.to_string()))
            .map(|i| i + 1)
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str, commented: bool) -> SetOutcome {
        if let Some(&idx) = self.index.get(&(section.to_string(), key.to_string())) {
            if let CfgLine::Entry(e) = &mut self.lines[idx] {
                e.value = value.to_string();
                e.raw = None;
            }
            return SetOutcome::Updated;
        }

        let entry = CfgEntry {
            indent: String::new(),
            commented,
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        };

        if self.lines.is_empty() {
            self.trailing_newline = true;
        }

        if section == ROOT_SECTION {
            let end = self
                .lines
                .iter()
                .position(|l| matches!(l, CfgLine::Section { .. }))
                .unwrap_or(self.lines.len());
            self.insert_into_block(0, end, entry);
        } else if let Some(start) = self.last_header_of(section) {
            let end = self.lines[start + 1..]
                .iter()
                .position(|l| matches!(l, CfgLine::Section { .. }))
                .map(|p| start + 1 + p)
                .unwrap_or(self.lines.len());
            self.insert_into_block(start + 1, end, entry);
        } else {
            if self.lines.last().is_some_and(|l| !l.is_blank()) {
                self.push_line(CfgLine::Blank(String::new()));
            }
            self.push_line(CfgLine::Section {
                raw: format!("[{section}]"),
                name: section.to_string(),
            });
            self.push_line(CfgLine::Entry(entry));
            self.trailing_newline = true;
        }

        self.reindex();
        SetOutcome::Inserted
    }

    fn last_header_of(&self, section: &str) -> Option<usize> {
        self.lines
            .iter()
            .rposition(|l| matches!(l, CfgLine::Section { name, .. } if name == section))
    }

    /// Inserts after the last entry in `[start, end)`, else after its last
    /// non-blank line, else at `start`.
    fn insert_into_block(&mut self, start: usize, end: usize, mut entry: CfgEntry) {
        let block = &self.lines[start..end];

        let last_entry = block.iter().rposition(|l| matches!(l, CfgLine::Entry(_)));
        if let Some(CfgLine::Entry(last)) = last_entry.map(|p| &block[p]) {
            entry.indent = last.indent.clone();
        }

        let at = last_entry
            .or_else(|| block.iter().rposition(|l| !l.is_blank()))
            .map(|p| start + p + 1)
            .unwrap_or(start);

        self.insert_line(at, CfgLine::Entry(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[item-name]
iron-gear=Iron gear
  steel-beam=Steel beam
##old-thing=Old thing

; comment line
[item-description]
iron-gear=Used in __1__ recipes [item=iron-plate]
";

    #[test]
    fn render_round_trips_unmodified_input() {
        let doc = CfgDocument::parse(SAMPLE);
        assert_eq!(doc.render(), SAMPLE);

        let crlf = SAMPLE.replace('\n', "\r\n");
        assert_eq!(CfgDocument::parse(&crlf).render(), crlf);

        let no_trailing = SAMPLE.trim_end();
        assert_eq!(CfgDocument::parse(no_trailing).render(), no_trailing);
    }

    #[test]
    fn mixed_line_endings_are_kept_per_line() {
        let mixed = "[a]\r\nk=v\nx=y\n";
        assert_eq!(CfgDocument::parse(mixed).render(), mixed);

        let mut doc = CfgDocument::parse(mixed);
        doc.set("a", "k", "值", false);
        doc.set("a", "z", "新", false);
        assert_eq!(doc.render(), "[a]\r\nk=值\nx=y\nz=新\n");

        let mut doc = CfgDocument::parse("[a]\r\nk=v\r\nx=y\n");
        doc.set("b", "n", "m", false);
        assert_eq!(doc.render(), "[a]\r\nk=v\r\nx=y\n\r\n[b]\r\nn=m\r\n");

        let mut doc = CfgDocument::parse("[a]\r\nk=v");
        doc.set("a", "z", "w", false);
        assert_eq!(doc.render(), "[a]\r\nk=v\r\nz=w");
    }

    #[test]
    fn parses_sections_keys_and_commented_entries() {
        let doc = CfgDocument::parse(SAMPLE);
        assert_eq!(doc.entry_count(), 4);

        let gear = doc.get("item-name", "iron-gear").unwrap();
        assert_eq!(gear.value, "Iron gear");
        assert!(!gear.commented);

        let beam = doc.get("item-name", "steel-beam").unwrap();
        assert_eq!(beam.indent, "  ");

        let old = doc.get("item-name", "old-thing").unwrap();
        assert!(old.commented);
        assert_eq!(old.value, "Old thing");

        assert_eq!(
            doc.get("item-description", "iron-gear").unwrap().value,
            "Used in __1__ recipes [item=iron-plate]"
        );
        assert_eq!(doc.line_of("item-description", "iron-gear"), Some(8));
    }

    #[test]
    fn keys_before_first_header_use_root_section() {
        let doc = CfgDocument::parse("title=My mod\n[a]\nb=c\n");
        assert_eq!(doc.get(ROOT_SECTION, "title").unwrap().value, "My mod");
        assert_eq!(doc.get("a", "b").unwrap().value, "c");
    }

    #[test]
    fn last_duplicate_wins() {
        let doc = CfgDocument::parse("[a]\nk=first\nk=second\n");
        assert_eq!(doc.get("a", "k").unwrap().value, "second");
        assert_eq!(doc.entries().count(), 2);
        let unique = doc.unique_entries();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].1.value, "second");
    }

    #[test]
    fn bom_is_dropped() {
        let doc = CfgDocument::parse("\u{feff}[a]\nk=v\n");
        assert_eq!(doc.render(), "[a]\nk=v\n");
    }

    #[test]
    fn set_existing_rewrites_in_place_keeping_comment_flag() {
        let mut doc = CfgDocument::parse(SAMPLE);
        assert_eq!(doc.set("item-name", "old-thing", "旧物", false), SetOutcome::Updated);
        assert_eq!(doc.set("item-name", "steel-beam", "钢梁", false), SetOutcome::Updated);

        let out = doc.render();
        assert!(out.contains("##old-thing=旧物\n"));
        assert!(out.contains("  steel-beam=钢梁\n"));
        assert_eq!(out.lines().count(), SAMPLE.lines().count());
    }

    #[test]
    fn set_missing_key_inserts_at_end_of_section() {
        let mut doc = CfgDocument::parse(SAMPLE);
        assert_eq!(doc.set("item-name", "copper-cable", "铜线", false), SetOutcome::Inserted);

        let out = doc.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[3], "##old-thing=Old thing");
        assert_eq!(lines[4], "copper-cable=铜线");
        assert_eq!(lines[5], "");
        assert_eq!(doc.get("item-name", "copper-cable").unwrap().value, "铜线");
        assert_eq!(doc.line_of("item-description", "iron-gear"), Some(9));
    }

    #[test]
    fn set_missing_section_appends_block() {
        let mut doc = CfgDocument::parse("[a]\nk=v");
        doc.set("b", "x", "y", true);
        assert_eq!(doc.render(), "[a]\nk=v\n\n[b]\n##x=y\n");
    }

    #[test]
    fn set_missing_root_key_goes_before_first_header() {
        let mut doc = CfgDocument::parse("[a]\nk=v\n");
        doc.set(ROOT_SECTION, "title", "标题", false);
        assert_eq!(doc.render(), "title=标题\n[a]\nk=v\n");
    }

    #[test]
    fn loose_spacing_survives_until_edited() {
        let text = "[a]\n  key = Some value  \n## off = Disabled\n";
        let mut doc = CfgDocument::parse(text);
        assert_eq!(doc.render(), text);
        assert_eq!(doc.get("a", "key").unwrap().value, "Some value");
        assert_eq!(doc.get("a", "off").unwrap().value, "Disabled");

        doc.set("a", "key", "某个值", false);
        assert_eq!(doc.render(), "[a]\n  key=某个值\n## off = Disabled\n");
    }

    #[test]
    fn insert_into_empty_document() {
        let mut doc = CfgDocument::parse("");
        doc.set("a", "k", "v", false);
        assert_eq!(doc.render(), "[a]\nk=v\n");
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let doc = CfgDocument::parse("[a]\nk=x = y\n");
        assert_eq!(doc.get("a", "k").unwrap().value, "x = y");
    }

    #[test]
    fn non_entry_lines_are_preserved() {
        let text = "[a]\njust some text\n# note\n";
        let doc = CfgDocument::parse(text);
        assert_eq!(doc.entry_count(), 0);
        assert_eq!(doc.render(), text);
    }
}
