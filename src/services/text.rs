//! Text heuristics for locale values: language sniffing, placeholders and
//! rich-text tags.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::entry::PendingReason;

const ENGLISH_PUNCT: &str = " .,!?:;-_'\"()[]{}<>/\\|=+&%$#@";

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__[A-Za-z0-9_]+__").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]+\]").expect("static regex"))
}

/// Matches both `[...]` tags and `__X__` placeholders, which must never be
/// translated or rewritten.
pub fn protected_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]+\]|__[A-Za-z0-9_]+__").expect("static regex"))
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

pub fn is_english_text(text: &str) -> bool {
    if text.trim().is_empty() || text.chars().any(is_cjk) {
        return false;
    }
    if !text.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    let mut latin = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if matches!(c, '\n' | '\t' | '\r') {
            continue;
        }
        if c.is_ascii_alphanumeric() || ENGLISH_PUNCT.contains(c) {
            latin += 1;
        }
        total += 1;
    }

    total > 0 && latin * 10 >= total * 7
}

pub fn variables(text: &str) -> Vec<&str> {
    variable_re().find_iter(text).map(|m| m.as_str()).collect()
}

pub fn markup_tags(text: &str) -> Vec<&str> {
    tag_re().find_iter(text).map(|m| m.as_str()).collect()
}

/// Placeholders of `source` that `target` does not contain.
pub fn missing_variables<'a>(source: &'a str, target: &str) -> Vec<&'a str> {
    let mut missing: Vec<&str> = variables(source)
        .into_iter()
        .filter(|v| !target.contains(v))
        .collect();
    missing.dedup();
    missing
}

/// Something besides tags, placeholders, digits and punctuation is left.
pub fn has_translatable_text(text: &str) -> bool {
    protected_re()
        .replace_all(text, " ")
        .chars()
        .any(|c| c.is_ascii_alphabetic())
}

/// `None` when the target value is fine as it is.
pub fn pending_reason(source: &str, target: Option<&str>) -> Option<PendingReason> {
    let target = match target {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Some(PendingReason::Missing),
    };

    if is_english_text(target) {
        return Some(PendingReason::Untranslated);
    }

    if !missing_variables(source, target).is_empty() {
        return Some(PendingReason::MissingVariable);
    }

    None
}
