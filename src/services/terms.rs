//! Glossary candidate extraction from source-locale values.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::model::entry::TranslationItem;
use crate::services::ai::AiTranslator;
use crate::services::glossary::{Glossary, GlossaryTerm};
use crate::services::pipeline::{cfg_files, read_cfg};
use crate::services::text::protected_re;

pub const DEFAULT_MIN_FREQUENCY: usize = 5;

/// Section name sent with term translation requests.
const TERMS_SECTION: &str = "terms";

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "again", "against", "all", "along", "also",
    "although", "am", "among", "an", "and", "any", "are", "around", "as", "at", "be",
    "because", "been", "before", "behind", "being", "below", "beneath", "beside", "between",
    "beyond", "both", "but", "by", "can", "could", "dare", "did", "do", "does", "down",
    "during", "each", "even", "except", "few", "for", "from", "further", "had", "has",
    "have", "he", "her", "here", "hers", "him", "his", "how", "if", "in", "inside", "into",
    "is", "it", "its", "just", "may", "me", "might", "mine", "more", "most", "must", "my",
    "need", "no", "nor", "not", "now", "of", "on", "once", "only", "or", "other", "ought",
    "our", "ours", "out", "outside", "over", "own", "s", "same", "shall", "she", "should",
    "since", "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them",
    "then", "there", "these", "they", "this", "those", "though", "through", "throughout",
    "to", "too", "toward", "under", "underneath", "unless", "until", "up", "upon", "us",
    "used", "very", "was", "we", "were", "what", "when", "where", "whereas", "whether",
    "which", "while", "who", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "you", "your",
];

/// Words with an obvious translation in a factory game; not worth a
/// glossary line on their own.
const COMMON_TERMS: &[&str] = &[
    // resources
    "energy", "power", "fuel", "water", "oil", "gas", "coal", "stone", "iron", "copper",
    "steel", "uranium", "gold", "lead", "carbon", "sulfur", "lithium", "neodymium",
    "aluminum", "titanium",
    // qualities
    "age", "time", "speed", "heat", "cold", "light", "dark", "new", "old", "big", "small",
    "large", "heavy", "fast", "slow", "high", "low", "hot", "warm", "cool", "dry", "wet",
    "hard", "soft", "strong", "weak",
    // research
    "tech", "science", "research", "data", "technology", "advanced", "basic", "simple",
    "complex", "efficient", "efficiency", "productivity", "quality",
    // mechanics
    "game", "player", "level", "score", "point", "value", "count", "total", "amount",
    "number", "rate", "ratio", "percent", "percentage", "max", "min", "average", "normal",
    "standard", "special", "unique", "rare", "common",
    // physics
    "mass", "weight", "volume", "density", "pressure", "temperature", "force", "velocity",
    "acceleration", "gravity", "chemical", "physical", "atomic", "nuclear", "fusion",
    "fission",
    // logic
    "logic", "signal", "circuit", "network", "system", "matrix", "vector", "scalar",
    "tensor", "function", "variable", "constant", "parameter",
    // directions
    "north", "south", "east", "west", "left", "right", "front", "back", "top", "bottom",
    "center", "middle", "edge", "corner",
    // colours
    "red", "green", "blue", "yellow", "black", "white", "gray", "brown", "orange", "purple",
    "pink", "cyan", "magenta",
    // time
    "second", "minute", "hour", "day", "week", "month", "year",
    // units
    "meter", "kilometer", "centimeter", "millimeter", "gram", "kilogram", "liter",
    "milliliter", "watt", "kilowatt", "megawatt", "gigawatt", "volt", "ampere", "ohm",
    "hertz", "joule", "calorie",
    // buildings and parts
    "ore", "ingot", "plate", "rod", "wire", "cable", "pipe", "tank", "container", "belt",
    "inserter", "assembler", "furnace", "reactor", "generator", "turbine", "drill", "miner",
    "pump", "valve", "filter", "mixer", "separator",
];

const MEANINGLESS_PHRASES: &[&str] = &[
    "new one", "one new", "you can", "can you", "you will", "will you", "you have",
    "have you", "you are", "are you", "you were", "were you", "you should", "should you",
    "you could", "could you", "you would", "would you", "you may", "may you", "you might",
    "might you", "you must", "must you", "you need", "need you", "you want", "want you",
];

fn word_set(
    words: &'static [&'static str],
    cell: &'static OnceLock<HashSet<&'static str>>,
) -> &'static HashSet<&'static str> {
    cell.get_or_init(|| words.iter().copied().collect())
}

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    word_set(STOP_WORDS, &SET)
}

fn common_terms() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    word_set(COMMON_TERMS, &SET)
}

fn meaningless_phrases() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    word_set(MEANINGLESS_PHRASES, &SET)
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s\-]").expect("static regex"))
}

fn mixed_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[A-Za-z]+\d+|\d+[A-Za-z]+)$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

/// Drops tags, placeholders, markup and punctuation other than `-`.
pub fn clean_text(text: &str) -> String {
    let s = protected_re().replace_all(text, " ");
    let s = html_tag_re().replace_all(&s, " ");
    let s = punct_re().replace_all(&s, " ");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_meaningful_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    if stop_words().contains(lower.as_str()) || common_terms().contains(lower.as_str()) {
        return false;
    }
    if word.chars().count() < 2 || word.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if word.chars().any(|c| c.is_ascii_digit()) {
        return mixed_digits_re().is_match(word);
    }
    true
}

pub fn is_meaningful_phrase(phrase: &str) -> bool {
    phrase.split(' ').all(is_meaningful_word)
        && !meaningless_phrases().contains(phrase.to_lowercase().as_str())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// Candidate terms of one value: 2- and 3-word phrases of adjacent
/// meaningful words, then the meaningful words no kept phrase contains.
pub fn extract_terms(value: &str) -> Vec<String> {
    let cleaned = clean_text(value);

    let mut runs: Vec<Vec<&str>> = vec![Vec::new()];
    for w in cleaned.split(' ').filter(|w| !w.is_empty()) {
        if is_meaningful_word(w) {
            if let Some(run) = runs.last_mut() {
                run.push(w);
            }
        } else if runs.last().is_some_and(|r| !r.is_empty()) {
            runs.push(Vec::new());
        }
    }

    let mut phrases: Vec<String> = Vec::new();
    for run in &runs {
        for i in 0..run.len() {
            for n in [2, 3] {
                if i + n <= run.len() {
                    let phrase = run[i..i + n].join(" ");
                    if is_meaningful_phrase(&phrase) {
                        phrases.push(phrase);
                    }
                }
            }
        }
    }
    phrases.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut terms: Vec<String> = Vec::new();
    for phrase in phrases {
        let nested = terms.iter().any(|t| t != &phrase && t.contains(phrase.as_str()));
        if !nested {
            terms.push(phrase);
        }
    }

    let phrase_count = terms.len();
    for w in runs.iter().flatten() {
        if !terms[..phrase_count].iter().any(|p| contains_word(p, w)) {
            terms.push(w.to_string());
        }
    }

    terms
}

/// Term frequencies over all `values`, at least `min_frequency`, most
/// frequent first.
pub fn analyze<'a, I>(values: I, min_frequency: usize) -> Vec<TermCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        for term in extract_terms(value) {
            *counts.entry(term).or_default() += 1;
        }
    }

    let mut out: Vec<TermCount> = counts
        .into_iter()
        .filter(|(_, c)| *c >= min_frequency)
        .map(|(term, count)| TermCount { term, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    out
}

/// Every non-empty value of the `*.cfg` files in `dir`.
pub fn collect_values(dir: &Path) -> Result<Vec<String>> {
    let mut values = Vec::new();
    for file in cfg_files(dir)? {
        let doc = read_cfg(&file)?;
        values.extend(
            doc.entries()
                .map(|(_, e)| e.value.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        );
    }
    tracing::info!("{} values collected from {}", values.len(), dir.display());
    Ok(values)
}

/// Asks the API for translations of the candidates the glossary does not
/// know yet. Terms the API could not translate are left out.
pub fn translate_candidates(
    translator: &AiTranslator,
    candidates: &[TermCount],
    glossary: &Glossary,
) -> Vec<GlossaryTerm> {
    let items: Vec<TranslationItem> = candidates
        .iter()
        .filter(|c| !glossary.contains(&c.term))
        .map(|c| TranslationItem::standalone(TERMS_SECTION, &c.term))
        .collect();

    if items.is_empty() {
        return Vec::new();
    }

    let outcome = translator.translate_items(&items, glossary);
    if outcome.failed() > 0 {
        tracing::warn!("{} terms could not be translated", outcome.failed());
    }

    items
        .into_iter()
        .zip(outcome.translations)
        .filter_map(|(item, t)| {
            t.map(|target| GlossaryTerm {
                source: item.source,
                target,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_strips_markup_and_punctuation() {
        assert_eq!(
            clean_text("[color=red]Hot[/color] __1__ <b>steam-engine</b>, ready!"),
            "Hot steam-engine ready"
        );
    }

    #[test]
    fn word_filters() {
        assert!(is_meaningful_word("coolant"));
        assert!(is_meaningful_word("MK3"));
        assert!(is_meaningful_word("3D"));
        assert!(!is_meaningful_word("The"));
        assert!(!is_meaningful_word("Iron"));
        assert!(!is_meaningful_word("1000"));
        assert!(!is_meaningful_word("x"));
        assert!(!is_meaningful_word("a1b"));
        assert!(!is_meaningful_phrase("coolant the"));
        assert!(is_meaningful_phrase("liquid coolant"));
    }

    #[test]
    fn phrases_absorb_their_words() {
        assert_eq!(
            extract_terms("Cools the liquid coolant reservoir"),
            vec!["liquid coolant reservoir", "Cools"]
        );
    }

    #[test]
    fn phrases_do_not_span_filtered_words() {
        assert_eq!(extract_terms("Alien artifact of doom"), vec!["Alien artifact", "doom"]);
    }

    #[test]
    fn frequency_threshold_and_order() {
        // "tank" and "heat" are common terms and never counted.
        let values = [
            "Liquid coolant",
            "Liquid coolant tank",
            "Liquid coolant",
            "Heat exchanger",
            "Heat exchanger",
        ];
        let counts = analyze(values, 2);
        assert_eq!(
            counts,
            vec![
                TermCount { term: "Liquid coolant".into(), count: 3 },
                TermCount { term: "exchanger".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn collects_values_from_cfg_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cfg"), "[s]\nk=One\n##c=Two\nempty=\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "k=ignored\n").unwrap();
        assert_eq!(collect_values(dir.path()).unwrap(), vec!["One", "Two"]);
    }
}
