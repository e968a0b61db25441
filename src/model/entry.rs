use serde::{Deserialize, Serialize};

/// One locale entry waiting for a translation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TranslationItem {
    pub section: String,
    pub key: String,

    /// Source-language value.
    pub source: String,

    /// Current value in the target file, if the key exists there.
    #[serde(default)]
    pub existing: Option<String>,

    /// The source line is a `##` disabled entry.
    #[serde(default)]
    pub commented: bool,

    /// 1-based line in the source file.
    #[serde(default)]
    pub line: usize,

    #[serde(default)]
    pub reason: PendingReason,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// Key absent from the target file, or present with an empty value.
    #[default]
    Missing,
    /// Target value is still source-language text.
    Untranslated,
    /// Target value lost a `__X__` placeholder.
    MissingVariable,
}

impl PendingReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingReason::Missing => "missing",
            PendingReason::Untranslated => "untranslated",
            PendingReason::MissingVariable => "missing-variable",
        }
    }
}

impl TranslationItem {
    /// Ad-hoc item for text that does not come from a locale file.
    pub fn standalone(section: &str, text: &str) -> Self {
        TranslationItem {
            section: section.to_string(),
            key: text.to_string(),
            source: text.to_string(),
            existing: None,
            commented: false,
            line: 0,
            reason: PendingReason::Missing,
        }
    }
}
