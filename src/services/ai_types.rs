use serde::{Deserialize, Serialize};

use crate::model::entry::TranslationItem;

/// A batch the API never answered usefully. Its items come back as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    /// 1-based batch number.
    pub batch: usize,
    pub items: usize,
    pub error: String,
}

/// Result of a fan-out: one slot per input item, in input order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translations: Vec<Option<String>>,
    pub failures: Vec<BatchFailure>,
}

impl TranslationOutcome {
    pub fn succeeded(&self) -> usize {
        self.translations.iter().filter(|t| t.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.translations.len() - self.succeeded()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    /// Keys written that the target file did not have.
    pub added: usize,
    /// Existing target values replaced.
    pub updated: usize,
    /// Source keys left as they were.
    pub kept: usize,
    /// Items still pending after the run (API failure or rejected reply).
    pub failed: usize,
    /// Served from the translation memory instead of the API.
    pub from_memory: usize,
    /// The target file did not exist before the run.
    pub created: bool,
    /// Items that needed the API while no API key was configured. Also
    /// counted in `failed`.
    #[serde(default)]
    pub unsent: usize,
    /// Dry runs only: the items a real run would work on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<TranslationItem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn added(&self) -> usize {
        self.files.iter().map(|f| f.added).sum()
    }

    pub fn updated(&self) -> usize {
        self.files.iter().map(|f| f.updated).sum()
    }

    pub fn kept(&self) -> usize {
        self.files.iter().map(|f| f.kept).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(|f| f.failed).sum()
    }

    pub fn from_memory(&self) -> usize {
        self.files.iter().map(|f| f.from_memory).sum()
    }

    pub fn unsent(&self) -> usize {
        self.files.iter().map(|f| f.unsent).sum()
    }

    pub fn created(&self) -> usize {
        self.files.iter().filter(|f| f.created).count()
    }
}
