use crate::error::Result;
use crate::parsers::cfg::CfgDocument;
use crate::services::{encoding, pipeline, text};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingFile,
    EmptyFile,
    NonUtf8File,
    MissingKey,
    EmptyTranslation,
    Untranslated,
    MissingVariable,
    TagMismatch,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::MissingFile => "MISSING_FILE",
            IssueCode::EmptyFile => "EMPTY_FILE",
            IssueCode::NonUtf8File => "NON_UTF8_FILE",
            IssueCode::MissingKey => "MISSING_KEY",
            IssueCode::EmptyTranslation => "EMPTY_TRANSLATION",
            IssueCode::Untranslated => "UNTRANSLATED",
            IssueCode::MissingVariable => "MISSING_VARIABLE",
            IssueCode::TagMismatch => "TAG_MISMATCH",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaIssue {
    pub file: String,
    /// Empty for file-level issues.
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub key: String,
    pub code: IssueCode,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QaReport {
    pub files_checked: usize,
    pub issues: Vec<QaIssue>,
}

impl QaReport {
    pub fn counts(&self) -> BTreeMap<IssueCode, usize> {
        let mut out = BTreeMap::new();
        for i in &self.issues {
            *out.entry(i.code).or_insert(0) += 1;
        }
        out
    }
}

fn file_issue(file: &str, code: IssueCode, message: String) -> QaIssue {
    QaIssue {
        file: file.to_string(),
        section: String::new(),
        key: String::new(),
        code,
        message,
    }
}

fn sorted_tags(s: &str) -> Vec<&str> {
    let mut tags = text::markup_tags(s);
    tags.sort_unstable();
    tags
}

/// Compares every source key against its target value.
pub fn check_entries(file: &str, source: &CfgDocument, target: &CfgDocument) -> Vec<QaIssue> {
    let mut issues = Vec::new();

    for (section, entry) in source.unique_entries() {
        let issue = |code: IssueCode, message: String| QaIssue {
            file: file.to_string(),
            section: section.to_string(),
            key: entry.key.clone(),
            code,
            message,
        };

        let Some(t) = target.get(section, &entry.key) else {
            issues.push(issue(IssueCode::MissingKey, "key missing from target file".into()));
            continue;
        };

        let value = t.value.trim();
        if value.is_empty() {
            if !entry.value.trim().is_empty() {
                issues.push(issue(IssueCode::EmptyTranslation, "translation is empty".into()));
            }
            continue;
        }

        if text::has_translatable_text(&entry.value) && text::is_english_text(value) {
            issues.push(issue(
                IssueCode::Untranslated,
                format!("still English: {value}"),
            ));
            continue;
        }

        let missing = text::missing_variables(&entry.value, value);
        if !missing.is_empty() {
            issues.push(issue(
                IssueCode::MissingVariable,
                format!("missing {}", missing.join(", ")),
            ));
        }

        let (src_tags, dst_tags) = (sorted_tags(&entry.value), sorted_tags(value));
        if src_tags != dst_tags {
            issues.push(issue(
                IssueCode::TagMismatch,
                format!("tags {:?} became {:?}", src_tags, dst_tags),
            ));
        }
    }

    issues
}

pub fn check_file(source_path: &Path, target_path: &Path) -> Result<Vec<QaIssue>> {
    let file = target_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let detected = encoding::detect_from_file(source_path)?;
    if !detected.best.starts_with("utf-8") {
        tracing::warn!(
            "{} looks like {} (confidence {:.2}), not UTF-8",
            source_path.display(),
            detected.best,
            detected.confidence
        );
    }

    if !target_path.exists() {
        return Ok(vec![file_issue(
            &file,
            IssueCode::MissingFile,
            format!("{} has no translation file", source_path.display()),
        )]);
    }

    let mut issues = Vec::new();

    let decoded = encoding::read_text(target_path)?;
    if !decoded.is_utf8() {
        issues.push(file_issue(
            &file,
            IssueCode::NonUtf8File,
            format!("file is encoded as {}, Factorio expects UTF-8", decoded.encoding),
        ));
    }

    let target = CfgDocument::parse(&decoded.text);
    if target.entry_count() == 0 {
        issues.push(file_issue(&file, IssueCode::EmptyFile, "file has no entries".into()));
        return Ok(issues);
    }

    let source = pipeline::read_cfg(source_path)?;
    issues.extend(check_entries(&file, &source, &target));
    Ok(issues)
}

pub fn check_dir(source_dir: &Path, target_dir: &Path, locales: (&str, &str)) -> Result<QaReport> {
    let mut report = QaReport::default();

    for source in pipeline::cfg_files(source_dir)? {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = target_dir.join(pipeline::target_file_name(&name, locales.0, locales.1));

        report.issues.extend(check_file(&source, &target)?);
        report.files_checked += 1;
    }

    Ok(report)
}
