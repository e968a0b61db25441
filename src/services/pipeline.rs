//! The `translate` run: locale file pairs in, localized files out.

use crate::error::{Error, Result};
use crate::model::entry::TranslationItem;
use crate::parsers::cfg::CfgDocument;
use crate::services::{
    ai::AiTranslator,
    ai_types::{FileReport, RunReport},
    encoding,
    glossary::Glossary,
    text,
    translation_memory::TranslationMemory,
};

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub struct TranslateContext<'a> {
    /// `None` when no API key is configured; files that need the API then fail.
    pub translator: Option<&'a AiTranslator>,
    pub glossary: &'a Glossary,
    pub memory: &'a mut TranslationMemory,
    pub backup: bool,
    pub dry_run: bool,
}

/// What a run would do to one file pair.
#[derive(Debug)]
pub struct FilePlan {
    pub source: CfgDocument,
    /// The current target document, or a copy of the source when the
    /// target file does not exist yet.
    pub target: CfgDocument,
    pub target_existed: bool,
    pub items: Vec<TranslationItem>,
}

/// `lang_en.cfg` -> `lang_zh-CN.cfg`; other names are kept.
pub fn target_file_name(name: &str, source_locale: &str, target_locale: &str) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s, Some(e)),
        None => (name, None),
    };

    let suffix = format!("_{source_locale}");
    let stem = match stem.strip_suffix(&suffix) {
        Some(base) if !base.is_empty() => format!("{base}_{target_locale}"),
        _ => stem.to_string(),
    };

    match ext {
        Some(e) => format!("{stem}.{e}"),
        None => stem,
    }
}

pub fn read_cfg(path: &Path) -> Result<CfgDocument> {
    let decoded = encoding::read_text(path)?;
    if !decoded.is_utf8() {
        tracing::info!("{} read as {}", path.display(), decoded.encoding);
    } else if decoded.had_bom {
        tracing::debug!("{}: UTF-8 byte order mark dropped", path.display());
    }
    Ok(CfgDocument::parse(&decoded.text))
}

pub fn write_cfg(path: &Path, doc: &CfgDocument) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(path, doc.render()).map_err(|e| Error::io(path, e))
}

/// Source entries whose target value is missing, still English, or lost a
/// placeholder, in source order. Values with nothing to translate are
/// skipped.
pub fn collect_pending(source: &CfgDocument, target: &CfgDocument) -> Vec<TranslationItem> {
    source
        .unique_entries()
        .into_iter()
        .filter(|(_, e)| text::has_translatable_text(&e.value))
        .filter_map(|(section, e)| {
            let existing = target.get(section, &e.key).map(|t| t.value.clone());
            let reason = text::pending_reason(&e.value, existing.as_deref())?;
            Some(TranslationItem {
                section: section.to_string(),
                key: e.key.clone(),
                source: e.value.clone(),
                existing,
                commented: e.commented,
                line: source.line_of(section, &e.key).unwrap_or(0),
                reason,
            })
        })
        .collect()
}

pub fn plan_file(source_path: &Path, target_path: &Path) -> Result<FilePlan> {
    let source = read_cfg(source_path)?;
    let target_existed = target_path.exists();
    let target = if target_existed {
        read_cfg(target_path)?
    } else {
        source.clone()
    };
    let items = collect_pending(&source, &target);

    Ok(FilePlan {
        source,
        target,
        target_existed,
        items,
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

/// Translates one file pair. Memory hits are written even without an API
/// key; the call then fails with [`Error::MissingApiKey`] once the file is
/// saved.
pub fn translate_file(
    source_path: &Path,
    target_path: &Path,
    ctx: &mut TranslateContext,
) -> Result<FileReport> {
    let report = run_file(source_path, target_path, ctx)?;
    if report.unsent > 0 {
        return Err(Error::MissingApiKey);
    }
    Ok(report)
}

fn run_file(
    source_path: &Path,
    target_path: &Path,
    ctx: &mut TranslateContext,
) -> Result<FileReport> {
    let plan = plan_file(source_path, target_path)?;
    let FilePlan {
        source,
        mut target,
        target_existed,
        items,
    } = plan;

    let mut report = FileReport {
        file: target_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        created: !target_existed,
        ..FileReport::default()
    };

    tracing::info!(
        "{}: {} of {} keys pending",
        source_path.display(),
        items.len(),
        source.entry_count()
    );

    if ctx.dry_run {
        report.failed = items.len();
        report.kept = source.entry_count() - items.len();
        report.pending = items;
        return Ok(report);
    }

    let mut resolved: Vec<Option<String>> = vec![None; items.len()];
    for (slot, item) in resolved.iter_mut().zip(&items) {
        if let Some(t) = ctx.memory.lookup(&item.source) {
            if text::missing_variables(&item.source, t).is_empty() {
                *slot = Some(t.to_string());
                report.from_memory += 1;
            }
        }
    }

    let api_items: Vec<TranslationItem> = items
        .iter()
        .zip(&resolved)
        .filter(|(_, r)| r.is_none())
        .map(|(i, _)| i.clone())
        .collect();

    match ctx.translator {
        _ if api_items.is_empty() => {}
        None => {
            tracing::warn!(
                "{}: {} items need the API but no key is configured",
                report.file,
                api_items.len()
            );
            report.unsent = api_items.len();
        }
        Some(translator) => {
            let outcome = translator.translate_items(&api_items, ctx.glossary);
            for f in &outcome.failures {
                tracing::warn!(
                    "{}: batch {} ({} items) failed: {}",
                    report.file,
                    f.batch,
                    f.items,
                    f.error
                );
            }

            let mut fresh = outcome.translations.into_iter();
            for slot in resolved.iter_mut().filter(|r| r.is_none()) {
                *slot = fresh.next().flatten();
            }
        }
    }

    let mut changed = false;
    for (item, translation) in items.iter().zip(resolved) {
        let Some(translation) = translation else {
            report.failed += 1;
            continue;
        };

        let translation = ctx.glossary.enforce(&translation);
        ctx.memory.record(&item.source, &translation);

        if target.get(&item.section, &item.key).map(|e| e.value.as_str()) == Some(translation.as_str()) {
            continue;
        }

        target.set(&item.section, &item.key, &translation, item.commented);
        changed = true;
        if target_existed && item.existing.is_some() {
            report.updated += 1;
        } else {
            report.added += 1;
        }
    }

    report.kept = source
        .entry_count()
        .saturating_sub(report.added + report.updated);

    if changed || !target_existed {
        if target_existed && ctx.backup {
            let backup = backup_path(target_path);
            fs::copy(target_path, &backup).map_err(|e| Error::io(&backup, e))?;
            tracing::debug!("backup written to {}", backup.display());
        }
        write_cfg(target_path, &target)?;
    }

    ctx.memory.save()?;

    tracing::info!(
        "{}: {} added, {} updated, {} kept, {} failed",
        report.file,
        report.added,
        report.updated,
        report.kept,
        report.failed
    );

    Ok(report)
}

/// `*.cfg` files directly inside `dir`, sorted by name.
pub fn cfg_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let is_cfg = entry
            .path()
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("cfg"));
        if entry.file_type().is_file() && is_cfg {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

pub fn translate_dir(
    source_dir: &Path,
    target_dir: &Path,
    locales: (&str, &str),
    only: Option<&str>,
    ctx: &mut TranslateContext,
) -> Result<RunReport> {
    if !source_dir.is_dir() {
        return Err(Error::InvalidMod(format!(
            "source locale directory {} not found",
            source_dir.display()
        )));
    }

    let files = match only {
        Some(name) => {
            let p = source_dir.join(name);
            if !p.is_file() {
                return Err(Error::Invalid(format!(
                    "{name} not found in {}",
                    source_dir.display()
                )));
            }
            vec![p]
        }
        None => cfg_files(source_dir)?,
    };

    if files.is_empty() {
        tracing::warn!("no .cfg files in {}", source_dir.display());
    }

    if !ctx.dry_run {
        fs::create_dir_all(target_dir).map_err(|e| Error::io(target_dir, e))?;
    }

    let mut report = RunReport::default();
    for source in files {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = target_dir.join(target_file_name(&name, locales.0, locales.1));
        report.files.push(run_file(&source, &target, ctx)?);
    }

    let unsent = report.unsent();
    if unsent > 0 {
        tracing::error!(
            "{} memory hits applied, {unsent} items left for the API",
            report.from_memory()
        );
        return Err(Error::MissingApiKey);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, TranslationConfig};
    use httpmock::prelude::*;
    use serde_json::json;

    const SOURCE: &str = "\
[item-name]
iron-gear=Iron gear wheel
steel-beam=Steel beam
copper=Copper cable
icon-only=[item=iron-plate] __1__

[entity-description]
furnace=Smelts __1__ into plates
";

    const TARGET: &str = "\
[item-name]
iron-gear=铁齿轮
steel-beam=Steel beam
";

    fn mod_dirs(target: Option<&str>) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let en = dir.path().join("locale/en");
        let zh = dir.path().join("locale/zh-CN");
        fs::create_dir_all(&en).unwrap();
        fs::write(en.join("items.cfg"), SOURCE).unwrap();
        if let Some(t) = target {
            fs::create_dir_all(&zh).unwrap();
            fs::write(zh.join("items.cfg"), t).unwrap();
        }
        (dir, en, zh)
    }

    fn translator(server: &MockServer) -> AiTranslator {
        let api = ApiConfig {
            url: server.url("/chat/completions"),
            api_key: "k".into(),
            retry_delay_ms: 0,
            ..ApiConfig::default()
        };
        AiTranslator::new(&api, &TranslationConfig::default()).unwrap()
    }

    #[test]
    fn target_names_follow_locale_suffix() {
        assert_eq!(target_file_name("lang_en.cfg", "en", "zh-CN"), "lang_zh-CN.cfg");
        assert_eq!(target_file_name("items.cfg", "en", "zh-CN"), "items.cfg");
        assert_eq!(target_file_name("_en.cfg", "en", "zh-CN"), "_en.cfg");
        assert_eq!(target_file_name("often.cfg", "en", "zh-CN"), "often.cfg");
    }

    #[test]
    fn pending_skips_done_and_untranslatable_values() {
        let items = collect_pending(&CfgDocument::parse(SOURCE), &CfgDocument::parse(TARGET));
        let keys: Vec<(&str, &str)> = items
            .iter()
            .map(|i| (i.key.as_str(), i.reason.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("steel-beam", "untranslated"),
                ("copper", "missing"),
                ("furnace", "missing")
            ]
        );
        assert_eq!(items[2].section, "entity-description");
        assert_eq!(items[2].line, 8);
    }

    #[test]
    fn translates_with_memory_api_and_glossary() {
        let (_dir, en, zh) = mod_dirs(Some(TARGET));
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .body_contains("Source: Steel beam")
                .body_contains("Source: Smelts __1__ into plates");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "1. 钢梁\n2. 将 __1__ 熔炼成 plate" } }]
            }));
        });

        let t = translator(&server);
        let glossary = Glossary::parse("plate: 板\n");
        let mut memory = TranslationMemory::open(&zh.join("tm.json"), "en", "zh-CN");
        memory.record("Copper cable", "铜缆");

        let mut ctx = TranslateContext {
            translator: Some(&t),
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: false,
        };
        let report = translate_dir(&en, &zh, ("en", "zh-CN"), None, &mut ctx).unwrap();

        mock.assert();
        let f = &report.files[0];
        assert_eq!((f.added, f.updated, f.kept, f.failed), (2, 1, 2, 0));
        assert_eq!(f.from_memory, 1);
        assert!(!f.created);

        let doc = CfgDocument::parse(&fs::read_to_string(zh.join("items.cfg")).unwrap());
        assert_eq!(doc.get("item-name", "iron-gear").unwrap().value, "铁齿轮");
        assert_eq!(doc.get("item-name", "steel-beam").unwrap().value, "钢梁");
        assert_eq!(doc.get("item-name", "copper").unwrap().value, "铜缆");
        assert_eq!(
            doc.get("entity-description", "furnace").unwrap().value,
            "将 __1__ 熔炼成 板"
        );

        assert_eq!(
            fs::read_to_string(zh.join("items.cfg.backup")).unwrap(),
            TARGET
        );
        assert_eq!(memory.lookup("Steel beam"), Some("钢梁"));
        assert!(zh.join("tm.json").exists());
    }

    #[test]
    fn failed_batches_leave_target_untouched() {
        let (_dir, en, zh) = mod_dirs(Some(TARGET));
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(400).json_body(json!({ "message": "nope" }));
        });

        let t = translator(&server);
        let glossary = Glossary::default();
        let mut memory = TranslationMemory::ephemeral("en", "zh-CN");
        let mut ctx = TranslateContext {
            translator: Some(&t),
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: false,
        };
        let f = translate_file(&en.join("items.cfg"), &zh.join("items.cfg"), &mut ctx).unwrap();

        assert_eq!((f.added, f.updated, f.failed), (0, 0, 3));
        assert_eq!(f.kept, 5);
        assert_eq!(fs::read_to_string(zh.join("items.cfg")).unwrap(), TARGET);
        assert!(!zh.join("items.cfg.backup").exists());
    }

    #[test]
    fn dry_run_writes_nothing_and_needs_no_key() {
        let (_dir, en, zh) = mod_dirs(None);
        let glossary = Glossary::default();
        let mut memory = TranslationMemory::ephemeral("en", "zh-CN");
        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: true,
        };
        let report = translate_dir(&en, &zh, ("en", "zh-CN"), None, &mut ctx).unwrap();

        assert_eq!(report.failed(), 4);
        assert_eq!(report.created(), 1);
        assert!(!zh.exists());

        let keys: Vec<&str> = report.files[0].pending.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["iron-gear", "steel-beam", "copper", "furnace"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["files"][0]["pending"][1]["reason"], "untranslated");
        assert_eq!(json["files"][0]["pending"][3]["line"], 8);
    }

    #[test]
    fn memory_alone_needs_no_key_but_api_work_does() {
        let (_dir, en, zh) = mod_dirs(None);
        let glossary = Glossary::default();
        let mut memory = TranslationMemory::ephemeral("en", "zh-CN");
        for (s, t) in [
            ("Iron gear wheel", "铁齿轮"),
            ("Steel beam", "钢梁"),
            ("Copper cable", "铜缆"),
            ("Smelts __1__ into plates", "将 __1__ 熔炼成板"),
        ] {
            memory.record(s, t);
        }

        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: false,
        };
        let report = translate_dir(&en, &zh, ("en", "zh-CN"), Some("items.cfg"), &mut ctx).unwrap();
        let f = &report.files[0];
        assert!(f.created);
        assert_eq!((f.added, f.updated, f.failed, f.from_memory), (4, 0, 0, 4));

        let written = fs::read_to_string(zh.join("items.cfg")).unwrap();
        assert!(written.contains("icon-only=[item=iron-plate] __1__"));
        assert!(written.contains("furnace=将 __1__ 熔炼成板"));

        fs::write(en.join("extra.cfg"), "[a]\nnew=Brand new text\n").unwrap();
        let mut empty = TranslationMemory::ephemeral("en", "zh-CN");
        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut empty,
            backup: false,
            dry_run: false,
        };
        let err = translate_dir(&en, &zh, ("en", "zh-CN"), Some("extra.cfg"), &mut ctx);
        assert!(matches!(err, Err(Error::MissingApiKey)));
    }

    #[test]
    fn memory_hits_are_saved_before_missing_key_fails() {
        let (_dir, en, zh) = mod_dirs(None);
        fs::write(en.join("items.cfg"), "[a]\nknown=Iron gear\nnew=Brand new text\n").unwrap();
        let glossary = Glossary::default();
        let mut memory = TranslationMemory::open(&zh.join("tm.json"), "en", "zh-CN");
        memory.record("Iron gear", "铁齿轮");

        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: false,
        };
        let err = translate_dir(&en, &zh, ("en", "zh-CN"), None, &mut ctx);
        assert!(matches!(err, Err(Error::MissingApiKey)));

        let doc = CfgDocument::parse(&fs::read_to_string(zh.join("items.cfg")).unwrap());
        assert_eq!(doc.get("a", "known").unwrap().value, "铁齿轮");
        assert_eq!(doc.get("a", "new").unwrap().value, "Brand new text");

        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: false,
        };
        let single = translate_file(&en.join("items.cfg"), &zh.join("items.cfg"), &mut ctx);
        assert!(matches!(single, Err(Error::MissingApiKey)));
    }

    #[test]
    fn unknown_single_file_is_rejected() {
        let (_dir, en, zh) = mod_dirs(None);
        let glossary = Glossary::default();
        let mut memory = TranslationMemory::ephemeral("en", "zh-CN");
        let mut ctx = TranslateContext {
            translator: None,
            glossary: &glossary,
            memory: &mut memory,
            backup: true,
            dry_run: true,
        };
        assert!(translate_dir(&en, &zh, ("en", "zh-CN"), Some("nope.cfg"), &mut ctx).is_err());
    }
}
