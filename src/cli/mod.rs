use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::mod_info::ModInfo;
use crate::services::{
    ai::AiTranslator,
    glossary::Glossary,
    install, merge, package,
    pipeline::{self, TranslateContext},
    qa, terms,
    translation_memory::TranslationMemory,
};

mod command;
pub use command::Cli;
use command::{CheckArgs, Command, InstallArgs, PackageArgs, TermsArgs, TranslateArgs};

const LOCALE_DIR: &str = "locale";

/// `writeln!` into the command output, failing with [`Error::Output`].
macro_rules! emit {
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).map_err(Error::Output)?
    };
}

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(|e| Error::Invalid(e.to_string()))?;
    emit!(out, "{s}");
    Ok(())
}

struct Locales {
    source: String,
    target: String,
    source_dir: PathBuf,
    target_dir: PathBuf,
}

impl Locales {
    fn new(root: &Path, config: &Config) -> Locales {
        let t = &config.translation;
        let base = root.join(LOCALE_DIR);
        Locales {
            source: t.source_locale.clone(),
            target: t.target_locale.clone(),
            source_dir: base.join(&t.source_locale),
            target_dir: base.join(&t.target_locale),
        }
    }

    fn pair(&self) -> (&str, &str) {
        (&self.source, &self.target)
    }
}

/// Runs one command. Reports go to `out`; progress goes through `tracing`.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<ExitCode> {
    let root = cli.root.clone();
    let config = Config::load(&root, cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Command::Translate(args) => translate(&root, config, args, json, out),
        Command::Merge(args) => {
            let locales = Locales::new(&root, &config);
            let backup = config.translation.backup && !args.no_backup;
            let reports =
                merge::merge_dir(&locales.source_dir, &locales.target_dir, locales.pair(), backup)?;
            if json {
                print_json(out, &reports)?;
            } else {
                for r in &reports {
                    let note = if r.created { " (created)" } else { "" };
                    emit!(out, "{:<40} +{}{note}", r.file, r.added);
                }
                let total: usize = reports.iter().map(|r| r.added).sum();
                emit!(out, "{} files, {total} keys added", reports.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Terms(args) => extract_terms(&root, &config, args, json, out),
        Command::Check(args) => check(&root, &config, args, json, out),
        Command::Package(args) => build_package(&root, &config, args, json, out),
        Command::Install(args) => install_mod(&root, args, json, out),
    }
}

fn translate(
    root: &Path,
    mut config: Config,
    args: TranslateArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    if let Some(n) = args.batch_size {
        config.translation.batch_size = n;
    }
    if let Some(n) = args.workers {
        config.translation.max_workers = n;
    }
    config.validate()?;

    let tr = &config.translation;
    let locales = Locales::new(root, &config);
    let glossary = Glossary::load_optional(&Config::resolve(root, &tr.glossary))?;

    let mut memory = if args.no_memory || args.dry_run {
        TranslationMemory::ephemeral(&tr.source_locale, &tr.target_locale)
    } else {
        TranslationMemory::open(
            &Config::resolve(root, &tr.memory),
            &tr.source_locale,
            &tr.target_locale,
        )
    };

    let translator = if args.dry_run {
        None
    } else {
        match AiTranslator::new(&config.api, tr) {
            Ok(t) => Some(t),
            Err(Error::MissingApiKey) => {
                tracing::warn!("no API key configured, only translation memory hits can be applied");
                None
            }
            Err(e) => return Err(e),
        }
    };

    let mut ctx = TranslateContext {
        translator: translator.as_ref(),
        glossary: &glossary,
        memory: &mut memory,
        backup: tr.backup && !args.no_backup,
        dry_run: args.dry_run,
    };

    let report = pipeline::translate_dir(
        &locales.source_dir,
        &locales.target_dir,
        locales.pair(),
        args.file.as_deref(),
        &mut ctx,
    )?;

    if json {
        print_json(out, &report)?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        for f in &report.files {
            emit!(out, "{} ({} pending)", f.file, f.pending.len());
            for item in &f.pending {
                emit!(
                    out,
                    "  [{}] {} ({}, line {}): {}",
                    item.section,
                    item.key,
                    item.reason.as_str(),
                    item.line,
                    item.source
                );
            }
        }
        emit!(out, "{} entries pending in {} files", report.failed(), report.files.len());
        return Ok(ExitCode::SUCCESS);
    }

    for f in &report.files {
        emit!(
            out,
            "{:<40} +{} ~{} ={} !{}{}",
            f.file,
            f.added,
            f.updated,
            f.kept,
            f.failed,
            if f.created { " (created)" } else { "" }
        );
    }
    emit!(
        out,
        "added {}, updated {}, kept {}, failed {} ({} from memory, {} files created)",
        report.added(),
        report.updated(),
        report.kept(),
        report.failed(),
        report.from_memory(),
        report.created()
    );
    if report.failed() > 0 {
        emit!(out, "failed entries were left as they were; run translate again to retry them");
    }

    Ok(ExitCode::SUCCESS)
}

fn extract_terms(
    root: &Path,
    config: &Config,
    args: TermsArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let locales = Locales::new(root, config);
    let values = terms::collect_values(&locales.source_dir)?;
    let counts = terms::analyze(values.iter().map(String::as_str), args.min_frequency);

    if !args.translate {
        if json {
            print_json(out, &counts)?;
        } else {
            for (i, c) in counts.iter().take(args.top).enumerate() {
                emit!(out, "{:>4}  {:<40} {}", i + 1, c.term, c.count);
            }
            emit!(
                out,
                "{} terms occur at least {} times",
                counts.len(),
                args.min_frequency
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let glossary = Glossary::load_optional(&Config::resolve(root, &config.translation.glossary))?;
    let translator = AiTranslator::new(&config.api, &config.translation)?;
    let entries = terms::translate_candidates(&translator, &counts, &glossary);

    let output = Config::resolve(root, &args.output);
    let header = format!(
        "Glossary candidates (min frequency {})\nReview, then move the lines you keep into {}",
        args.min_frequency,
        config.translation.glossary.display()
    );
    Glossary::write(&output, &header, &entries)?;

    if json {
        print_json(out, &entries)?;
    } else {
        for e in entries.iter().take(args.top) {
            emit!(out, "{:<40} {}", e.source, e.target);
        }
        emit!(out, "{} candidates written to {}", entries.len(), output.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn check(
    root: &Path,
    config: &Config,
    args: CheckArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let locales = Locales::new(root, config);
    let report = qa::check_dir(&locales.source_dir, &locales.target_dir, locales.pair())?;

    if json {
        print_json(out, &report)?;
    } else {
        for i in &report.issues {
            if i.key.is_empty() {
                emit!(out, "{}: {} {}", i.file, i.code.as_str(), i.message);
            } else {
                emit!(
                    out,
                    "{} [{}] {}: {} {}",
                    i.file,
                    i.section,
                    i.key,
                    i.code.as_str(),
                    i.message
                );
            }
        }
        for (code, n) in report.counts() {
            emit!(out, "{:<20} {n}", code.as_str());
        }
        emit!(
            out,
            "{} files checked, {} issues",
            report.files_checked,
            report.issues.len()
        );
    }

    if args.strict && !report.issues.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn build_package(
    root: &Path,
    config: &Config,
    args: PackageArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let info = ModInfo::load(root)?;
    tracing::info!("packaging {} {} ({})", info.name, info.version, info.title);

    if !args.no_validate {
        let t = &config.translation;
        let check = package::validate_structure(
            root,
            &[t.source_locale.as_str(), t.target_locale.as_str()],
        );
        for n in &check.notes {
            tracing::info!("{n}");
        }
        for p in &check.problems {
            tracing::warn!("{p}");
        }
        if !check.is_valid() {
            if !args.force {
                return Err(Error::InvalidMod(format!(
                    "{} (use --force to package anyway)",
                    check.problems.join("; ")
                )));
            }
            tracing::warn!("mod structure incomplete, packaging anyway");
        }
    }

    let output = match args.output {
        Some(p) => p,
        None => config
            .package
            .output_dir
            .as_deref()
            .map(|p| Config::resolve(root, p))
            .unwrap_or_else(|| root.to_path_buf()),
    };

    if args.list_files {
        let rules = package::exclude_rules(root, &config.package)?;
        let skip = package::archive_path(&info, &output);
        let files = package::collect_files(root, &rules, Some(&skip))?;
        if json {
            print_json(out, &files)?;
        } else {
            for f in &files {
                emit!(out, "{}/{}", info.folder_name(), f.display());
            }
            emit!(out, "{} files", files.len());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = package::build(root, &config.package, &output)?;
    if json {
        print_json(out, &report)?;
    } else {
        emit!(
            out,
            "{} ({} files, {:.2} MB)",
            report.archive.display(),
            report.files,
            report.bytes as f64 / 1024.0 / 1024.0
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn install_mod(root: &Path, args: InstallArgs, json: bool, out: &mut dyn Write) -> Result<ExitCode> {
    let mods_dir = args
        .mods_dir
        .or_else(install::default_mods_dir)
        .ok_or_else(|| {
            Error::Invalid("cannot locate the user data directory, pass --mods-dir".into())
        })?;

    let report = install::install(root, &mods_dir, args.create)?;
    if json {
        print_json(out, &report)?;
    } else {
        emit!(
            out,
            "installed to {} ({} locale files)",
            report.destination.display(),
            report.locale_files
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn sample_mod() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("info.json"), r#"{"name":"demo","version":"0.2.0"}"#).unwrap();
        fs::write(root.join(package::THUMBNAIL_FILE), b"png").unwrap();
        fs::create_dir_all(root.join("locale/en")).unwrap();
        fs::create_dir_all(root.join("locale/zh-CN")).unwrap();
        fs::write(
            root.join("locale/en/items.cfg"),
            "[item-name]\ngear=Iron gear\nplate=Iron plate\n",
        )
        .unwrap();
        fs::write(root.join("locale/zh-CN/items.cfg"), "[item-name]\ngear=铁齿轮\n").unwrap();
        dir
    }

    fn run_args(root: &Path, args: &[&str]) -> (Result<ExitCode>, String) {
        let mut argv = vec!["mod-localizer", "--root", root.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        let res = run(cli, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    fn code_of(res: Result<ExitCode>) -> String {
        format!("{:?}", res.unwrap())
    }

    fn success() -> String {
        format!("{:?}", ExitCode::SUCCESS)
    }

    fn failure() -> String {
        format!("{:?}", ExitCode::FAILURE)
    }

    #[test]
    fn dry_run_json_is_a_single_document_with_pending_items() {
        let dir = sample_mod();
        let (res, out) = run_args(dir.path(), &["--json", "translate", "--dry-run"]);
        assert_eq!(code_of(res), success());

        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        let pending = &report["files"][0]["pending"];
        assert_eq!(pending.as_array().unwrap().len(), 1);
        assert_eq!(pending[0]["key"], "plate");
        assert_eq!(pending[0]["reason"], "missing");
        assert!(!dir.path().join("locale/zh-CN/items.cfg.backup").exists());
    }

    #[test]
    fn dry_run_text_lists_pending_items() {
        let dir = sample_mod();
        let (res, out) = run_args(dir.path(), &["translate", "--dry-run"]);
        assert_eq!(code_of(res), success());
        assert!(out.contains("[item-name] plate (missing, line 3): Iron plate"));
        assert!(out.contains("1 entries pending in 1 files"));
    }

    #[test]
    fn strict_check_fails_only_with_issues() {
        let dir = sample_mod();
        let (res, out) = run_args(dir.path(), &["check"]);
        assert_eq!(code_of(res), success());
        assert!(out.contains("MISSING_KEY"));

        let (res, out) = run_args(dir.path(), &["--json", "check", "--strict"]);
        assert_eq!(code_of(res), failure());
        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["files_checked"], 1);
        assert_eq!(report["issues"][0]["code"], "MISSING_KEY");

        fs::write(
            dir.path().join("locale/zh-CN/items.cfg"),
            "[item-name]\ngear=铁齿轮\nplate=铁板\n",
        )
        .unwrap();
        let (res, _) = run_args(dir.path(), &["check", "--strict"]);
        assert_eq!(code_of(res), success());
    }

    #[test]
    fn package_needs_force_for_an_incomplete_mod() {
        let dir = sample_mod();
        fs::remove_file(dir.path().join(package::THUMBNAIL_FILE)).unwrap();

        let (res, out) = run_args(dir.path(), &["package"]);
        assert!(matches!(res, Err(Error::InvalidMod(_))));
        assert!(out.is_empty());
        assert!(!dir.path().join("demo_0.2.0.zip").exists());

        let (res, out) = run_args(dir.path(), &["--json", "package", "--force"]);
        assert_eq!(code_of(res), success());
        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["folder"], "demo_0.2.0");
        assert_eq!(report["files"], 3);
        assert!(dir.path().join("demo_0.2.0.zip").is_file());
    }

    #[test]
    fn list_files_skips_the_output_archive() {
        let dir = sample_mod();
        let dist = dir.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("demo_0.2.0.zip"), b"old").unwrap();
        fs::write(dist.join("notes.txt"), b"x").unwrap();
        fs::write(
            dir.path().join(crate::config::CONFIG_FILE),
            "[package]\nexclude = [\".git\"]\n",
        )
        .unwrap();

        let (res, out) = run_args(
            dir.path(),
            &["--json", "package", "--list-files", "-o", dist.to_str().unwrap()],
        );
        assert_eq!(code_of(res), success());

        let files: Vec<String> = serde_json::from_str(&out).unwrap();
        assert!(files.iter().any(|f| f.ends_with("notes.txt")));
        assert!(!files.iter().any(|f| f.ends_with("demo_0.2.0.zip")));
        assert!(files.iter().any(|f| f.ends_with("items.cfg")));
    }
}
