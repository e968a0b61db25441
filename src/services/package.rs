//! Release archive for the mod portal: `{name}_{version}.zip` with every
//! file under a `{name}_{version}/` folder.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobMatcher};
use serde::Serialize;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::PackageConfig;
use crate::error::{Error, Result};
use crate::model::mod_info::{ModInfo, INFO_FILE};

pub const THUMBNAIL_FILE: &str = "thumbnail.png";
pub const LOCALE_DIR: &str = "locale";
const GITIGNORE: &str = ".gitignore";

#[derive(Debug)]
enum Rule {
    /// `name/`: directories called `name`.
    Dir(String),
    Glob(GlobMatcher),
    Exact(String),
}

/// Exclusion patterns matched against a single path component.
#[derive(Debug, Default)]
pub struct ExcludeRules {
    rules: Vec<Rule>,
}

impl ExcludeRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<ExcludeRules> {
        let mut rules = Vec::with_capacity(patterns.len());
        for p in patterns {
            let p = p.as_ref().trim();
            if p.is_empty() {
                continue;
            }
            let rule = if let Some(dir) = p.strip_suffix('/') {
                Rule::Dir(dir.to_string())
            } else if p.contains(['*', '?', '[']) {
                let glob = Glob::new(p).map_err(|source| Error::Pattern {
                    pattern: p.to_string(),
                    source,
                })?;
                Rule::Glob(glob.compile_matcher())
            } else {
                Rule::Exact(p.to_string())
            };
            rules.push(rule);
        }
        Ok(ExcludeRules { rules })
    }

    pub fn matches(&self, name: &str, is_dir: bool) -> bool {
        self.rules.iter().any(|r| match r {
            Rule::Dir(d) => is_dir && name == d,
            Rule::Glob(g) => g.is_match(name),
            Rule::Exact(e) => name == e,
        })
    }
}

/// `.gitignore` lines usable as single-component patterns. Negations are
/// not supported and skipped.
pub fn read_gitignore(root: &Path) -> Vec<String> {
    let path = root.join(GITIGNORE);
    let Ok(text) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    let patterns: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(|l| l.trim_start_matches('/').to_string())
        .filter(|l| !l.is_empty())
        .collect();

    tracing::debug!("{} patterns read from {}", patterns.len(), path.display());
    patterns
}

#[derive(Debug, Default, Serialize)]
pub struct StructureCheck {
    /// Missing required parts; packaging stops on these unless forced.
    pub problems: Vec<String>,
    pub notes: Vec<String>,
}

impl StructureCheck {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

fn count_cfg(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|x| x == "cfg"))
                .count()
        })
        .unwrap_or(0)
}

pub fn validate_structure(root: &Path, locales: &[&str]) -> StructureCheck {
    let mut check = StructureCheck::default();

    for file in [INFO_FILE, THUMBNAIL_FILE] {
        if !root.join(file).is_file() {
            check.problems.push(format!("missing required file {file}"));
        }
    }

    let locale = root.join(LOCALE_DIR);
    if !locale.is_dir() {
        check.problems.push(format!("missing required directory {LOCALE_DIR}/"));
        return check;
    }

    let empty = fs::read_dir(&locale).map_or(true, |mut rd| rd.next().is_none());
    if empty {
        check.notes.push(format!("{LOCALE_DIR}/ is empty"));
    }

    for l in locales {
        let dir = locale.join(l);
        if dir.is_dir() {
            check
                .notes
                .push(format!("{LOCALE_DIR}/{l}/ has {} .cfg files", count_cfg(&dir)));
        } else {
            check.notes.push(format!("{LOCALE_DIR}/{l}/ is missing"));
        }
    }

    check
}

/// Files to ship, relative to `root`, in walk order.
pub fn collect_files(
    root: &Path,
    rules: &ExcludeRules,
    skip: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !rules.matches(&name, e.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if skip.is_some_and(|s| s == entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }

    Ok(files)
}

fn archive_name(folder: &str, rel: &Path) -> String {
    let mut name = folder.to_string();
    for c in rel.components() {
        if let Component::Normal(part) = c {
            name.push('/');
            name.push_str(&part.to_string_lossy());
        }
    }
    name
}

#[derive(Debug, Serialize)]
pub struct PackageReport {
    pub archive: PathBuf,
    pub folder: String,
    pub files: usize,
    pub bytes: u64,
}

pub fn exclude_rules(root: &Path, config: &PackageConfig) -> Result<ExcludeRules> {
    let mut patterns = config.exclude.clone();
    for p in read_gitignore(root) {
        if !patterns.contains(&p) {
            patterns.push(p);
        }
    }
    ExcludeRules::new(&patterns)
}

pub fn archive_path(info: &ModInfo, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.zip", info.folder_name()))
}

pub fn build(root: &Path, config: &PackageConfig, output_dir: &Path) -> Result<PackageReport> {
    let info = ModInfo::load(root)?;
    let folder = info.folder_name();
    let rules = exclude_rules(root, config)?;

    fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;
    let archive = archive_path(&info, output_dir);
    if archive.exists() {
        fs::remove_file(&archive).map_err(|e| Error::io(&archive, e))?;
        tracing::info!("removed old archive {}", archive.display());
    }

    let files = collect_files(root, &rules, Some(&archive))?;

    let out = File::create(&archive).map_err(|e| Error::io(&archive, e))?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for rel in &files {
        let name = archive_name(&folder, rel);
        zip.start_file(name.as_str(), options)?;
        let path = root.join(rel);
        let mut src = File::open(&path).map_err(|e| Error::io(&path, e))?;
        io::copy(&mut src, &mut zip).map_err(|e| Error::io(&path, e))?;
        tracing::debug!("added {name}");
    }
    zip.finish()?;

    let bytes = fs::metadata(&archive)
        .map_err(|e| Error::io(&archive, e))?
        .len();
    tracing::info!("{} written ({} files, {} bytes)", archive.display(), files.len(), bytes);

    Ok(PackageReport {
        archive,
        folder,
        files: files.len(),
        bytes,
    })
}
