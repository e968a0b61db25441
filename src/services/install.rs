//! Copies the localized mod into the local Factorio mods directory for
//! in-game testing.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::model::mod_info::{ModInfo, INFO_FILE};
use crate::services::package::{ExcludeRules, LOCALE_DIR, THUMBNAIL_FILE};

const LOCALE_EXCLUDE: [&str; 3] = ["*.backup", "*.bak", "*.tmp"];

/// `<data dir>/Factorio/mods`: `%APPDATA%` on Windows, `~/Library/Application
/// Support` on macOS, `~/.local/share` elsewhere.
pub fn default_mods_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("Factorio").join("mods"))
}

#[derive(Debug, Serialize)]
pub struct InstallReport {
    pub destination: PathBuf,
    pub locale_files: usize,
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| Error::io(from, e))?;
    Ok(())
}

pub fn install(root: &Path, mods_dir: &Path, create: bool) -> Result<InstallReport> {
    let info = ModInfo::load(root)?;

    for required in [THUMBNAIL_FILE, LOCALE_DIR] {
        if !root.join(required).exists() {
            return Err(Error::InvalidMod(format!(
                "{required} not found in {}",
                root.display()
            )));
        }
    }

    if !mods_dir.is_dir() {
        if !create {
            return Err(Error::Invalid(format!(
                "mods directory {} does not exist (use --create to create it)",
                mods_dir.display()
            )));
        }
        fs::create_dir_all(mods_dir).map_err(|e| Error::io(mods_dir, e))?;
        tracing::info!("created {}", mods_dir.display());
    }

    let dest = mods_dir.join(info.folder_name());
    fs::create_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;

    copy_file(&root.join(INFO_FILE), &dest.join(INFO_FILE))?;
    copy_file(&root.join(THUMBNAIL_FILE), &dest.join(THUMBNAIL_FILE))?;

    let src_locale = root.join(LOCALE_DIR);
    let dst_locale = dest.join(LOCALE_DIR);
    if dst_locale.exists() {
        fs::remove_dir_all(&dst_locale).map_err(|e| Error::io(&dst_locale, e))?;
    }

    let rules = ExcludeRules::new(&LOCALE_EXCLUDE)?;
    let mut locale_files = 0;
    for entry in WalkDir::new(&src_locale).sort_by_file_name() {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(&src_locale) else {
            continue;
        };
        let target = dst_locale.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else if entry.file_type().is_file()
            && !rules.matches(&entry.file_name().to_string_lossy(), false)
        {
            copy_file(entry.path(), &target)?;
            locale_files += 1;
        }
    }

    tracing::info!("installed to {} ({locale_files} locale files)", dest.display());
    Ok(InstallReport {
        destination: dest,
        locale_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mod(root: &Path) {
        fs::write(root.join(INFO_FILE), r#"{"name":"m","version":"0.1.0"}"#).unwrap();
        fs::write(root.join(THUMBNAIL_FILE), b"png").unwrap();
        fs::create_dir_all(root.join("locale/zh-CN")).unwrap();
        fs::write(root.join("locale/zh-CN/a.cfg"), "[s]\nk=值\n").unwrap();
        fs::write(root.join("locale/zh-CN/a.cfg.backup"), "[s]\n").unwrap();
        fs::write(root.join("locale/zh-CN/b.tmp"), "").unwrap();
    }

    #[test]
    fn copies_mod_files_and_replaces_old_locale() {
        let src = tempfile::tempdir().unwrap();
        let mods = tempfile::tempdir().unwrap();
        sample_mod(src.path());

        let stale = mods.path().join("m_0.1.0/locale/old");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("gone.cfg"), "").unwrap();

        let report = install(src.path(), mods.path(), false).unwrap();
        let dest = mods.path().join("m_0.1.0");
        assert_eq!(report.destination, dest);
        assert_eq!(report.locale_files, 1);
        assert!(dest.join(INFO_FILE).is_file());
        assert!(dest.join(THUMBNAIL_FILE).is_file());
        assert_eq!(
            fs::read_to_string(dest.join("locale/zh-CN/a.cfg")).unwrap(),
            "[s]\nk=值\n"
        );
        assert!(!dest.join("locale/zh-CN/a.cfg.backup").exists());
        assert!(!dest.join("locale/zh-CN/b.tmp").exists());
        assert!(!dest.join("locale/old").exists());
    }

    #[test]
    fn missing_mods_dir_needs_create() {
        let src = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        sample_mod(src.path());
        let mods = base.path().join("Factorio/mods");

        assert!(install(src.path(), &mods, false).is_err());
        assert!(!mods.exists());

        install(src.path(), &mods, true).unwrap();
        assert!(mods.join("m_0.1.0/locale/zh-CN/a.cfg").is_file());
    }

    #[test]
    fn missing_thumbnail_is_an_invalid_mod() {
        let src = tempfile::tempdir().unwrap();
        let mods = tempfile::tempdir().unwrap();
        sample_mod(src.path());
        fs::remove_file(src.path().join(THUMBNAIL_FILE)).unwrap();
        assert!(matches!(
            install(src.path(), mods.path(), false),
            Err(Error::InvalidMod(_))
        ));
    }
}
