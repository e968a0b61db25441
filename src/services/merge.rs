//! Copies source-locale keys the target files lack, leaving existing
//! translations alone. Gives translators a complete file to work in.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::services::pipeline::{cfg_files, read_cfg, target_file_name, write_cfg};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub file: String,
    pub added: usize,
    pub created: bool,
}

pub fn merge_file(source_path: &Path, target_path: &Path, backup: bool) -> Result<MergeReport> {
    let source = read_cfg(source_path)?;
    let file = target_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !target_path.exists() {
        write_cfg(target_path, &source)?;
        tracing::info!("{file}: created from source ({} keys)", source.entry_count());
        return Ok(MergeReport {
            file,
            added: source.entry_count(),
            created: true,
        });
    }

    let mut target = read_cfg(target_path)?;
    let mut added = 0;
    for (section, entry) in source.unique_entries() {
        if target.get(section, &entry.key).is_some() {
            continue;
        }
        target.set(section, &entry.key, &entry.value, entry.commented);
        added += 1;
    }

    if added > 0 {
        if backup {
            let mut name = target_path.as_os_str().to_os_string();
            name.push(".backup");
            fs::copy(target_path, &name).map_err(|e| Error::io(&name, e))?;
        }
        write_cfg(target_path, &target)?;
    }

    tracing::info!("{file}: {added} keys added");
    Ok(MergeReport {
        file,
        added,
        created: false,
    })
}

pub fn merge_dir(
    source_dir: &Path,
    target_dir: &Path,
    locales: (&str, &str),
    backup: bool,
) -> Result<Vec<MergeReport>> {
    if !source_dir.is_dir() {
        return Err(Error::InvalidMod(format!(
            "source locale directory {} not found",
            source_dir.display()
        )));
    }
    fs::create_dir_all(target_dir).map_err(|e| Error::io(target_dir, e))?;

    cfg_files(source_dir)?
        .into_iter()
        .map(|source| {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = target_dir.join(target_file_name(&name, locales.0, locales.1));
            merge_file(&source, &target, backup)
        })
        .collect()
}
