use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const INFO_FILE: &str = "info.json";

/// The parts of a mod's `info.json` this tool cares about.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub factorio_version: String,

    #[serde(default)]
    pub description: String,
}

impl ModInfo {
    pub fn load(mod_root: &Path) -> Result<ModInfo> {
        let path = mod_root.join(INFO_FILE);
        if !path.exists() {
            return Err(Error::InvalidMod(format!(
                "{} not found in {}",
                INFO_FILE,
                mod_root.display()
            )));
        }

        let data = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let info: ModInfo = serde_json::from_str(&data).map_err(|e| Error::json(&path, e))?;

        if info.name.trim().is_empty() || info.version.trim().is_empty() {
            return Err(Error::InvalidMod(format!(
                "{} must define both `name` and `version`",
                INFO_FILE
            )));
        }

        Ok(info)
    }

    /// `{name}_{version}`, the folder name Factorio expects inside a release zip.
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.name.trim(), self.version.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_name_and_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INFO_FILE),
            r#"{"name":"space-age-zh","version":"1.2.3","factorio_version":"2.0","dependencies":["base"]}"#,
        )
        .unwrap();

        let info = ModInfo::load(dir.path()).unwrap();
        assert_eq!(info.folder_name(), "space-age-zh_1.2.3");
        assert_eq!(info.factorio_version, "2.0");
    }

    #[test]
    fn missing_version_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INFO_FILE), r#"{"name":"x"}"#).unwrap();
        assert!(matches!(ModInfo::load(dir.path()), Err(Error::InvalidMod(_))));
    }

    #[test]
    fn missing_or_broken_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModInfo::load(dir.path()).is_err());

        fs::write(dir.path().join(INFO_FILE), "{not json").unwrap();
        assert!(matches!(ModInfo::load(dir.path()), Err(Error::Json { .. })));
    }
}
