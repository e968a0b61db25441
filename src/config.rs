use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "localizer.toml";

const API_KEY_VARS: [&str; 2] = ["LOCALIZER_API_KEY", "DEEPSEEK_API_KEY"];

fn default_api_url() -> String {
    "https://api.deepseek.com/chat/completions".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_top_p() -> f32 {
    0.9
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    800
}

fn default_source_locale() -> String {
    "en".to_string()
}

fn default_target_locale() -> String {
    "zh-CN".to_string()
}

fn default_target_language() -> String {
    "Simplified Chinese".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_max_workers() -> usize {
    5
}

fn default_glossary() -> PathBuf {
    PathBuf::from("glossary.txt")
}

fn default_memory() -> PathBuf {
    PathBuf::from(".localizer/translation_memory.json")
}

fn default_game_context() -> String {
    "Factorio is a sci-fi industrial automation game; its themes include technology, \
     factories, automation, mystery and philosophy."
        .to_string()
}

fn default_true() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    [
        ".git",
        ".github",
        "__pycache__",
        ".DS_Store",
        ".localizer",
        "scripts",
        "target",
        "*.backup",
        "*.zip",
        CONFIG_FILE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base of the exponential backoff between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            url: default_api_url(),
            model: default_model(),
            api_key: String::new(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationConfig {
    #[serde(default = "default_source_locale")]
    pub source_locale: String,

    #[serde(default = "default_target_locale")]
    pub target_locale: String,

    /// Language name used in the prompt.
    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Relative paths resolve against the mod root.
    #[serde(default = "default_glossary")]
    pub glossary: PathBuf,

    #[serde(default = "default_memory")]
    pub memory: PathBuf,

    #[serde(default = "default_game_context")]
    pub game_context: String,

    #[serde(default = "default_true")]
    pub backup: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        TranslationConfig {
            source_locale: default_source_locale(),
            target_locale: default_target_locale(),
            target_language: default_target_language(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            glossary: default_glossary(),
            memory: default_memory(),
            game_context: default_game_context(),
            backup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        PackageConfig {
            exclude: default_exclude(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Loads `path` (or `<root>/localizer.toml` when it exists), then applies
    /// environment overrides. A missing default file yields the defaults.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Config> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (root.join(CONFIG_FILE), false),
        };

        let mut config = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let cfg = Config::parse(&text).map_err(|source| Error::Config {
                path: path.clone(),
                source,
            })?;
            tracing::debug!("loaded config from {}", path.display());
            cfg
        } else if required {
            return Err(Error::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            ));
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> std::result::Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for name in API_KEY_VARS {
            if let Some(key) = lookup(name).filter(|k| !k.trim().is_empty()) {
                self.api.api_key = key.trim().to_string();
                return;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.translation.batch_size == 0 {
            return Err(Error::Invalid("translation.batch_size must be at least 1".into()));
        }
        if self.translation.max_workers == 0 {
            return Err(Error::Invalid("translation.max_workers must be at least 1".into()));
        }
        if self.api.max_retries == 0 {
            return Err(Error::Invalid("api.max_retries must be at least 1".into()));
        }
        if self.translation.source_locale == self.translation.target_locale {
            return Err(Error::Invalid(
                "source and target locale must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn resolve(root: &Path, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    }
}
