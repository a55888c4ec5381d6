//! Application configuration for coursebook.
//!
//! User config lives at `~/.coursebook/coursebook.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoursebookError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursebook.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursebook";

/// Languages the course is published in: (code, display name).
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fi", "Suomi"),
    ("zh", "中文"),
    ("es", "Español"),
    ("fr", "Français"),
    ("ptbr", "Português(BR)"),
];

// ---------------------------------------------------------------------------
// Enumerated options
// ---------------------------------------------------------------------------

/// What to do with emoji glyphs in the final HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmojiMode {
    /// Replace each emoji with its `:shortcode:` name.
    #[default]
    Replace,
    /// Strip emoji entirely.
    Remove,
    /// Leave emoji untouched.
    Keep,
}

impl FromStr for EmojiMode {
    type Err = CoursebookError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace" => Ok(Self::Replace),
            "remove" => Ok(Self::Remove),
            "keep" => Ok(Self::Keep),
            other => Err(CoursebookError::validation(format!(
                "unsupported emoji mode: {other} (expected replace, remove or keep)"
            ))),
        }
    }
}

impl fmt::Display for EmojiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Remove => "remove",
            Self::Keep => "keep",
        })
    }
}

/// Which slice of the course goes into the exported book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    #[default]
    Full,
    CourseOnly,
    ExercisesOnly,
}

impl FromStr for ExportType {
    type Err = CoursebookError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "course_only" => Ok(Self::CourseOnly),
            "exercises_only" => Ok(Self::ExercisesOnly),
            other => Err(CoursebookError::validation(format!(
                "unsupported export type: {other} (expected full, course_only or exercises_only)"
            ))),
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::CourseOnly => "course_only",
            Self::ExercisesOnly => "exercises_only",
        })
    }
}

/// Check a language code against [`SUPPORTED_LANGUAGES`].
pub fn validate_language(code: &str) -> Result<()> {
    language_name(code).map(|_| ()).ok_or_else(|| {
        let known: Vec<&str> = SUPPORTED_LANGUAGES.iter().map(|(c, _)| *c).collect();
        CoursebookError::validation(format!(
            "unsupported language: {code} (expected one of {})",
            known.join(", ")
        ))
    })
}

/// Display name of a supported language code.
pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

// ---------------------------------------------------------------------------
// Config structs (matching coursebook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub content: ContentConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of all pipeline output.
    #[serde(default = "default_output_root")]
    pub output_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
        }
    }
}

fn default_output_root() -> String {
    "output".into()
}

/// `[site]` section: the course site the raw documents were scraped from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("https://fullstackopen.com").expect("valid default base URL")
}

impl SiteConfig {
    /// Build a site config from a base URL string.
    pub fn parse(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CoursebookError::config(format!("invalid site base_url {base_url:?}: {e}")))?;
        if base_url.host_str().is_none() {
            return Err(CoursebookError::config(format!(
                "site base_url {base_url} has no host"
            )));
        }
        Ok(Self { base_url })
    }

    /// Host name of the site (e.g. `fullstackopen.com`).
    pub fn domain(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }

    /// Whether `host` is the site's host, with or without a `www.` prefix.
    pub fn is_site_host(&self, host: &str) -> bool {
        let bare = |h: &str| h.strip_prefix("www.").unwrap_or(h).to_ascii_lowercase();
        bare(host) == bare(self.domain())
    }
}

/// Settings for one TaskRunner call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum simultaneous in-flight operations.
    pub concurrency: usize,
    /// Minimum ms between two dispatches (0 disables).
    #[serde(default)]
    pub min_dispatch_interval_ms: u64,
    /// Attempts per item, including the first.
    pub max_attempts: u32,
    /// Linear backoff unit in ms.
    pub backoff_base_ms: u64,
}

/// `[runner]` section with one table per batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_clean_batch")]
    pub clean: BatchSettings,
    #[serde(default = "default_images_batch")]
    pub images: BatchSettings,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            clean: default_clean_batch(),
            images: default_images_batch(),
        }
    }
}

fn default_clean_batch() -> BatchSettings {
    BatchSettings {
        concurrency: 3,
        min_dispatch_interval_ms: 0,
        max_attempts: 1,
        backoff_base_ms: 2000,
    }
}

fn default_images_batch() -> BatchSettings {
    BatchSettings {
        concurrency: 5,
        min_dispatch_interval_ms: 0,
        max_attempts: 3,
        backoff_base_ms: 2000,
    }
}

/// `[content]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub emoji_mode: EmojiMode,

    /// Accent color for parts whose manifest entry has none.
    #[serde(default = "default_accent_color")]
    pub default_accent_color: String,

    /// Directory (relative to the clean output) that rewritten images point into.
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    #[serde(default)]
    pub export_type: ExportType,

    #[serde(default = "default_language")]
    pub language: String,

    /// Prefix TOC entries with chapter numbers.
    #[serde(default)]
    pub chapter_numbers: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            emoji_mode: EmojiMode::default(),
            default_accent_color: default_accent_color(),
            images_dir: default_images_dir(),
            export_type: ExportType::default(),
            language: default_language(),
            chapter_numbers: false,
        }
    }
}

fn default_accent_color() -> String {
    "#ccc".into()
}
fn default_images_dir() -> String {
    "imgs".into()
}
fn default_language() -> String {
    "en".into()
}

// ---------------------------------------------------------------------------
// Output layout
// ---------------------------------------------------------------------------

/// Every path the pipeline stages read or write, derived from `output_root`.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub root: PathBuf,
    pub fetched_data: PathBuf,
    pub data_json: PathBuf,
    pub raw: PathBuf,
    pub covers: PathBuf,
    pub clean: PathBuf,
    pub imgs: PathBuf,
    pub imgs_json: PathBuf,
    pub book_json: PathBuf,
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>, images_dir: &str) -> Self {
        let root = root.into();
        let fetched_data = root.join("fetched-data");
        let clean = fetched_data.join("clean");
        Self {
            data_json: fetched_data.join("data.json"),
            raw: fetched_data.join("raw"),
            covers: fetched_data.join("covers"),
            imgs: clean.join(images_dir),
            imgs_json: fetched_data.join("imgs.json"),
            book_json: root.join("book.json"),
            clean,
            fetched_data,
            root,
        }
    }
}

impl From<&AppConfig> for OutputPaths {
    fn from(config: &AppConfig) -> Self {
        Self::new(&config.paths.output_root, &config.content.images_dir)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursebook/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CoursebookError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursebook/coursebook.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CoursebookError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CoursebookError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject settings that would make a batch unable to run.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (name, batch) in [("clean", &config.runner.clean), ("images", &config.runner.images)] {
        if batch.concurrency == 0 {
            return Err(CoursebookError::config(format!(
                "runner.{name}.concurrency must be at least 1"
            )));
        }
        if batch.max_attempts == 0 {
            return Err(CoursebookError::config(format!(
                "runner.{name}.max_attempts must be at least 1"
            )));
        }
    }
    validate_language(&config.content.language)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CoursebookError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CoursebookError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CoursebookError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_root"));
        assert!(toml_str.contains("fullstackopen.com"));
        assert!(toml_str.contains("emoji_mode = \"replace\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.runner.clean.concurrency, 3);
        assert_eq!(parsed.runner.images.max_attempts, 3);
        assert_eq!(parsed.content.default_accent_color, "#ccc");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[site]
base_url = "https://site.example"

[content]
emoji_mode = "remove"
export_type = "course_only"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.site.domain(), "site.example");
        assert_eq!(config.content.emoji_mode, EmojiMode::Remove);
        assert_eq!(config.content.export_type, ExportType::CourseOnly);
        assert_eq!(config.content.images_dir, "imgs");
        assert_eq!(config.runner.images.concurrency, 5);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.runner.images.concurrency = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("runner.images.concurrency"));
    }

    #[test]
    fn option_parsing() {
        assert_eq!("keep".parse::<EmojiMode>().unwrap(), EmojiMode::Keep);
        assert!("shout".parse::<EmojiMode>().is_err());
        assert_eq!(
            "exercises_only".parse::<ExportType>().unwrap(),
            ExportType::ExercisesOnly
        );
        assert!(validate_language("fi").is_ok());
        assert!(validate_language("de").is_err());
        assert_eq!(language_name("ptbr"), Some("Português(BR)"));
        assert_eq!(language_name("de"), None);
    }

    #[test]
    fn output_paths_layout() {
        let paths = OutputPaths::new("/tmp/out", "imgs");
        assert_eq!(paths.data_json, PathBuf::from("/tmp/out/fetched-data/data.json"));
        assert_eq!(paths.imgs, PathBuf::from("/tmp/out/fetched-data/clean/imgs"));
        assert_eq!(paths.imgs_json, PathBuf::from("/tmp/out/fetched-data/imgs.json"));
    }

    #[test]
    fn site_config_requires_host() {
        assert!(SiteConfig::parse("mailto:someone@example.com").is_err());
        assert_eq!(
            SiteConfig::parse("https://site.example/").unwrap().domain(),
            "site.example"
        );
    }

    #[test]
    fn site_host_accepts_www_prefix() {
        let site = SiteConfig::parse("https://fullstackopen.com").unwrap();
        assert!(site.is_site_host("fullstackopen.com"));
        assert!(site.is_site_host("www.fullstackopen.com"));
        assert!(!site.is_site_host("github.com"));
        assert!(!site.is_site_host("notfullstackopen.com"));

        let www = SiteConfig::parse("https://www.site.example").unwrap();
        assert!(www.is_site_host("site.example"));
    }
}
