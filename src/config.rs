//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$SMAK_CONFIG` (environment variable)
//! 2. `~/.config/smak/config.toml` (Linux)
//!    `~/Library/Application Support/smak/config.toml` (macOS)
//! 3. Built-in defaults

use std::path::PathBuf;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Archive layout and parser policy.
    pub archive: ArchiveConfig,
    /// Generated page settings.
    pub html: HtmlConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// `strftime` format string for dates on generated pages.
    pub date_format: String,
}

/// Archive layout and parser policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Size of the per-message arena in bytes (default: 16 MB).
    pub arena_capacity: usize,
    /// Reject messages whose `Date:` cannot be parsed. When false the date
    /// is recorded as unknown instead.
    pub strict_dates: bool,
    /// Store directory (log and reports), relative to the maildir.
    pub store_dir: PathBuf,
    /// Output directory for pages, relative to the maildir.
    pub www_dir: PathBuf,
    /// Longest file name accepted for a message or page.
    pub max_filename_length: usize,
}

/// Generated page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    /// Title of the index page.
    pub title: String,
    /// Text shown at the bottom of every page.
    pub footer: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            arena_capacity: 16 * 1024 * 1024, // 16 MB
            strict_dates: true,
            store_dir: PathBuf::from("smak"),
            www_dir: PathBuf::from("www"),
            max_filename_length: 255,
        }
    }
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            title: "Mail archive".to_string(),
            footer: format!("Generated by smak {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GeneralConfig {
    /// The configured date format, or the default if it has invalid
    /// specifiers.
    pub fn checked_date_format(&self) -> String {
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            tracing::warn!(format = %self.date_format, "Invalid date format, using default");
            return Self::default().date_format;
        }
        self.date_format.clone()
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("SMAK_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("smak").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smak")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("smak.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.archive.arena_capacity, 16 * 1024 * 1024);
        assert!(cfg.archive.strict_dates);
        assert_eq!(cfg.archive.store_dir, PathBuf::from("smak"));
        assert_eq!(cfg.archive.www_dir, PathBuf::from("www"));
        assert!(cfg.html.footer.starts_with("Generated by smak"));
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.general.date_format, cfg.general.date_format);
        assert_eq!(parsed.archive.arena_capacity, cfg.archive.arena_capacity);
        assert_eq!(parsed.html.title, cfg.html.title);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[archive]
strict_dates = false

[html]
title = "dev@ archive"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(!cfg.archive.strict_dates);
        assert_eq!(cfg.html.title, "dev@ archive");
        // Other fields use defaults
        assert_eq!(cfg.archive.max_filename_length, 255);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_checked_date_format() {
        let mut general = GeneralConfig::default();
        general.date_format = "%d.%m.%Y".into();
        assert_eq!(general.checked_date_format(), "%d.%m.%Y");
        general.date_format = "%Q".into();
        assert_eq!(general.checked_date_format(), "%Y-%m-%d %H:%M:%S");
    }

    #[test]
    fn test_log_file_in_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/smak-cache"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/smak-cache/smak.log")
        );
    }
}
