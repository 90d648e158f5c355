//! Configuration file support for manual-mirror
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/manual-mirror/config.toml` (user defaults)
//! 2. `.manual-mirror.toml` in the working directory (project overrides)
//!
//! CLI flags override all config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/manual-mirror/config.toml or .manual-mirror.toml
/// base_url = "https://digital-manual.skoda-auto.com"
/// root_topic = "c23949a70fa671f9ac14452546c7593f_3_nl_NL"
/// language = "nl_NL"
/// title = "Škoda Enyaq Handleiding"
/// toc_title = "Inhoudsopgave"
/// output_dir = "manual_output"
/// cookies_file = "cookies.txt"
/// topic_delay_ms = 300
/// image_delay_ms = 100
/// index_topic = "Handleiding"
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the manual API
    pub base_url: Option<String>,
    /// Content key of the root topic (required for download)
    pub root_topic: Option<String>,
    /// API language code, e.g. `nl_NL`
    pub language: Option<String>,
    /// Document title for the combined outputs
    pub title: Option<String>,
    /// Table-of-contents heading for the combined outputs
    pub toc_title: Option<String>,
    /// Mirror output directory
    pub output_dir: Option<PathBuf>,
    /// File holding the pre-captured session cookie string
    pub cookies_file: Option<PathBuf>,
    /// Politeness delay between topic fetches, in milliseconds
    pub topic_delay_ms: Option<u64>,
    /// Politeness delay between image fetches, in milliseconds
    pub image_delay_ms: Option<u64>,
    /// Path of the root index topic to skip during HTML assembly
    /// (it duplicates the generated table of contents)
    pub index_topic: Option<String>,
    /// Suppress per-topic progress output
    pub quiet: Option<bool>,
    /// Print per-image resolution detail
    pub verbose: Option<bool>,
}

impl Config {
    pub const DEFAULT_BASE_URL: &'static str = "https://digital-manual.skoda-auto.com";
    pub const DEFAULT_LANGUAGE: &'static str = "nl_NL";
    pub const DEFAULT_TITLE: &'static str = "Manual";
    pub const DEFAULT_TOC_TITLE: &'static str = "Inhoudsopgave";
    pub const DEFAULT_OUTPUT_DIR: &'static str = "manual_output";
    pub const DEFAULT_COOKIES_FILE: &'static str = "cookies.txt";
    pub const DEFAULT_TOPIC_DELAY_MS: u64 = 300;
    pub const DEFAULT_IMAGE_DELAY_MS: u64 = 100;

    /// Load configuration from user and project config files
    pub fn load(project_root: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("manual-mirror/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&project_root.join(".manual-mirror.toml")).unwrap_or_default();

        // Project overrides user
        let merged = user_config.override_with(project_config);
        tracing::debug!(
            base_url = ?merged.base_url,
            root_topic = ?merged.root_topic,
            language = ?merged.language,
            output_dir = ?merged.output_dir,
            "Effective config after merge"
        );
        merged
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present)
    pub fn override_with(self, other: Self) -> Self {
        Config {
            base_url: other.base_url.or(self.base_url),
            root_topic: other.root_topic.or(self.root_topic),
            language: other.language.or(self.language),
            title: other.title.or(self.title),
            toc_title: other.toc_title.or(self.toc_title),
            output_dir: other.output_dir.or(self.output_dir),
            cookies_file: other.cookies_file.or(self.cookies_file),
            topic_delay_ms: other.topic_delay_ms.or(self.topic_delay_ms),
            image_delay_ms: other.image_delay_ms.or(self.image_delay_ms),
            index_topic: other.index_topic.or(self.index_topic),
            quiet: other.quiet.or(self.quiet),
            verbose: other.verbose.or(self.verbose),
        }
    }

    // ===== Accessors with defaults =====

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(Self::DEFAULT_LANGUAGE)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(Self::DEFAULT_TITLE)
    }

    /// Heading of the generated table of contents, in both outputs.
    pub fn toc_title(&self) -> &str {
        self.toc_title.as_deref().unwrap_or(Self::DEFAULT_TOC_TITLE)
    }

    /// Two-letter language for the HTML `lang` attribute (`nl_NL` → `nl`).
    pub fn html_lang(&self) -> &str {
        let lang = self.language();
        lang.split('_').next().unwrap_or(lang)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_OUTPUT_DIR))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir().join("images")
    }

    pub fn cookies_file(&self) -> PathBuf {
        self.cookies_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_COOKIES_FILE))
    }

    pub fn topic_delay(&self) -> Duration {
        Duration::from_millis(self.topic_delay_ms.unwrap_or(Self::DEFAULT_TOPIC_DELAY_MS))
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.image_delay_ms.unwrap_or(Self::DEFAULT_IMAGE_DELAY_MS))
    }

    /// Root index topic skipped during HTML assembly.
    pub fn index_topic(&self) -> &str {
        self.index_topic.as_deref().unwrap_or("Handleiding")
    }

    pub fn quiet(&self) -> bool {
        self.quiet.unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.base_url(), Config::DEFAULT_BASE_URL);
        assert_eq!(cfg.language(), "nl_NL");
        assert_eq!(cfg.html_lang(), "nl");
        assert_eq!(cfg.toc_title(), "Inhoudsopgave");
        assert_eq!(cfg.output_dir(), PathBuf::from("manual_output"));
        assert_eq!(cfg.images_dir(), PathBuf::from("manual_output/images"));
        assert_eq!(cfg.topic_delay(), Duration::from_millis(300));
        assert_eq!(cfg.image_delay(), Duration::from_millis(100));
        assert!(cfg.root_topic.is_none());
    }

    #[test]
    fn test_override_with() {
        let base = Config {
            base_url: Some("https://a.example".into()),
            topic_delay_ms: Some(500),
            ..Default::default()
        };
        let over = Config {
            topic_delay_ms: Some(100),
            root_topic: Some("root123".into()),
            ..Default::default()
        };
        let merged = base.override_with(over);
        assert_eq!(merged.base_url(), "https://a.example");
        assert_eq!(merged.topic_delay(), Duration::from_millis(100));
        assert_eq!(merged.root_topic.as_deref(), Some("root123"));
    }

    #[test]
    fn test_load_file_via_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".manual-mirror.toml"),
            "language = \"en_GB\"\ntopic_delay_ms = 50\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path());
        assert_eq!(cfg.language(), "en_GB");
        assert_eq!(cfg.html_lang(), "en");
        assert_eq!(cfg.topic_delay(), Duration::from_millis(50));
    }
}
