use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum number of archived jobs kept in the config file
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenAI credential and model selection
    pub openai: OpenAiConfig,

    /// Application settings
    pub app: AppConfig,

    /// Archived jobs, newest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key for transcription and summarization
    pub api_key: Option<String>,

    /// Custom base URL for OpenAI-compatible services
    pub base_url: Option<String>,

    /// Whisper model: local name (tiny/base/small/medium/large/turbo)
    /// or API model (whisper-1, gpt-4o-transcribe, gpt-4o-mini-transcribe)
    pub whisper_model: String,

    /// Chat model used for summarization
    pub chat_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for reports and retained artifacts
    pub output_dir: Option<PathBuf>,

    /// Force CPU inference for local Whisper
    pub force_cpu: bool,

    /// Keep downloaded media and extracted audio after success
    pub keep_media: bool,

    /// Language hint for transcription (auto-detect if unset)
    pub language: Option<String>,
}

/// One archived job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    pub status: String,
    pub report_path: Option<PathBuf>,
    pub completed_at: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig {
                api_key: None,
                base_url: None,
                whisper_model: "base".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
            },
            app: AppConfig {
                output_dir: None,
                force_cpu: false,
                keep_media: false,
                language: None,
            },
            history: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs_err::read_to_string(path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("video-digest").join("config.yaml"))
    }

    /// Output directory with fallback to the user's download directory
    pub fn output_dir(&self) -> PathBuf {
        self.app
            .output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// API key, required by the summarizer and the API transcription backend
    pub fn require_api_key(&self) -> Result<&str> {
        self.openai
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| crate::DigestError::MissingCredential.into())
    }

    /// Push a completed job onto the history, newest first, capped
    pub fn add_to_history(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  API Key: {}",
            match &self.openai.api_key {
                Some(k) if k.len() > 8 => format!("{}***", &k[..8]),
                Some(_) => "***".to_string(),
                None => "(not set)".to_string(),
            }
        );
        if let Some(base_url) = &self.openai.base_url {
            println!("  Base URL: {}", base_url);
        }
        println!("  Whisper Model: {}", self.openai.whisper_model);
        println!("  Chat Model: {}", self.openai.chat_model);
        println!("  Output Dir: {}", self.output_dir().display());
        println!("  Force CPU: {}", self.app.force_cpu);
        println!("  Keep Media: {}", self.app.keep_media);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.openai.api_key = Some("sk-test-key".to_string());
        config.openai.whisper_model = "whisper-1".to_string();
        config.openai.chat_model = "gpt-4o".to_string();
        config.app.output_dir = Some(PathBuf::from("/tmp/digests"));
        config.app.force_cpu = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.openai.api_key.as_deref(), Some("sk-test-key"));
        assert_eq!(loaded.openai.whisper_model, "whisper-1");
        assert_eq!(loaded.openai.chat_model, "gpt-4o");
        assert_eq!(loaded.app.output_dir, Some(PathBuf::from("/tmp/digests")));
        assert!(loaded.app.force_cpu);
    }

    #[test]
    fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.openai.whisper_model, "base");
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert!(path.exists());
    }

    #[test]
    fn test_history_capped() {
        let mut config = Config::default();
        for i in 0..60 {
            config.add_to_history(HistoryEntry {
                url: format!("https://example.com/{}", i),
                title: format!("video {}", i),
                status: "succeeded".to_string(),
                report_path: None,
                completed_at: Utc::now(),
            });
        }
        assert_eq!(config.history.len(), HISTORY_LIMIT);
        // Newest first
        assert_eq!(config.history[0].url, "https://example.com/59");
    }

    #[test]
    fn test_require_api_key() {
        let mut config = Config::default();
        assert!(config.require_api_key().is_err());

        config.openai.api_key = Some(String::new());
        assert!(config.require_api_key().is_err());

        config.openai.api_key = Some("sk-abc".to_string());
        assert_eq!(config.require_api_key().unwrap(), "sk-abc");
    }
}
