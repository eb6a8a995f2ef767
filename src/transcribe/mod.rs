use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;
use crate::Result;

pub mod api;
pub mod local;

pub use api::ApiTranscriber;
pub use local::LocalWhisperTranscriber;

/// Model names served by the OpenAI audio API; everything else is treated as
/// a local Whisper model name or checkpoint path
const API_MODELS: &[&str] = &["whisper-1", "gpt-4o-transcribe", "gpt-4o-mini-transcribe"];

pub fn is_api_model(model: &str) -> bool {
    API_MODELS.contains(&model)
}

/// A completed transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// The transcribed text
    pub text: String,

    /// Language detected or requested
    pub language: Option<String>,

    /// Audio duration in seconds as reported by the backend
    pub duration: Option<f64>,
}

/// Trait for the transcription stage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file, optionally with a language hint
    async fn transcribe(&self, audio: &Path, language: Option<String>) -> Result<Transcript>;
}

/// Pick the transcription backend from the configured model name
pub fn create_transcriber(config: &Config) -> Result<Box<dyn Transcriber>> {
    let model = config.openai.whisper_model.clone();

    if is_api_model(&model) {
        let api_key = config.require_api_key()?.to_string();
        Ok(Box::new(ApiTranscriber::new(
            api_key,
            config.openai.base_url.clone(),
            model,
        )))
    } else {
        Ok(Box::new(LocalWhisperTranscriber::new(
            model,
            config.app.force_cpu,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_api_model() {
        assert!(is_api_model("whisper-1"));
        assert!(is_api_model("gpt-4o-transcribe"));
        assert!(is_api_model("gpt-4o-mini-transcribe"));
        assert!(!is_api_model("base"));
        assert!(!is_api_model("large-v3-turbo"));
        assert!(!is_api_model("/models/custom.pt"));
    }

    #[test]
    fn test_create_transcriber_api_model_needs_key() {
        let mut config = Config::default();
        config.openai.whisper_model = "whisper-1".to_string();
        assert!(create_transcriber(&config).is_err());

        config.openai.api_key = Some("sk-test".to_string());
        assert!(create_transcriber(&config).is_ok());
    }

    #[test]
    fn test_create_transcriber_local_model_needs_no_key() {
        let mut config = Config::default();
        config.openai.whisper_model = "base".to_string();
        assert!(create_transcriber(&config).is_ok());
    }
}
