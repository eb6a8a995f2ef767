use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::multipart;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{Transcriber, Transcript};
use crate::audio::{FfmpegAudioProcessor, CHUNK_SECONDS, MAX_UPLOAD_BYTES};
use crate::{DigestError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// In-flight chunk uploads; kept low to stay clear of API rate limits
const CHUNK_CONCURRENCY: usize = 4;

/// Transcription backend using the OpenAI audio API
pub struct ApiTranscriber {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    audio: FfmpegAudioProcessor,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    language: Option<String>,
    duration: Option<f64>,
}

impl ApiTranscriber {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            audio: FfmpegAudioProcessor::new(),
        }
    }

    /// Compress the audio when it exceeds the API upload ceiling.
    /// Returns the path to upload, which may be the original.
    async fn fit_under_ceiling(&self, audio_path: &Path) -> Result<PathBuf> {
        let size = fs_err::metadata(audio_path)?.len();
        if size <= MAX_UPLOAD_BYTES {
            return Ok(audio_path.to_path_buf());
        }

        tracing::info!(
            "Audio is {} bytes, compressing to fit the {} byte API ceiling",
            size,
            MAX_UPLOAD_BYTES
        );

        let compressed = audio_path.with_file_name("compressed.mp3");
        self.audio
            .compress_for_upload(audio_path, &compressed, MAX_UPLOAD_BYTES)
            .await?;

        let new_size = fs_err::metadata(&compressed)?.len();
        if new_size > MAX_UPLOAD_BYTES {
            return Err(DigestError::OversizedAudio {
                actual: new_size,
                limit: MAX_UPLOAD_BYTES,
            }
            .into());
        }

        Ok(compressed)
    }

    /// Upload one audio file and return its transcription
    async fn transcribe_file(
        &self,
        path: &Path,
        model: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResponse> {
        let bytes = fs_err::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mut form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name))
            .text("model", model.to_string())
            .text("response_format", "json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DigestError::TranscriptionFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DigestError::InvalidCredential.into());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DigestError::RateLimited.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                DigestError::TranscriptionFailed(format!("HTTP {}: {}", status, body)).into(),
            );
        }

        let body = response
            .text()
            .await
            .map_err(|e| DigestError::MalformedResponse(e.to_string()))?;

        serde_json::from_str(&body)
            .map_err(|e| DigestError::MalformedResponse(format!("{}: {}", e, body)).into())
    }

    /// Split long audio into segments and transcribe them with bounded
    /// parallelism, reassembling the text in playback order
    async fn transcribe_chunked(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<Transcript> {
        let chunk_dir = audio_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("chunks");

        let chunks = self
            .audio
            .split(audio_path, CHUNK_SECONDS, &chunk_dir)
            .await?;
        tracing::info!("Audio split into {} segments for transcription", chunks.len());

        let progress = ProgressBar::new(chunks.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments")
                .unwrap(),
        );

        let texts: Vec<String> = stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let progress = progress.clone();
                async move {
                    let part = self.transcribe_file(&chunk, &self.model, language).await?;
                    progress.inc(1);
                    Ok::<_, anyhow::Error>(part.text)
                }
            })
            .buffered(CHUNK_CONCURRENCY)
            .try_collect()
            .await?;

        progress.finish_and_clear();

        for chunk in &chunks {
            let _ = fs_err::remove_file(chunk);
        }
        let _ = fs_err::remove_dir(&chunk_dir);

        Ok(Transcript {
            text: texts.join("\n\n"),
            language: language.map(|l| l.to_string()),
            duration: None,
        })
    }
}

#[async_trait]
impl Transcriber for ApiTranscriber {
    async fn transcribe(&self, audio: &Path, language: Option<String>) -> Result<Transcript> {
        let language = language.as_deref();
        let upload_path = self.fit_under_ceiling(audio).await?;

        // Long audio goes through segmented transcription; gpt-4o transcription
        // models silently truncate past roughly five minutes of input
        let duration = self.audio.duration_seconds(&upload_path).await;
        if duration > CHUNK_SECONDS as f64 {
            tracing::info!(
                "Audio runs {}s, switching to segmented transcription",
                duration as u64
            );
            return self.transcribe_chunked(&upload_path, language).await;
        }

        tracing::info!("Uploading audio for transcription (model: {})", self.model);

        let response = match self.transcribe_file(&upload_path, &self.model, language).await {
            Ok(response) => response,
            Err(e) if self.model != "whisper-1" && !is_credential_error(&e) => {
                // The gpt-4o transcription endpoints reject some inputs that
                // whisper-1 accepts; retry once on the general model
                tracing::warn!("Model {} failed ({}), retrying with whisper-1", self.model, e);
                self.transcribe_file(&upload_path, "whisper-1", language)
                    .await?
            }
            Err(e) => return Err(e),
        };

        Ok(Transcript {
            text: response.text,
            language: response.language.or_else(|| language.map(|l| l.to_string())),
            duration: response.duration,
        })
    }
}

fn is_credential_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DigestError>(),
        Some(DigestError::InvalidCredential) | Some(DigestError::MissingCredential)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let t = ApiTranscriber::new(
            "sk-test".to_string(),
            Some("https://proxy.example.com/v1/".to_string()),
            "whisper-1".to_string(),
        );
        assert_eq!(t.base_url, "https://proxy.example.com/v1");

        let t = ApiTranscriber::new("sk-test".to_string(), None, "whisper-1".to_string());
        assert_eq!(t.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_transcription_response_parsing() {
        let full: TranscriptionResponse = serde_json::from_str(
            r#"{"text": "hello world", "language": "english", "duration": 4.2}"#,
        )
        .unwrap();
        assert_eq!(full.text, "hello world");
        assert_eq!(full.language.as_deref(), Some("english"));

        // gpt-4o models return bare json with only the text field
        let bare: TranscriptionResponse = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(bare.text, "hi");
        assert!(bare.language.is_none());
    }

    #[test]
    fn test_is_credential_error() {
        assert!(is_credential_error(&DigestError::InvalidCredential.into()));
        assert!(!is_credential_error(&DigestError::RateLimited.into()));
        assert!(!is_credential_error(&anyhow::anyhow!("other")));
    }
}
