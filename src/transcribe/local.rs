use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{Transcriber, Transcript};
use crate::{DigestError, Result};

/// Transcription backend using the openai-whisper command line tool
pub struct LocalWhisperTranscriber {
    whisper_path: String,
    model: String,
    force_cpu: bool,
}

impl LocalWhisperTranscriber {
    pub fn new(model: String, force_cpu: bool) -> Self {
        // The PyPI package spells it large-v3-turbo; accept the short alias
        let model = if model == "turbo" {
            "large-v3-turbo".to_string()
        } else {
            model
        };

        Self {
            whisper_path: "whisper".to_string(),
            model,
            force_cpu,
        }
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    async fn transcribe(&self, audio: &Path, language: Option<String>) -> Result<Transcript> {
        let out_dir = audio.parent().unwrap_or_else(|| Path::new("."));

        let mut cmd = Command::new(&self.whisper_path);
        cmd.arg(audio)
            .args(["--model", &self.model])
            .args(["--output_format", "txt"])
            .args(["--output_dir", &out_dir.to_string_lossy()])
            .args(["--verbose", "False"]);

        if let Some(lang) = &language {
            cmd.args(["--language", lang]);
        }
        if self.force_cpu {
            cmd.args(["--device", "cpu"]);
        }

        tracing::info!(
            "Running local Whisper (model: {}, device: {})",
            self.model,
            if self.force_cpu { "cpu" } else { "auto" }
        );

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    anyhow::Error::from(DigestError::MissingTool("whisper"))
                } else {
                    anyhow::Error::from(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("whisper exited with an error")
                .to_string();
            return Err(DigestError::TranscriptionFailed(detail).into());
        }

        // The CLI writes <audio stem>.txt next to the requested output dir
        let transcript_path = out_dir.join(format!(
            "{}.txt",
            audio
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("audio")
        ));

        let text = fs_err::read_to_string(&transcript_path).map_err(|e| {
            DigestError::TranscriptionFailed(format!(
                "whisper produced no transcript at {}: {}",
                transcript_path.display(),
                e
            ))
        })?;

        Ok(Transcript {
            text: text.trim().to_string(),
            language,
            duration: None,
        })
    }
}
