use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::{DigestError, Result};

/// Whisper's preferred input: 16 kHz mono
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u32 = 1;

/// Upload ceiling of the OpenAI audio API
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Chunk length for segmented API transcription (just under five minutes,
/// below the point where gpt-4o transcription models silently truncate)
pub const CHUNK_SECONDS: u32 = 298;

/// Trait for the audio extraction stage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract and normalize the audio track of `media` to `target`
    async fn extract(&self, media: &Path, target: &Path) -> Result<PathBuf>;
}

/// Audio processing backed by the ffmpeg / ffprobe command line tools
pub struct FfmpegAudioProcessor;

impl FfmpegAudioProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Audio duration in seconds via ffprobe, 0.0 when it cannot be determined
    pub async fn duration_seconds(&self, path: &Path) -> f64 {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                &path.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let Ok(output) = output else {
            return 0.0;
        };
        if !output.status.success() {
            return 0.0;
        }

        serde_json::from_slice::<serde_json::Value>(&output.stdout)
            .ok()
            .and_then(|info| {
                info["format"]["duration"]
                    .as_str()
                    .and_then(|d| d.parse::<f64>().ok())
            })
            .unwrap_or(0.0)
    }

    /// Re-encode audio as MP3 small enough for the API upload ceiling.
    ///
    /// The bitrate is computed from the duration so the output lands under
    /// `max_bytes`, clamped to 12..=64 kbps (speech stays intelligible down
    /// to 12 kbps and Whisper is robust to heavy compression).
    pub async fn compress_for_upload(
        &self,
        input: &Path,
        output: &Path,
        max_bytes: u64,
    ) -> Result<PathBuf> {
        let duration = self.duration_seconds(input).await;

        let bitrate_kbps = if duration <= 0.0 {
            32
        } else {
            let target_bits = max_bytes.saturating_mul(8) as f64;
            ((target_bits / duration / 1000.0) as u64).clamp(12, 64)
        };

        tracing::info!(
            "Compressing audio for upload at {} kbps ({}s source)",
            bitrate_kbps,
            duration as u64
        );

        self.run_ffmpeg(&[
            "-y",
            "-i",
            &input.to_string_lossy(),
            "-ar",
            &TARGET_SAMPLE_RATE.to_string(),
            "-ac",
            &TARGET_CHANNELS.to_string(),
            "-b:a",
            &format!("{}k", bitrate_kbps),
            &output.to_string_lossy(),
        ])
        .await?;

        Ok(output.to_path_buf())
    }

    /// Split audio into fixed-length MP3 segments for chunked transcription.
    /// Returns the segment paths in playback order.
    pub async fn split(
        &self,
        input: &Path,
        segment_seconds: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs_err::create_dir_all(out_dir)?;
        let pattern = out_dir.join("part%03d.mp3");

        self.run_ffmpeg(&[
            "-y",
            "-i",
            &input.to_string_lossy(),
            "-map",
            "0:a",
            "-ar",
            &TARGET_SAMPLE_RATE.to_string(),
            "-ac",
            &TARGET_CHANNELS.to_string(),
            "-acodec",
            "libmp3lame",
            "-f",
            "segment",
            "-segment_time",
            &segment_seconds.to_string(),
            &pattern.to_string_lossy(),
        ])
        .await?;

        let mut chunks: Vec<PathBuf> = fs_err::read_dir(out_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.starts_with("part") && name.ends_with(".mp3"))
            })
            .collect();
        chunks.sort();

        if chunks.is_empty() {
            return Err(DigestError::AudioProcessingFailed(
                "segmentation produced no output files".to_string(),
            )
            .into());
        }

        Ok(chunks)
    }

    async fn run_ffmpeg(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    anyhow::Error::from(DigestError::MissingTool("ffmpeg"))
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
                .unwrap_or("ffmpeg exited with an error")
                .to_string();

            if stderr.contains("Invalid data found") || stderr.contains("could not find codec") {
                return Err(DigestError::UnsupportedMedia(detail).into());
            }
            return Err(DigestError::AudioProcessingFailed(detail).into());
        }

        Ok(())
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioProcessor {
    async fn extract(&self, media: &Path, target: &Path) -> Result<PathBuf> {
        if !media.is_file() {
            return Err(
                DigestError::UnsupportedMedia(format!("not a readable file: {}", media.display()))
                    .into(),
            );
        }

        tracing::info!(
            "Extracting audio: {} -> {}",
            media.display(),
            target.display()
        );

        self.run_ffmpeg(&[
            "-y",
            "-i",
            &media.to_string_lossy(),
            "-vn",
            "-ar",
            &TARGET_SAMPLE_RATE.to_string(),
            "-ac",
            &TARGET_CHANNELS.to_string(),
            "-acodec",
            "pcm_s16le",
            &target.to_string_lossy(),
        ])
        .await?;

        Ok(target.to_path_buf())
    }
}

impl Default for FfmpegAudioProcessor {
    fn default() -> Self {
        Self::new()
    }
}
