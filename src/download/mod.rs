use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::{DigestError, Result};

/// A media file downloaded from a video platform
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    /// Local path of the downloaded media file
    pub path: PathBuf,

    /// Title reported by the platform
    pub title: Option<String>,

    /// Duration in seconds if known
    pub duration: Option<f64>,
}

/// Trait for the download stage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Download the media behind a URL into `dest_dir`
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<DownloadedMedia>;
}

/// Downloader backed by the yt-dlp command line tool
pub struct YtDlpDownloader {
    yt_dlp_path: String,
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Get video metadata using yt-dlp without downloading
    async fn probe(&self, url: &str) -> Result<Value> {
        tracing::debug!("Probing video metadata for: {}", url);

        let output = self
            .run_yt_dlp(&["--dump-json", "--no-playlist", url])
            .await?;

        let info: Value = serde_json::from_slice(&output)
            .map_err(|e| DigestError::DownloadFailed(format!("unreadable metadata: {}", e)))?;

        Ok(info)
    }

    async fn run_yt_dlp(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    anyhow::Error::from(DigestError::MissingTool("yt-dlp"))
                } else {
                    anyhow::Error::from(e)
                }
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(DigestError::DownloadFailed(last_lines(&error, 3)).into());
        }

        Ok(output.stdout)
    }

    /// Locate the file yt-dlp wrote under `dest_dir` for the `source.%(ext)s` template
    fn find_downloaded_file(dest_dir: &Path) -> Result<PathBuf> {
        for entry in fs_err::read_dir(dest_dir)? {
            let path = entry?.path();
            if path.is_file()
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem == "source")
            {
                return Ok(path);
            }
        }

        Err(DigestError::DownloadFailed(
            "yt-dlp reported success but no media file was written".to_string(),
        )
        .into())
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<DownloadedMedia> {
        fs_err::create_dir_all(dest_dir)?;

        // Metadata first so a failed probe surfaces before any bytes move
        let info = self.probe(url).await?;
        let title = info["title"].as_str().map(|s| s.to_string());
        let duration = info["duration"].as_f64();

        if let Some(t) = &title {
            tracing::info!("Downloading \"{}\"", t);
        }

        let template = dest_dir.join("source.%(ext)s");
        self.run_yt_dlp(&[
            "--output",
            &template.to_string_lossy(),
            "--format",
            "best",
            "--no-playlist",
            "--no-warnings",
            url,
        ])
        .await?;

        let path = Self::find_downloaded_file(dest_dir)?;
        tracing::info!("Download complete: {}", path.display());

        Ok(DownloadedMedia {
            path,
            title,
            duration,
        })
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(last_lines("a", 3), "a");
        assert_eq!(last_lines("a\n\n\nb", 5), "a\nb");
    }

    #[test]
    fn test_find_downloaded_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(YtDlpDownloader::find_downloaded_file(dir.path()).is_err());

        fs_err::write(dir.path().join("source.mp4"), b"x").unwrap();
        let found = YtDlpDownloader::find_downloaded_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "source.mp4");
    }
}
