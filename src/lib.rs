//! Video Digest - a Rust CLI tool that turns a video URL into a structured summary
//!
//! This library chains four external collaborators into one sequential pipeline:
//! yt-dlp (download), ffmpeg (audio extraction), Whisper (transcription, via a
//! local CLI or the OpenAI API) and a chat-completion model (summarization).

pub mod audio;
pub mod cli;
pub mod config;
pub mod download;
pub mod output;
pub mod pipeline;
pub mod summarize;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use pipeline::{Job, JobStatus, PipelineOutcome, Stage, SummaryPipeline};
pub use summarize::Summary;
pub use transcribe::Transcript;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error kinds surfaced by the pipeline stages
#[derive(thiserror::Error, Debug)]
pub enum DigestError {
    #[error("required tool '{0}' was not found on PATH")]
    MissingTool(&'static str),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("unsupported or corrupt media: {0}")]
    UnsupportedMedia(String),

    #[error("audio processing failed: {0}")]
    AudioProcessingFailed(String),

    #[error("audio file is {actual} bytes, over the {limit} byte upload ceiling")]
    OversizedAudio { actual: u64, limit: u64 },

    #[error("no API key configured; pass --api-key or set one in the config file")]
    MissingCredential,

    #[error("API rejected the credential (HTTP 401)")]
    InvalidCredential,

    #[error("API rate limit or quota exceeded (HTTP 429)")]
    RateLimited,

    #[error("malformed API response: {0}")]
    MalformedResponse(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("transcript is empty; nothing to summarize")]
    EmptyTranscript,

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),
}
