use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vdigest",
    about = "Video Digest - download, transcribe and summarize a video in one command",
    version,
    long_about = "A CLI tool that downloads a video with yt-dlp, extracts and normalizes \
its audio with ffmpeg, transcribes it with Whisper (local CLI or OpenAI API), and asks a \
chat-completion model for a structured three-section summary."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline for a video URL (or bare Bilibili BV/av id)
    Run {
        /// Video URL or Bilibili BV/av identifier
        #[arg(value_name = "URL")]
        url: String,

        /// OpenAI API key (persisted to the config file)
        #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY")]
        api_key: Option<String>,

        /// Custom API base URL for OpenAI-compatible services
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Directory for the report and retained artifacts (persisted)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Whisper model: local model name (tiny/base/small/...) or an API
        /// model (whisper-1, gpt-4o-transcribe, gpt-4o-mini-transcribe)
        #[arg(long, value_name = "MODEL")]
        whisper_model: Option<String>,

        /// Chat model used for summarization (persisted)
        #[arg(long, value_name = "MODEL")]
        chat_model: Option<String>,

        /// Language hint for transcription (auto-detect if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Force CPU inference for local Whisper
        #[arg(long)]
        cpu: bool,

        /// Keep the downloaded media and extracted audio after success
        #[arg(long)]
        keep_media: bool,
    },

    /// Show or locate the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List completed jobs
    History {
        /// Clear the job history
        #[arg(long)]
        clear: bool,
    },
}
