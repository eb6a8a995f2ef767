use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use uuid::Uuid;

use crate::audio::{AudioExtractor, FfmpegAudioProcessor};
use crate::config::Config;
use crate::download::{MediaDownloader, YtDlpDownloader};
use crate::output;
use crate::summarize::{ChatSummarizer, Summarizer, Summary};
use crate::transcribe::{create_transcriber, Transcriber, Transcript};
use crate::{utils, DigestError, Result};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Downloading,
    ExtractingAudio,
    Transcribing,
    Summarizing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Downloading => "downloading",
            Stage::ExtractingAudio => "extracting_audio",
            Stage::Transcribing => "transcribing",
            Stage::Summarizing => "summarizing",
            Stage::Done => "done",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Stage::Pending => "Waiting...",
            Stage::Downloading => "Downloading video...",
            Stage::ExtractingAudio => "Extracting audio...",
            Stage::Transcribing => "Transcribing...",
            Stage::Summarizing => "Summarizing...",
            Stage::Done => "Done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// Intermediate files produced along the way, retained on failure for diagnosis
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub media: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// One end-to-end summarization request
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub stage: Stage,
    pub status: JobStatus,
    pub title: Option<String>,
    pub artifacts: Artifacts,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Stages entered so far, in order
    pub visited: Vec<Stage>,
}

impl Job {
    pub fn new(url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            stage: Stage::Pending,
            status: JobStatus::Pending,
            title: None,
            artifacts: Artifacts::default(),
            error: None,
            created_at: Utc::now(),
            visited: vec![Stage::Pending],
        }
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.status = JobStatus::Running;
        self.visited.push(stage);
        tracing::info!("Job {} entering stage: {}", self.short_id(), stage);
    }

    fn succeed(&mut self) {
        self.stage = Stage::Done;
        self.status = JobStatus::Succeeded;
        self.visited.push(Stage::Done);
    }

    fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
    }
}

/// A pipeline failure tagged with the stage that caused it
#[derive(thiserror::Error, Debug)]
#[error("stage {stage} failed: {cause}")]
pub struct StageError {
    pub stage: Stage,
    pub cause: anyhow::Error,
}

/// Successful pipeline result
#[derive(Debug)]
pub struct PipelineOutcome {
    pub summary: Summary,
    pub transcript: Transcript,
    pub report_path: PathBuf,
}

/// Sequences the four stages over a Job: download, extract, transcribe, summarize
pub struct SummaryPipeline {
    config: Config,
    downloader: Box<dyn MediaDownloader>,
    extractor: Box<dyn AudioExtractor>,
    transcriber: Box<dyn Transcriber>,
    summarizer: Box<dyn Summarizer>,
}

impl SummaryPipeline {
    /// Create a pipeline with the real external adapters
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let transcriber = create_transcriber(&config)?;
        let summarizer = Box::new(ChatSummarizer::new(
            api_key,
            config.openai.base_url.clone(),
            config.openai.chat_model.clone(),
        ));

        Ok(Self {
            config,
            downloader: Box::new(YtDlpDownloader::new()),
            extractor: Box::new(FfmpegAudioProcessor::new()),
            transcriber,
            summarizer,
        })
    }

    /// Create a pipeline with caller-supplied adapters
    pub fn with_adapters(
        config: Config,
        downloader: Box<dyn MediaDownloader>,
        extractor: Box<dyn AudioExtractor>,
        transcriber: Box<dyn Transcriber>,
        summarizer: Box<dyn Summarizer>,
    ) -> Self {
        Self {
            config,
            downloader,
            extractor,
            transcriber,
            summarizer,
        }
    }

    /// Run the full pipeline for a URL
    pub async fn run(&self, url: &str) -> (Job, Result<PipelineOutcome>) {
        let mut job = Job::new(url.to_string());
        let result = self.run_job(&mut job).await;
        (job, result)
    }

    /// Run the stages for an existing job, mutating its state as they complete
    pub async fn run_job(&self, job: &mut Job) -> Result<PipelineOutcome> {
        let result = self.execute(job).await;

        match result {
            Ok(outcome) => {
                job.succeed();
                self.cleanup_artifacts(job);
                Ok(outcome)
            }
            Err(e) => {
                // Artifacts already produced stay on disk for diagnosis
                job.fail(e.to_string());
                Err(StageError {
                    stage: job.stage,
                    cause: e,
                }
                .into())
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<PipelineOutcome> {
        let url = utils::normalize_video_url(&job.url)?;
        let job_dir = self.config.output_dir().join(format!("job_{}", job.short_id()));
        fs_err::create_dir_all(&job_dir)?;

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );

        // 1. Download
        job.enter(Stage::Downloading);
        progress.set_message(Stage::Downloading.message());
        let media = self.downloader.download(&url, &job_dir).await?;
        job.title = media.title.clone();
        job.artifacts.media = Some(media.path.clone());

        // 2. Extract audio
        job.enter(Stage::ExtractingAudio);
        progress.set_message(Stage::ExtractingAudio.message());
        let audio_path = self
            .extractor
            .extract(&media.path, &job_dir.join("audio.wav"))
            .await?;
        job.artifacts.audio = Some(audio_path.clone());

        // 3. Transcribe
        job.enter(Stage::Transcribing);
        progress.set_message(Stage::Transcribing.message());
        let transcript = self
            .transcriber
            .transcribe(&audio_path, self.config.app.language.clone())
            .await?;

        if transcript.text.trim().is_empty() {
            return Err(DigestError::EmptyTranscript.into());
        }

        let transcript_path = job_dir.join("transcript.txt");
        fs_err::write(&transcript_path, &transcript.text)?;
        job.artifacts.transcript = Some(transcript_path);

        // 4. Summarize
        job.enter(Stage::Summarizing);
        progress.set_message(Stage::Summarizing.message());
        let title = media.title.as_deref().unwrap_or("Untitled video");
        let summary = self.summarizer.summarize(&transcript.text, title).await?;

        // 5. Write the report next to the job directory
        let report_path = output::save_report(
            &self.config.output_dir(),
            title,
            &url,
            &summary,
            &transcript.text,
        )?;
        job.artifacts.report = Some(report_path.clone());

        progress.finish_with_message(Stage::Done.message());

        Ok(PipelineOutcome {
            summary,
            transcript,
            report_path,
        })
    }

    /// On success, drop the bulky media and audio files unless configured otherwise
    fn cleanup_artifacts(&self, job: &Job) {
        if self.config.app.keep_media {
            return;
        }

        for path in [&job.artifacts.media, &job.artifacts.audio]
            .into_iter()
            .flatten()
        {
            if let Err(e) = fs_err::remove_file(path) {
                tracing::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioExtractor;
    use crate::download::{DownloadedMedia, MockMediaDownloader};
    use crate::summarize::MockSummarizer;
    use crate::transcribe::MockTranscriber;
    use std::path::Path;

    const URL: &str = "https://www.bilibili.com/video/BV1xx411c7XW";

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.openai.api_key = Some("sk-test".to_string());
        config.app.output_dir = Some(dir.to_path_buf());
        config
    }

    fn media_stub(dir: &Path) -> DownloadedMedia {
        let path = dir.join("source.mp4");
        fs_err::write(&path, b"fake media").unwrap();
        DownloadedMedia {
            path,
            title: Some("Test Video".to_string()),
            duration: Some(60.0),
        }
    }

    fn summary_stub() -> Summary {
        Summary {
            overview: "An overview.".to_string(),
            outline: "An outline.".to_string(),
            takeaways: "A takeaway.".to_string(),
        }
    }

    fn happy_pipeline(dir: &Path) -> SummaryPipeline {
        let dir_owned = dir.to_path_buf();

        let mut downloader = MockMediaDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(move |_, _| Ok(media_stub(&dir_owned)));

        let mut extractor = MockAudioExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_, target| {
                fs_err::write(target, b"fake audio").unwrap();
                Ok(target.to_path_buf())
            });

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(1).returning(|_, _| {
            Ok(Transcript {
                text: "hello world transcript".to_string(),
                language: Some("en".to_string()),
                duration: Some(60.0),
            })
        });

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .times(1)
            .returning(|_, _| Ok(summary_stub()));

        SummaryPipeline::with_adapters(
            test_config(dir),
            Box::new(downloader),
            Box::new(extractor),
            Box::new(transcriber),
            Box::new(summarizer),
        )
    }

    #[tokio::test]
    async fn test_stages_run_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = happy_pipeline(dir.path());

        let (job, result) = pipeline.run(URL).await;
        let outcome = result.unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.stage, Stage::Done);
        assert_eq!(
            job.visited,
            vec![
                Stage::Pending,
                Stage::Downloading,
                Stage::ExtractingAudio,
                Stage::Transcribing,
                Stage::Summarizing,
                Stage::Done,
            ]
        );
        assert_eq!(outcome.summary.overview, "An overview.");
        assert!(outcome.report_path.exists());
        let report = fs_err::read_to_string(&outcome.report_path).unwrap();
        assert!(report.contains("An outline."));
        assert!(report.contains("hello world transcript"));
    }

    #[tokio::test]
    async fn test_extractor_failure_skips_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let dir_owned = dir.path().to_path_buf();

        let mut downloader = MockMediaDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(move |_, _| Ok(media_stub(&dir_owned)));

        let mut extractor = MockAudioExtractor::new();
        extractor.expect_extract().times(1).returning(|_, _| {
            Err(DigestError::UnsupportedMedia("no audio stream".to_string()).into())
        });

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);

        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let pipeline = SummaryPipeline::with_adapters(
            test_config(dir.path()),
            Box::new(downloader),
            Box::new(extractor),
            Box::new(transcriber),
            Box::new(summarizer),
        );

        let (job, result) = pipeline.run(URL).await;
        let err = result.unwrap_err();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.stage, Stage::ExtractingAudio);
        assert!(job.error.as_deref().unwrap().contains("no audio stream"));

        let stage_err = err.downcast_ref::<StageError>().unwrap();
        assert_eq!(stage_err.stage, Stage::ExtractingAudio);

        // The downloaded media is retained for diagnosis
        assert!(job.artifacts.media.unwrap().exists());
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_summarizer() {
        let dir = tempfile::tempdir().unwrap();
        let dir_owned = dir.path().to_path_buf();

        let mut downloader = MockMediaDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(move |_, _| Ok(media_stub(&dir_owned)));

        let mut extractor = MockAudioExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_, target| Ok(target.to_path_buf()));

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(1).returning(|_, _| {
            Ok(Transcript {
                text: "   \n".to_string(),
                language: None,
                duration: None,
            })
        });

        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);

        let pipeline = SummaryPipeline::with_adapters(
            test_config(dir.path()),
            Box::new(downloader),
            Box::new(extractor),
            Box::new(transcriber),
            Box::new(summarizer),
        );

        let (job, result) = pipeline.run(URL).await;

        assert!(result.is_err());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.stage, Stage::Transcribing);
        assert!(job.error.as_deref().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();

        let first = {
            let pipeline = happy_pipeline(dir.path());
            let (job, result) = pipeline.run(URL).await;
            assert!(result.is_ok());
            (job.visited.clone(), job.status)
        };

        let second = {
            let pipeline = happy_pipeline(dir.path());
            let (job, result) = pipeline.run(URL).await;
            assert!(result.is_ok());
            (job.visited.clone(), job.status)
        };

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_download() {
        let dir = tempfile::tempdir().unwrap();

        let mut downloader = MockMediaDownloader::new();
        downloader.expect_download().times(0);

        let pipeline = SummaryPipeline::with_adapters(
            test_config(dir.path()),
            Box::new(downloader),
            Box::new(MockAudioExtractor::new()),
            Box::new(MockTranscriber::new()),
            Box::new(MockSummarizer::new()),
        );

        let (job, result) = pipeline.run("not a url").await;
        assert!(result.is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_success_removes_media_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = happy_pipeline(dir.path());

        let (job, result) = pipeline.run(URL).await;
        assert!(result.is_ok());

        // keep_media defaults to false: bulky intermediates are gone
        assert!(!job.artifacts.media.as_ref().unwrap().exists());
        assert!(!job.artifacts.audio.as_ref().unwrap().exists());
        // transcript and report survive
        assert!(job.artifacts.transcript.as_ref().unwrap().exists());
        assert!(job.artifacts.report.as_ref().unwrap().exists());
    }
}
