use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_digest::cli::{Cli, Commands};
use video_digest::config::{Config, HistoryEntry};
use video_digest::pipeline::SummaryPipeline;
use video_digest::{transcribe, utils};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_digest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Run {
            url,
            api_key,
            base_url,
            output_dir,
            whisper_model,
            chat_model,
            language,
            cpu,
            keep_media,
        } => {
            // CLI settings are persisted so the next run picks them up
            let mut dirty = false;
            if let Some(key) = api_key {
                config.openai.api_key = Some(key);
                dirty = true;
            }
            if let Some(base) = base_url {
                config.openai.base_url = Some(base);
                dirty = true;
            }
            if let Some(dir) = output_dir {
                config.app.output_dir = Some(dir);
                dirty = true;
            }
            if let Some(model) = whisper_model {
                config.openai.whisper_model = model;
                dirty = true;
            }
            if let Some(model) = chat_model {
                config.openai.chat_model = model;
                dirty = true;
            }
            if let Some(lang) = language {
                config.app.language = Some(lang);
                dirty = true;
            }
            if cpu {
                config.app.force_cpu = true;
                dirty = true;
            }
            if keep_media {
                config.app.keep_media = true;
                dirty = true;
            }
            if dirty {
                config.save()?;
            }

            // Non-fatal PATH check: tools may still resolve at runtime
            let local_whisper = !transcribe::is_api_model(&config.openai.whisper_model);
            let missing_deps = utils::check_dependencies(local_whisper).await;
            if !missing_deps.is_empty() {
                eprintln!("Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("  - {}", dep);
                }
                eprintln!("  (continuing anyway)");
            }

            tracing::info!("Starting pipeline for: {}", url);

            let pipeline = SummaryPipeline::new(config.clone())?;
            let (job, result) = pipeline.run(&url).await;

            config.add_to_history(HistoryEntry {
                url: job.url.clone(),
                title: job.title.clone().unwrap_or_else(|| "Unknown".to_string()),
                status: job.status.as_str().to_string(),
                report_path: job.artifacts.report.clone(),
                completed_at: chrono::Utc::now(),
            });
            config.save()?;

            let outcome = result?;

            println!();
            println!("{}", console::style("Summary").bold());
            println!();
            println!("{}", outcome.summary.overview);
            println!();
            println!("Report saved to: {}", outcome.report_path.display());
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file:");
                println!("  {}", Config::config_path()?.display());
                println!("Edit it directly, or pass settings to `vdigest run` to persist them.");
            }
        }
        Commands::History { clear } => {
            if clear {
                config.history.clear();
                config.save()?;
                println!("History cleared.");
            } else if config.history.is_empty() {
                println!("No jobs recorded yet.");
            } else {
                for entry in &config.history {
                    println!(
                        "[{}] {} - {} ({})",
                        entry.completed_at.format("%Y-%m-%d %H:%M"),
                        entry.status,
                        entry.title,
                        entry.url
                    );
                }
            }
        }
    }

    Ok(())
}
