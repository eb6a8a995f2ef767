use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::summarize::Summary;
use crate::utils::sanitize_filename;

/// Render the final Markdown report
pub fn render_report(title: &str, url: &str, summary: &Summary, transcript: &str) -> String {
    format!(
        "# {title}\n\n\
**URL**: {url}\n\
**Date**: {date}\n\n\
## Overview\n\n{overview}\n\n\
## Outline\n\n{outline}\n\n\
## Key Takeaways\n\n{takeaways}\n\n\
---\n\n\
## Transcript\n\n{transcript}\n",
        date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        overview = summary.overview,
        outline = summary.outline,
        takeaways = summary.takeaways,
    )
}

/// Write the report into `output_dir`, deriving the filename from the title
/// and appending a timestamp rather than overwriting an existing report
pub fn save_report(
    output_dir: &Path,
    title: &str,
    url: &str,
    summary: &Summary,
    transcript: &str,
) -> Result<PathBuf> {
    fs_err::create_dir_all(output_dir)?;

    let safe_title = sanitize_filename(title);
    let mut path = output_dir.join(format!("{}.md", safe_title));

    if path.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        path = output_dir.join(format!("{}_{}.md", safe_title, timestamp));
    }

    let content = render_report(title, url, summary, transcript);
    fs_err::write(&path, content)?;

    tracing::info!("Report saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> Summary {
        Summary {
            overview: "A short overview.".to_string(),
            outline: "- one\n- two".to_string(),
            takeaways: "Learn things.".to_string(),
        }
    }

    #[test]
    fn test_render_report_contains_all_sections() {
        let report = render_report(
            "My Video",
            "https://example.com/v",
            &sample_summary(),
            "the transcript",
        );
        assert!(report.starts_with("# My Video"));
        assert!(report.contains("**URL**: https://example.com/v"));
        assert!(report.contains("## Overview\n\nA short overview."));
        assert!(report.contains("## Outline\n\n- one\n- two"));
        assert!(report.contains("## Key Takeaways\n\nLearn things."));
        assert!(report.contains("## Transcript\n\nthe transcript"));
    }

    #[test]
    fn test_save_report_avoids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let summary = sample_summary();

        let first = save_report(dir.path(), "Video: One?", "u", &summary, "t").unwrap();
        assert!(first.exists());
        // Punctuation is sanitized out of the filename
        assert_eq!(first.file_name().unwrap(), "Video_ One_.md");

        let second = save_report(dir.path(), "Video: One?", "u", &summary, "t").unwrap();
        assert!(second.exists());
        assert_ne!(first, second);
    }
}
