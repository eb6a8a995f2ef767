use anyhow::Result;
use url::Url;

/// Normalize user input into a downloadable URL.
///
/// Accepts full http(s) URLs as well as bare Bilibili identifiers
/// (`BV1xx411c7XW`, `av170001`), which are expanded to full video URLs.
pub fn normalize_video_url(input: &str) -> Result<String> {
    let input = input.trim();

    if input.is_empty() {
        anyhow::bail!("URL must not be empty");
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        let parsed =
            Url::parse(input).map_err(|_| anyhow::anyhow!("Invalid URL format: {}", input))?;
        return Ok(parsed.to_string());
    }

    // Bare Bilibili ids
    if is_bilibili_bv(input) || is_bilibili_av(input) {
        return Ok(format!("https://www.bilibili.com/video/{}", input));
    }

    if input.contains("://") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    anyhow::bail!("Not a valid URL or Bilibili video id: {}", input)
}

fn is_bilibili_bv(input: &str) -> bool {
    input.is_ascii()
        && input.len() == 12
        && input[..2].eq_ignore_ascii_case("bv")
        && input[2..].chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_bilibili_av(input: &str) -> bool {
    input.is_ascii()
        && input.len() > 2
        && input[..2].eq_ignore_ascii_case("av")
        && input[2..].chars().all(|c| c.is_ascii_digit())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect();

    let trimmed = sanitized.trim();

    // Cap at 50 chars so yt-dlp output templates stay well under PATH_MAX
    let capped: String = trimmed.chars().take(50).collect();

    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped
    }
}

/// Check if the current environment has required tools
pub async fn check_dependencies(local_whisper: bool) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for video download".to_string());
    }

    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio extraction".to_string());
    }

    if !check_command_available("ffprobe").await {
        missing.push("ffprobe - required for media inspection".to_string());
    }

    if local_whisper && !check_command_available("whisper").await {
        missing.push("whisper - required for local transcription".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename("???"), "___");
        assert_eq!(sanitize_filename(""), "untitled");
    }

    #[test]
    fn test_normalize_video_url() {
        assert_eq!(
            normalize_video_url("BV1xx411c7XW").unwrap(),
            "https://www.bilibili.com/video/BV1xx411c7XW"
        );
        assert_eq!(
            normalize_video_url("av170001").unwrap(),
            "https://www.bilibili.com/video/av170001"
        );
        assert_eq!(
            normalize_video_url("https://www.youtube.com/watch?v=abc").unwrap(),
            "https://www.youtube.com/watch?v=abc"
        );
        assert!(normalize_video_url("ftp://example.com/video").is_err());
        assert!(normalize_video_url("not a url").is_err());
        assert!(normalize_video_url("").is_err());
    }
}
