use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{TrimError, TrimResult};
use crate::time::format_seconds;

/// How many trailing stderr lines are kept in a failure message.
const STDERR_TAIL_LINES: usize = 5;

/// The external downloader and cutter the trim pipeline drives.
#[async_trait]
pub trait MediaTools: Send + Sync + 'static {
    /// Raw title as reported by the downloader.
    async fn fetch_title(&self, url: &str) -> TrimResult<String>;

    /// Download a merged audio+video file for `url` to `output`.
    async fn download(&self, url: &str, output: &Path) -> TrimResult<()>;

    /// Stream-copy `duration` seconds starting at `start` from `input` into `output`.
    async fn cut(&self, input: &Path, start: f64, duration: f64, output: &Path) -> TrimResult<()>;
}

/// `yt-dlp` + `ffmpeg` run as child processes.
#[derive(Debug, Clone)]
pub struct CommandLineTools {
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
}

impl CommandLineTools {
    pub fn new(ytdlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[async_trait]
impl MediaTools for CommandLineTools {
    async fn fetch_title(&self, url: &str) -> TrimResult<String> {
        let mut cmd = Command::new(&self.ytdlp);
        cmd.arg("--get-title").arg("--no-playlist").arg(url);

        let output = run(cmd).await.map_err(|e| TrimError::TitleResolutionFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(TrimError::TitleResolutionFailed(failure_message(&output)));
        }

        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Err(TrimError::TitleResolutionFailed("yt-dlp reported an empty title".into()));
        }
        Ok(title)
    }

    async fn download(&self, url: &str, output: &Path) -> TrimResult<()> {
        let mut cmd = Command::new(&self.ytdlp);
        cmd.args(["-f", "bestvideo+bestaudio", "--merge-output-format", "mp4", "--no-playlist"])
            .arg(url)
            .arg("-o")
            .arg(output);

        let result = run(cmd).await.map_err(|e| TrimError::DownloadFailed(e.to_string()))?;
        if !result.status.success() {
            return Err(TrimError::DownloadFailed(failure_message(&result)));
        }
        if !output.is_file() {
            return Err(TrimError::DownloadFailed(format!(
                "yt-dlp exited cleanly but {} was not produced",
                output.display()
            )));
        }
        Ok(())
    }

    async fn cut(&self, input: &Path, start: f64, duration: f64, output: &Path) -> TrimResult<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(input)
            .arg("-ss")
            .arg(format_seconds(start))
            .arg("-t")
            .arg(format_seconds(duration))
            .args(["-c", "copy"])
            .arg(output);

        let result = run(cmd).await.map_err(|e| TrimError::CutFailed(e.to_string()))?;
        if !result.status.success() {
            return Err(TrimError::CutFailed(failure_message(&result)));
        }
        if !output.is_file() {
            return Err(TrimError::CutFailed(format!(
                "ffmpeg exited cleanly but {} was not produced",
                output.display()
            )));
        }
        Ok(())
    }
}

async fn run(mut cmd: Command) -> std::io::Result<Output> {
    debug!(command = ?cmd.as_std(), "Executing command");
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    debug!(
        status = %output.status,
        stdout = %String::from_utf8_lossy(&output.stdout),
        stderr = %String::from_utf8_lossy(&output.stderr),
        "Command finished"
    );
    Ok(output)
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        format!("exited with {}", output.status)
    } else {
        format!("exited with {}: {}", output.status, tail)
    }
}
