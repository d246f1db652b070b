//! Single-flight trim jobs.
//!
//! At most one trim runs at a time. A request first takes the slot in
//! [`JobState`] (synchronously, so a concurrent request is rejected with
//! [`TrimError::AlreadyInProgress`] instead of queueing), resolves the video
//! title, and then hands the slot to a background task that downloads, cuts
//! and cleans up. The slot is an RAII guard: it is released exactly once, when
//! the job ends, whether it succeeded, failed or panicked.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{TrimError, TrimResult};
use crate::models::{JobStatus, TrimLaunch, TrimOutcome};
use crate::time::{format_seconds, validate_range};
use crate::video_processor::MediaTools;
use crate::youtube::{normalize_url, sanitize_title};

/// Scratch directory inside the output directory.
pub const TMP_DIR: &str = "tmp";
const SOURCE_FILE: &str = "source.mp4";
const PARTIAL_FILE: &str = "cut.mp4";
const ARTIFACT_EXT: &str = "mp4";
/// URL prefix under which artifacts are served.
pub const DOWNLOADS_ROUTE: &str = "/downloads";

/// A validated trim request.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimRequest {
    source_url: String,
    start_seconds: f64,
    end_seconds: f64,
}

impl TrimRequest {
    pub fn new(raw_url: &str, start_seconds: f64, end_seconds: f64) -> TrimResult<Self> {
        let source_url = normalize_url(raw_url)?;
        validate_range(start_seconds, end_seconds)?;
        Ok(Self {
            source_url,
            start_seconds,
            end_seconds,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_seconds
    }

    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

#[derive(Default)]
struct Slot {
    busy: bool,
    last_artifact: Option<PathBuf>,
    task: Option<JoinHandle<()>>,
}

/// Process-wide job state shared by every caller.
#[derive(Default)]
pub struct JobState {
    slot: Mutex<Slot>,
}

impl JobState {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Slot fields stay consistent even if a holder panicked.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the slot, or fail immediately if a job already holds it.
    pub fn try_acquire(self: &Arc<Self>) -> TrimResult<SlotGuard> {
        let mut slot = self.lock();
        if slot.busy {
            return Err(TrimError::AlreadyInProgress);
        }
        slot.busy = true;
        debug!("Job slot acquired");
        Ok(SlotGuard {
            state: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn last_artifact(&self) -> Option<PathBuf> {
        self.lock().last_artifact.clone()
    }

    fn record_artifact(&self, path: PathBuf) {
        self.lock().last_artifact = Some(path);
    }

    fn set_task(&self, handle: JoinHandle<()>) {
        self.lock().task = Some(handle);
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.lock().task.take()
    }
}

/// Proof of holding the job slot. Dropping it frees the slot.
pub struct SlotGuard {
    state: Arc<JobState>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.lock().busy = false;
        debug!("Job slot released");
    }
}

/// Runs trim jobs against the configured tools and output directory.
#[derive(Clone)]
pub struct TrimJobRunner {
    state: Arc<JobState>,
    tools: Arc<dyn MediaTools>,
    output_dir: PathBuf,
    prune_previous: bool,
    artifact_suffix: String,
}

impl TrimJobRunner {
    pub fn new(tools: Arc<dyn MediaTools>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(JobState::default()),
            tools,
            output_dir: output_dir.into(),
            prune_previous: true,
            artifact_suffix: String::new(),
        }
    }

    /// Leave earlier artifacts in the output directory instead of deleting them.
    pub fn keep_previous_artifacts(mut self) -> Self {
        self.prune_previous = false;
        self
    }

    /// Append `suffix` to the artifact's file stem, after the title.
    pub fn artifact_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.artifact_suffix = suffix.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Start a job and return once its title is known; the heavy work
    /// continues in the background and is observable through [`status`].
    ///
    /// [`status`]: TrimJobRunner::status
    pub async fn launch(&self, request: TrimRequest) -> TrimResult<TrimLaunch> {
        let (guard, title) = self.prepare(&request).await?;

        let job = self.heavy_phase(request, title.clone());
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            match job.execute().await {
                Ok(path) => {
                    info!(artifact = %path.display(), "Background trimming completed");
                    state.record_artifact(path);
                }
                Err(e) => error!(error = %e, title = %job.title, "Error during background video trimming"),
            }
            drop(guard);
        });
        self.state.set_task(handle);

        Ok(TrimLaunch { title })
    }

    /// Run a job to completion in the caller's task.
    pub async fn run(&self, request: TrimRequest) -> TrimResult<TrimOutcome> {
        let (_guard, title) = self.prepare(&request).await?;

        let job = self.heavy_phase(request, title);
        let path = job.execute().await?;
        self.state.record_artifact(path.clone());

        Ok(TrimOutcome {
            title: job.title,
            artifact_url: artifact_url(&path),
            artifact_path: path,
        })
    }

    /// Whether a job is running, and where the newest artifact can be fetched.
    pub async fn status(&self) -> JobStatus {
        let busy = self.state.is_busy();
        let artifact = match self.state.last_artifact() {
            Some(path) => Some(path),
            None => find_artifact(&self.output_dir).await,
        };
        JobStatus {
            busy,
            last_artifact_url: artifact.as_deref().map(artifact_url),
        }
    }

    /// Wait for the background job, if any, to finish.
    pub async fn join_in_flight(&self) {
        if let Some(handle) = self.state.take_task() {
            if let Err(e) = handle.await {
                error!(error = %e, "Background trimming task aborted");
            }
        }
    }

    fn heavy_phase(&self, request: TrimRequest, title: String) -> HeavyPhase {
        HeavyPhase {
            tools: Arc::clone(&self.tools),
            output_dir: self.output_dir.clone(),
            prune_previous: self.prune_previous,
            file_stem: format!("{title}{}", self.artifact_suffix),
            request,
            title,
        }
    }

    async fn prepare(&self, request: &TrimRequest) -> TrimResult<(SlotGuard, String)> {
        let guard = self.state.try_acquire()?;
        info!(
            url = %request.source_url(),
            start = %format_seconds(request.start_seconds()),
            duration = %format_seconds(request.duration()),
            "Starting video trim"
        );

        let raw_title = self.tools.fetch_title(request.source_url()).await?;
        let title = sanitize_title(&raw_title);
        if !title.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(TrimError::TitleResolutionFailed(format!(
                "title {raw_title:?} has no usable characters"
            )));
        }
        info!(%title, "Resolved video title");
        Ok((guard, title))
    }
}

struct HeavyPhase {
    tools: Arc<dyn MediaTools>,
    output_dir: PathBuf,
    prune_previous: bool,
    file_stem: String,
    request: TrimRequest,
    title: String,
}

impl HeavyPhase {
    async fn execute(&self) -> TrimResult<PathBuf> {
        let tmp_dir = self.output_dir.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir).await?;

        let source = tmp_dir.join(SOURCE_FILE);
        let partial = tmp_dir.join(PARTIAL_FILE);
        let result = self.produce(&source, &partial).await;

        remove_if_exists(&source).await;
        remove_if_exists(&partial).await;
        result
    }

    async fn produce(&self, source: &Path, partial: &Path) -> TrimResult<PathBuf> {
        // A leftover source from an interrupted run would make the downloader skip.
        remove_if_exists(source).await;

        info!(url = %self.request.source_url(), "Downloading video");
        self.tools.download(self.request.source_url(), source).await?;

        info!(title = %self.title, "Cutting video");
        self.tools
            .cut(source, self.request.start_seconds(), self.request.duration(), partial)
            .await?;

        let artifact = self.output_dir.join(format!("{}.{ARTIFACT_EXT}", self.file_stem));
        tokio::fs::rename(partial, &artifact).await?;

        if self.prune_previous {
            if let Err(e) = remove_stale_artifacts(&self.output_dir, &artifact).await {
                warn!(error = %e, "Could not clean up previous outputs");
            }
        }
        Ok(artifact)
    }
}

fn is_artifact(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ARTIFACT_EXT)
}

/// Delete every artifact in `dir` except `keep`. Subdirectories are left alone.
async fn remove_stale_artifacts(dir: &Path, keep: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() || !is_artifact(&path) || path == keep {
            continue;
        }
        tokio::fs::remove_file(&path).await?;
        info!(file = %path.display(), "Deleted old file");
    }
    Ok(())
}

/// First artifact in `dir` by name, if any.
async fn find_artifact(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && is_artifact(&path) {
            found.push(path);
        }
    }
    found.sort();
    found.into_iter().next()
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Could not remove temporary file"),
    }
}

pub fn artifact_url(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    format!("{DOWNLOADS_ROUTE}/{name}")
}
