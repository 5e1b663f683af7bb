//! Render job controller
//!
//! A [`JobManager`] owns at most one render at a time. A render goes through
//! `Planning` (music placement, filter graph, command line) and `Encoding` (ffmpeg running)
//! before ending `Completed`, `Failed` or `Cancelled`. Cancellation is checked between music
//! tracks while planning and kills the ffmpeg process tree while encoding.

use crate::audio;
use crate::ffmpeg::{self, FfprobeProbe};
use crate::graph::{FilterGraph, DEFAULT_FPS};
use crate::invocation::{self, Invocation, DEFAULT_INLINE_LIMIT};
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::{Error, RenderRequest, RenderSpec, Result};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tunables shared by every render of a manager
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Overlap between consecutive music tracks, in seconds
    pub crossfade_secs: f64,
    /// Longest command line passed inline; longer filter graphs go to a script file
    pub inline_limit: usize,
    /// How often the exit status of ffmpeg is polled
    pub poll_interval: Duration,
    /// Frame rate of the output
    pub fps: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            crossfade_secs: audio::DEFAULT_CROSSFADE_SECS,
            inline_limit: DEFAULT_INLINE_LIMIT,
            poll_interval: Duration::from_millis(25),
            fps: DEFAULT_FPS,
        }
    }
}

/// Lifecycle of the current job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Planning,
    Encoding,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Planning | JobState::Encoding)
    }
}

/// Outcome as reported to the user interface
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl From<&Result<PathBuf>> for RenderResult {
    fn from(outcome: &Result<PathBuf>) -> Self {
        match outcome {
            Ok(path) => Self {
                success: true,
                output_path: Some(path.clone()),
                error_message: None,
            },
            Err(e) => Self {
                success: false,
                output_path: None,
                error_message: Some(e.user_message()),
            },
        }
    }
}

struct Slot {
    state: JobState,
    child: Option<Child>,
}

struct Shared {
    slot: Mutex<Slot>,
    cancelled: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Running render
#[derive(Debug)]
pub struct JobHandle {
    thread: JoinHandle<Result<PathBuf>>,
}

impl JobHandle {
    /// Block until the render ends
    pub fn wait(self) -> Result<PathBuf> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(Error::Spawn("render thread panicked".to_string())))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Single-slot render controller
#[derive(Clone)]
pub struct JobManager {
    shared: Arc<Shared>,
    config: JobConfig,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(JobConfig::default())
    }
}

impl JobManager {
    pub fn new(config: JobConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: JobState::Idle,
                    child: None,
                }),
                cancelled: AtomicBool::new(false),
            }),
            config,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// State of the current or last job
    pub fn state(&self) -> JobState {
        self.shared.lock().state
    }

    /// Start a render in the background.
    ///
    /// Invalid requests are rejected here, before anything touches the disk. Fails with
    /// [`Error::JobRunning`] while another job is planning or encoding.
    #[tracing::instrument(skip_all, fields(photos = request.photos.len(), tracks = request.music.len()))]
    pub fn start<F>(&self, request: RenderRequest, on_progress: F) -> Result<JobHandle>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        request.validate()?;

        {
            let mut slot = self.shared.lock();
            if slot.state.is_active() {
                return Err(Error::JobRunning);
            }
            if slot.state != JobState::Idle {
                tracing::debug!(previous = ?slot.state, "resetting finished job");
            }
            slot.state = JobState::Planning;
            slot.child = None;
            self.shared.cancelled.store(false, Ordering::SeqCst);
        }
        tracing::info!("render planning");

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let thread = thread::Builder::new()
            .name("caoba-render".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run(&shared, &config, &request, on_progress)
                }))
                .unwrap_or_else(|_| {
                    kill_child(&shared);
                    Err(Error::Spawn("render thread panicked".to_string()))
                });
                finish(&shared, outcome)
            });

        match thread {
            Ok(thread) => Ok(JobHandle { thread }),
            Err(e) => {
                self.shared.lock().state = JobState::Failed;
                Err(Error::Spawn(format!("failed to start render thread: {}", e)))
            }
        }
    }

    /// Start a render and wait for it
    pub fn render<F>(&self, request: RenderRequest, on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        self.start(request, on_progress)?.wait()
    }

    /// Request cancellation of the current job.
    ///
    /// Returns once ffmpeg has been signalled; it does not wait for the process to exit.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let slot = self.shared.lock();
        if let Some(child) = slot.child.as_ref() {
            tracing::info!(pid = child.id(), "cancelling render, killing ffmpeg");
            ffmpeg::terminate(child.id());
        } else if slot.state.is_active() {
            tracing::info!("cancelling render while planning");
        }
    }
}

fn finish(shared: &Shared, outcome: Result<PathBuf>) -> Result<PathBuf> {
    let outcome = match outcome {
        Err(e) if shared.is_cancelled() && !e.is_cancelled() => {
            tracing::debug!(error = %e, "error superseded by cancellation");
            Err(Error::Cancelled)
        }
        other => other,
    };

    let state = match &outcome {
        Ok(_) => JobState::Completed,
        Err(Error::Cancelled) => JobState::Cancelled,
        Err(_) => JobState::Failed,
    };

    match &outcome {
        Ok(path) => tracing::info!(output = %path.display(), "render completed"),
        Err(Error::Cancelled) => tracing::info!("render cancelled"),
        Err(Error::Encoding { status, log }) => {
            tracing::error!(?status, "ffmpeg failed, full log follows\n{}", log)
        }
        Err(e) => tracing::error!(error = %e, "render failed"),
    }

    let mut slot = shared.lock();
    slot.state = state;
    slot.child = None;
    outcome
}

/// Directory holding the photos; ffmpeg runs there and temp files go there
fn work_dir(request: &RenderRequest) -> PathBuf {
    request
        .photos
        .first()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn remove_existing_output(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(output = %path.display(), "removed existing output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn run<F>(shared: &Shared, config: &JobConfig, request: &RenderRequest, on_progress: F) -> Result<PathBuf>
where
    F: FnMut(ProgressEvent),
{
    let work_dir = work_dir(request);
    invocation::remove_stale_artifacts(&work_dir);
    remove_existing_output(&request.destination)?;

    let ffmpeg = ffmpeg::find_ffmpeg(request.ffmpeg_path.as_deref())?;

    let audio_plan = if request.music.is_empty() {
        Vec::new()
    } else {
        let ffprobe = ffmpeg::find_ffprobe(request.ffprobe_path.as_deref(), Some(ffmpeg.as_str()))?;
        audio::plan(
            &request.music,
            request.seconds_per_photo,
            config.crossfade_secs,
            &FfprobeProbe::new(ffprobe),
            &shared.cancelled,
        )?
    };

    let spec = request.spec(audio_plan);
    let graph = FilterGraph::build(&spec, config.crossfade_secs, config.fps)?;
    let invocation = Invocation::build(&spec, &graph, &work_dir, config.inline_limit)?;
    tracing::debug!(graph = %graph, "filter graph");
    tracing::debug!(command = %invocation.display(&ffmpeg), "ffmpeg invocation");

    // the invocation owns the filter script; it is removed when this returns
    encode(shared, config, &ffmpeg, &invocation, &spec, on_progress)
}

fn encode<F>(
    shared: &Shared,
    config: &JobConfig,
    ffmpeg: &str,
    invocation: &Invocation,
    spec: &RenderSpec,
    mut on_progress: F,
) -> Result<PathBuf>
where
    F: FnMut(ProgressEvent),
{
    let mut cmd = Command::new(ffmpeg);
    cmd.args(invocation.args())
        .current_dir(invocation.work_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // own process group so cancellation reaches anything ffmpeg spawns
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let stderr = {
        let mut slot = shared.lock();
        if shared.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(_) if shared.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => return Err(Error::Spawn(format!("{}: {}", ffmpeg, e))),
        };
        let stderr = child.stderr.take();
        tracing::info!(pid = child.id(), "render encoding");
        slot.child = Some(child);
        slot.state = JobState::Encoding;
        stderr
    };

    let mut tracker = ProgressTracker::new(spec.total_secs, &spec.photos);
    if let Some(mut stderr) = stderr {
        let mut buf = [0u8; 4096];
        loop {
            match stderr.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(event) = tracker.feed(&buf[..n]) {
                        on_progress(event);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "lost ffmpeg stderr");
                    break;
                }
            }
        }
    }
    if let Some(event) = tracker.finish() {
        on_progress(event);
    }

    let status = wait_for_exit(shared, config.poll_interval)?;
    tracing::debug!(%status, "ffmpeg exited");

    if shared.is_cancelled() {
        Err(Error::Cancelled)
    } else if status.success() {
        on_progress(tracker.completed());
        Ok(spec.output.clone())
    } else {
        Err(Error::Encoding {
            status: status.code(),
            log: tracker.log(),
        })
    }
}

/// Kill and reap a child left behind by an aborted render
fn kill_child(shared: &Shared) {
    let mut slot = shared.lock();
    if let Some(mut child) = slot.child.take() {
        tracing::warn!(pid = child.id(), "render aborted, killing ffmpeg");
        ffmpeg::terminate(child.id());
        if let Err(e) = child.wait() {
            tracing::warn!(error = %e, "failed to reap ffmpeg");
        }
    }
}

/// Poll until ffmpeg exits, releasing the slot between polls so `cancel` can reach it.
/// The child is reaped and removed under the same lock, so a kill never hits a stale pid.
fn wait_for_exit(shared: &Shared, poll_interval: Duration) -> Result<ExitStatus> {
    loop {
        {
            let mut slot = shared.lock();
            let Some(child) = slot.child.as_mut() else {
                return Err(Error::Spawn("ffmpeg process handle lost".to_string()));
            };
            if let Some(status) = child.try_wait()? {
                slot.child = None;
                return Ok(status);
            }
        }
        thread::sleep(poll_interval);
    }
}
