//! ffmpeg/ffprobe discovery, duration probing and process termination

use crate::audio::DurationProbe;
use crate::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Find ffmpeg executable
pub fn find_ffmpeg(custom_path: Option<&str>) -> Result<String> {
    find_tool("ffmpeg", custom_path)
}

/// Find ffprobe executable, next to ffmpeg when possible
pub fn find_ffprobe(custom_path: Option<&str>, ffmpeg_path: Option<&str>) -> Result<String> {
    if custom_path.is_none() {
        if let Some(ffmpeg) = ffmpeg_path.map(Path::new) {
            if let Some(name) = ffmpeg.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("ffmpeg") {
                    let sibling = ffmpeg.with_file_name(name.replacen("ffmpeg", "ffprobe", 1));
                    if sibling.exists() {
                        return Ok(sibling.to_string_lossy().into_owned());
                    }
                }
            }
        }
    }
    find_tool("ffprobe", custom_path)
}

fn find_tool(name: &str, custom_path: Option<&str>) -> Result<String> {
    if let Some(path) = custom_path {
        if Path::new(path).exists() {
            return Ok(path.to_string());
        }
        return Err(Error::ToolUnavailable(format!("{} not found at: {}", name, path)));
    }

    // Try PATH first, then common install locations
    let candidates = [
        name.to_string(),
        format!("/usr/bin/{name}"),
        format!("/usr/local/bin/{name}"),
        format!("/opt/homebrew/bin/{name}"),
    ];

    for path in candidates {
        if Command::new(&path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
        {
            return Ok(path);
        }
    }

    Err(Error::ToolUnavailable(format!("{} not found in PATH", name)))
}

/// Check that ffmpeg exists and supports libx264
pub fn check_available(ffmpeg_path: Option<&str>) -> Result<()> {
    let ffmpeg = find_ffmpeg(ffmpeg_path)?;

    let output = Command::new(&ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| Error::Spawn(format!("failed to run {}: {}", ffmpeg, e)))?;

    let encoders = String::from_utf8_lossy(&output.stdout);
    if encoders.contains("libx264") {
        Ok(())
    } else {
        Err(Error::ToolUnavailable(
            "ffmpeg does not have libx264 support".to_string(),
        ))
    }
}

/// Reads audio durations with ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl DurationProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Spawn(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ToolUnavailable(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's bare `format=duration` output
pub fn parse_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    text.lines()
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::ToolUnavailable(format!("unreadable duration: {:?}", text)))
}

/// Forcefully terminate a process and everything it spawned.
///
/// On Unix the process must lead its own process group (spawned with `process_group(0)`).
pub fn terminate(pid: u32) {
    #[cfg(unix)]
    {
        // SAFETY: plain syscall; a negative pid addresses the whole process group
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if rc != 0 {
            // not a group leader, fall back to the single process
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }

    #[cfg(windows)]
    {
        // /F = force, /T = kill child tree
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F", "/T"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}
