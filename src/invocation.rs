//! ffmpeg command line for a render

use crate::graph::{FilterGraph, FINAL_AUDIO, FINAL_VIDEO};
use crate::{RenderSpec, Result};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the filter script written next to the photos.
/// Starts with a dot so photo enumeration never picks it up.
pub const FILTER_SCRIPT_NAME: &str = ".caoba_filter_graph.txt";

/// Default upper bound for an inline command line, in bytes
pub const DEFAULT_INLINE_LIMIT: usize = 8000;

/// Temporary file removed when dropped
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Write `contents` to `path`, replacing any previous file
    pub fn create(path: PathBuf, contents: &str) -> Result<Self> {
        fs::write(&path, contents)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

/// Remove artifacts left behind by an earlier run that did not finish
pub fn remove_stale_artifacts(work_dir: &Path) {
    let _ = fs::remove_file(work_dir.join(FILTER_SCRIPT_NAME));
}

/// Ready-to-run ffmpeg arguments
#[derive(Debug)]
pub struct Invocation {
    args: Vec<OsString>,
    work_dir: PathBuf,
    script: Option<TempArtifact>,
}

impl Invocation {
    /// Assemble the command line for `spec` and `graph`.
    ///
    /// When the inline command line would exceed `inline_limit` bytes, the graph goes to a
    /// script file in `work_dir` instead; the file lives as long as the returned value.
    pub fn build(
        spec: &RenderSpec,
        graph: &FilterGraph,
        work_dir: &Path,
        inline_limit: usize,
    ) -> Result<Self> {
        let graph_text = graph.to_string();

        let mut head: Vec<OsString> = ["-y", "-hide_banner", "-nostdin"]
            .into_iter()
            .map(OsString::from)
            .collect();

        let photo_secs = spec.photo_input_secs().to_string();
        for photo in &spec.photos {
            push_all(&mut head, ["-loop", "1", "-t", photo_secs.as_str(), "-i"]);
            head.push(photo.clone().into_os_string());
        }
        for track in &spec.audio_plan {
            push_all(&mut head, ["-stream_loop", "-1", "-i"]);
            head.push(track.path.clone().into_os_string());
        }

        let mut tail: Vec<OsString> = Vec::new();
        push_all(&mut tail, ["-map", format!("[{}]", FINAL_VIDEO).as_str()]);
        if graph.has_audio() {
            push_all(
                &mut tail,
                ["-map", format!("[{}]", FINAL_AUDIO).as_str(), "-c:a", "aac"],
            );
        }
        push_all(
            &mut tail,
            [
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-t",
                spec.total_secs.to_string().as_str(),
            ],
        );
        tail.push(spec.output.clone().into_os_string());

        let inline_len = command_len(&head) + command_len(&tail) + graph_text.len() + 20;
        let script = if inline_len > inline_limit {
            let script = TempArtifact::create(work_dir.join(FILTER_SCRIPT_NAME), &graph_text)?;
            tracing::debug!(
                len = inline_len,
                script = %script.path().display(),
                "command line too long, using filter script"
            );
            head.push("-filter_complex_script".into());
            head.push(script.path().as_os_str().to_owned());
            Some(script)
        } else {
            head.push("-filter_complex".into());
            head.push(graph_text.into());
            None
        };

        head.extend(tail);
        Ok(Self {
            args: head,
            work_dir: work_dir.to_path_buf(),
            script,
        })
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Directory ffmpeg runs in
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Filter script file, when the graph did not fit on the command line
    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(TempArtifact::path)
    }

    /// Printable command line for logs
    pub fn display(&self, program: &str) -> String {
        std::iter::once(program.to_string())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn push_all<'a, I: IntoIterator<Item = &'a str>>(args: &mut Vec<OsString>, items: I) {
    args.extend(items.into_iter().map(OsString::from));
}

fn command_len(args: &[OsString]) -> usize {
    args.iter().map(|a| OsStr::len(a) + 1).sum()
}
