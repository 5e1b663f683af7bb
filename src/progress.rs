//! Progress parsing of ffmpeg's stderr

use std::path::PathBuf;

/// Highest percentage reported while ffmpeg is still running
pub const MAX_RUNNING_PERCENT: u32 = 99;

/// Progress update for the user interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// 0-99 while encoding, 100 once completed
    pub percent: u32,
    /// File name of the photo approximately being encoded
    pub current_file: String,
}

/// Turns stderr chunks into progress events and keeps the full log.
///
/// Chunks may end in the middle of a line; incomplete text is held back until the next
/// chunk or [`ProgressTracker::finish`].
#[derive(Debug)]
pub struct ProgressTracker {
    total_secs: f64,
    file_names: Vec<String>,
    pending: Vec<u8>,
    log: Vec<u8>,
    percent: u32,
}

impl ProgressTracker {
    pub fn new(total_secs: f64, photos: &[PathBuf]) -> Self {
        Self {
            total_secs,
            file_names: photos
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| p.display().to_string())
                })
                .collect(),
            pending: Vec::new(),
            log: Vec::new(),
            percent: 0,
        }
    }

    /// Consume a chunk of stderr, returning the newest progress it contained
    pub fn feed(&mut self, chunk: &[u8]) -> Option<ProgressEvent> {
        self.log.extend_from_slice(chunk);
        self.pending.extend_from_slice(chunk);

        let mut event = None;
        // ffmpeg rewrites its stats line with '\r'
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if let Some(e) = self.line(&line) {
                event = Some(e);
            }
        }
        event
    }

    /// Parse whatever is left once the stream is closed
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        let rest = std::mem::take(&mut self.pending);
        self.line(&rest)
    }

    /// Event reported once the render completed
    pub fn completed(&self) -> ProgressEvent {
        ProgressEvent {
            percent: 100,
            current_file: self.file_names.last().cloned().unwrap_or_default(),
        }
    }

    /// Current percentage
    pub fn percent(&self) -> u32 {
        self.percent
    }

    /// Everything ffmpeg wrote so far
    pub fn log(&self) -> String {
        String::from_utf8_lossy(&self.log).into_owned()
    }

    fn line(&mut self, line: &[u8]) -> Option<ProgressEvent> {
        let line = String::from_utf8_lossy(line);
        let elapsed = parse_elapsed(&line)?;

        self.percent = self.percent.max(percent(elapsed, self.total_secs));
        let index = photo_index(elapsed, self.total_secs, self.file_names.len())?;
        Some(ProgressEvent {
            percent: self.percent,
            current_file: self.file_names[index].clone(),
        })
    }
}

/// Extract the `time=HH:MM:SS.ff` marker of a stats line, in seconds
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let prefix = "time=";
    let idx = line.find(prefix)?;
    let time_str = &line[idx + prefix.len()..];
    let end = time_str
        .find(|c: char| c.is_whitespace())
        .unwrap_or(time_str.len());

    let parts: Vec<&str> = time_str[..end].split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some((hours * 3600.0 + minutes * 60.0 + seconds).max(0.0))
}

/// Percentage of `total` reached at `elapsed`, capped at [`MAX_RUNNING_PERCENT`]
pub fn percent(elapsed: f64, total: f64) -> u32 {
    if total <= 0.0 {
        return 0;
    }
    ((elapsed / total * 100.0).round().max(0.0) as u32).min(MAX_RUNNING_PERCENT)
}

/// Photo shown at `elapsed`, assuming every photo gets the same share of the timeline
pub fn photo_index(elapsed: f64, total: f64, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    if total <= 0.0 {
        return Some(0);
    }
    let index = (elapsed / total * count as f64).floor().max(0.0) as usize;
    Some(index.min(count - 1))
}
