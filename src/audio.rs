//! Music track placement on the slideshow timeline

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default overlap between consecutive tracks, in seconds
pub const DEFAULT_CROSSFADE_SECS: f64 = 3.0;

/// Where a track starts playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// First track of the list; always starts at zero
    FirstTrackImplicit,
    /// Right after the previous track, overlapping by the crossfade window
    AutoSequential,
    /// When the given photo (0-based) appears
    ManualIndex(usize),
}

/// Music track as chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub placement: PlacementMode,
}

impl AudioTrack {
    pub fn new(path: impl Into<PathBuf>, placement: PlacementMode) -> Self {
        Self {
            path: path.into(),
            placement,
        }
    }
}

/// Track with its resolved start time
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPlanEntry {
    pub path: PathBuf,
    pub start_secs: f64,
}

/// Source of track durations
pub trait DurationProbe {
    /// Duration of the audio file in seconds
    fn duration(&self, path: &Path) -> Result<f64>;
}

/// Compute the start time of every track.
///
/// Tracks are processed in order since each automatic placement depends on where the
/// previous track ends. `cancelled` is checked before each track is probed.
pub fn plan(
    tracks: &[AudioTrack],
    seconds_per_photo: f64,
    crossfade_secs: f64,
    probe: &dyn DurationProbe,
    cancelled: &AtomicBool,
) -> Result<Vec<AudioPlanEntry>> {
    let mut entries = Vec::with_capacity(tracks.len());
    let mut tail_secs = 0.0_f64;

    for (index, track) in tracks.iter().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let duration = probe.duration(&track.path).map_err(|e| Error::AudioProbe {
            index,
            path: track.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let placement = if index == 0 {
            PlacementMode::ManualIndex(0)
        } else {
            track.placement
        };

        let start_secs = match placement {
            PlacementMode::ManualIndex(photo) => photo as f64 * seconds_per_photo,
            PlacementMode::AutoSequential | PlacementMode::FirstTrackImplicit => {
                (tail_secs - crossfade_secs).max(0.0)
            }
        };
        tail_secs = start_secs + duration;

        tracing::debug!(
            track = index + 1,
            path = %track.path.display(),
            duration,
            start_secs,
            "planned music track"
        );
        entries.push(AudioPlanEntry {
            path: track.path.clone(),
            start_secs,
        });
    }

    Ok(entries)
}
