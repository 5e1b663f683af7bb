//! caoba - Photo slideshow generation on top of ffmpeg
//!
//! The library turns a folder of JPEG photos and an optional list of music tracks into an
//! MP4 slideshow:
//! - `photos`: enumerate and order the photos of a folder
//! - `audio`: place music tracks on the timeline
//! - `graph`: build the ffmpeg filter graph
//! - `job`: run ffmpeg with progress reporting and cancellation

pub mod audio;
pub mod error;
pub mod ffi;
pub mod ffmpeg;
pub mod graph;
pub mod invocation;
pub mod job;
pub mod photos;
pub mod progress;

pub use audio::{AudioPlanEntry, AudioTrack, PlacementMode};
pub use error::{Error, Result};
pub use job::{JobConfig, JobHandle, JobManager, JobState, RenderResult};
pub use photos::SortMode;
pub use progress::ProgressEvent;

use std::path::PathBuf;
use std::str::FromStr;

/// Minimum number of photos for a slideshow
pub const MIN_PHOTOS: usize = 2;

/// Duration of the cross-dissolve between photos, in seconds
pub const TRANSITION_SECS: f64 = 1.0;

/// Output frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub enum VideoFormat {
    /// 9:16 vertical (1080x1920)
    Vertical916 = 0,
    /// 4:5 vertical (1080x1350)
    Vertical45 = 1,
    /// 2:3 vertical (1280x1920)
    Vertical23 = 2,
    /// 4:5 horizontal (1350x1080)
    Horizontal45 = 3,
    /// 2:3 horizontal (1920x1280)
    Horizontal23 = 4,
    /// 16:9 horizontal (1920x1080)
    #[default]
    Horizontal169 = 5,
}

impl VideoFormat {
    /// Target width and height in pixels
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VideoFormat::Vertical916 => (1080, 1920),
            VideoFormat::Vertical45 => (1080, 1350),
            VideoFormat::Vertical23 => (1280, 1920),
            VideoFormat::Horizontal45 => (1350, 1080),
            VideoFormat::Horizontal23 => (1920, 1280),
            VideoFormat::Horizontal169 => (1920, 1080),
        }
    }

    /// Parse a format name, falling back to 16:9 for anything unknown
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for VideoFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "916_v" | "9:16" | "9:16-vertical" => Ok(VideoFormat::Vertical916),
            "45_v" | "4:5" | "4:5-vertical" => Ok(VideoFormat::Vertical45),
            "23_v" | "2:3" | "2:3-vertical" => Ok(VideoFormat::Vertical23),
            "45_h" | "5:4" | "4:5-horizontal" => Ok(VideoFormat::Horizontal45),
            "23_h" | "3:2" | "2:3-horizontal" => Ok(VideoFormat::Horizontal23),
            "169_h" | "16:9" | "16:9-horizontal" => Ok(VideoFormat::Horizontal169),
            other => Err(Error::validation(format!("unknown video format: {other}"))),
        }
    }
}

/// Render request coming from the user interface
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Photos in display order
    pub photos: Vec<PathBuf>,
    /// Music tracks in playback order
    pub music: Vec<AudioTrack>,
    /// Time each photo stays on screen, in seconds
    pub seconds_per_photo: f64,
    /// Cross-dissolve between photos
    pub transition: bool,
    /// Output frame geometry
    pub format: VideoFormat,
    /// Destination MP4 path
    pub destination: PathBuf,
    /// Path to ffmpeg executable
    pub ffmpeg_path: Option<String>,
    /// Path to ffprobe executable (derived from `ffmpeg_path` when absent)
    pub ffprobe_path: Option<String>,
}

impl RenderRequest {
    /// Validate the request before any work is started
    pub fn validate(&self) -> Result<()> {
        if self.photos.len() < MIN_PHOTOS {
            return Err(Error::validation(format!(
                "at least {} photos are required, found {}",
                MIN_PHOTOS,
                self.photos.len()
            )));
        }
        if !self.seconds_per_photo.is_finite() || self.seconds_per_photo <= 0.0 {
            return Err(Error::validation(format!(
                "seconds per photo must be positive, got {}",
                self.seconds_per_photo
            )));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(Error::validation("no destination selected"));
        }
        for (i, track) in self.music.iter().enumerate().skip(1) {
            if let PlacementMode::ManualIndex(index) = track.placement {
                if index >= self.photos.len() {
                    return Err(Error::validation(format!(
                        "track {}: start photo {} is out of range (1-{})",
                        i + 1,
                        index + 1,
                        self.photos.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve the derived timeline for this request
    pub fn spec(&self, audio_plan: Vec<AudioPlanEntry>) -> RenderSpec {
        let (width, height) = self.format.resolution();
        let transition_secs = if self.transition { TRANSITION_SECS } else { 0.0 };
        RenderSpec {
            photos: self.photos.clone(),
            width,
            height,
            seconds_per_photo: self.seconds_per_photo,
            transition_secs,
            total_secs: total_duration(self.photos.len(), self.seconds_per_photo, self.transition),
            audio_plan,
            output: self.destination.clone(),
        }
    }
}

/// Fully resolved render parameters
#[derive(Debug, Clone)]
pub struct RenderSpec {
    pub photos: Vec<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub seconds_per_photo: f64,
    /// 1.0 with transitions, 0.0 without
    pub transition_secs: f64,
    /// Authoritative output duration, used for `-t` and progress
    pub total_secs: f64,
    pub audio_plan: Vec<AudioPlanEntry>,
    pub output: PathBuf,
}

impl RenderSpec {
    pub fn has_transition(&self) -> bool {
        self.transition_secs > 0.0
    }

    /// How long each looped photo input lasts
    pub fn photo_input_secs(&self) -> f64 {
        self.seconds_per_photo + self.transition_secs
    }
}

/// Total slideshow duration for `count` photos
pub fn total_duration(count: usize, seconds_per_photo: f64, transition: bool) -> f64 {
    let base = count as f64 * seconds_per_photo;
    if transition {
        base + TRANSITION_SECS
    } else {
        base
    }
}
