//! Typed ffmpeg filter graph
//!
//! The graph is a list of nodes, each a chain of filters that reads named pads and writes one
//! labelled output. It is built as data and serialized to ffmpeg's `-filter_complex` syntax
//! at the end, so its shape can be inspected without parsing text.

mod audio;
mod video;

use crate::{Error, RenderSpec, Result};
use std::collections::HashMap;
use std::fmt;

/// Label of the stream mapped as output video
pub const FINAL_VIDEO: &str = "vFinalVideo";
/// Label of the stream mapped as output audio
pub const FINAL_AUDIO: &str = "aFinalAudio";

/// Frame rate of the normalized photo streams
pub const DEFAULT_FPS: u32 = 25;

/// Stream read by a node
#[derive(Debug, Clone, PartialEq)]
pub enum Pad {
    /// Video stream of input file `index`
    Video(usize),
    /// Audio stream of input file `index`
    Audio(usize),
    /// Output of another node
    Label(String),
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Video(index) => write!(f, "[{}]", index),
            Pad::Audio(index) => write!(f, "[{}:a]", index),
            Pad::Label(label) => write!(f, "[{}]", label),
        }
    }
}

/// Single ffmpeg filter with its options
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Scale to fit inside the box, preserving aspect ratio
    Scale { width: u32, height: u32 },
    /// Pad to exactly fill the box, content centered
    Pad { width: u32, height: u32 },
    SetSar,
    Fps(u32),
    Format(&'static str),
    /// Sequential concatenation of `segments` video streams
    Concat { segments: usize },
    /// Cross-dissolve starting `offset` seconds into the first input
    Xfade { duration: f64, offset: f64 },
    Anull,
    Atrim { duration: f64 },
    /// Reset timestamps to start at zero
    Asetpts,
    Acrossfade { duration: f64 },
}

impl Filter {
    /// ffmpeg filter name
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Scale { .. } => "scale",
            Filter::Pad { .. } => "pad",
            Filter::SetSar => "setsar",
            Filter::Fps(_) => "fps",
            Filter::Format(_) => "format",
            Filter::Concat { .. } => "concat",
            Filter::Xfade { .. } => "xfade",
            Filter::Anull => "anull",
            Filter::Atrim { .. } => "atrim",
            Filter::Asetpts => "asetpts",
            Filter::Acrossfade { .. } => "acrossfade",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scale { width, height } => write!(
                f,
                "scale={}:{}:force_original_aspect_ratio=decrease",
                width, height
            ),
            Filter::Pad { width, height } => {
                write!(f, "pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height)
            }
            Filter::SetSar => f.write_str("setsar=1"),
            Filter::Fps(fps) => write!(f, "fps={}", fps),
            Filter::Format(pix_fmt) => write!(f, "format={}", pix_fmt),
            Filter::Concat { segments } => write!(f, "concat=n={}:v=1:a=0", segments),
            Filter::Xfade { duration, offset } => write!(
                f,
                "xfade=transition=fade:duration={}:offset={}",
                duration, offset
            ),
            Filter::Anull => f.write_str("anull"),
            Filter::Atrim { duration } => write!(f, "atrim=duration={}", duration),
            Filter::Asetpts => f.write_str("asetpts=PTS-STARTPTS"),
            Filter::Acrossfade { duration } => write!(f, "acrossfade=d={}", duration),
        }
    }
}

/// Filter chain from input pads to one labelled output
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub inputs: Vec<Pad>,
    pub filters: Vec<Filter>,
    pub output: String,
}

impl Node {
    pub fn new(inputs: Vec<Pad>, filters: Vec<Filter>, output: impl Into<String>) -> Self {
        Self {
            inputs,
            filters,
            output: output.into(),
        }
    }

    /// Name of the node's first filter
    pub fn kind(&self) -> &'static str {
        self.filters.first().map(Filter::name).unwrap_or("")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{}", pad)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        write!(f, "[{}]", self.output)
    }
}

/// Complete processing graph for one render
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<Node>,
    audio: bool,
}

impl FilterGraph {
    /// Build the graph for `spec`
    pub fn build(spec: &RenderSpec, crossfade_secs: f64, fps: u32) -> Result<Self> {
        if spec.photos.len() < crate::MIN_PHOTOS {
            return Err(Error::validation("at least 2 photos are required"));
        }

        let mut nodes = video::normalize(spec, fps);
        let normalized: Vec<String> = nodes.iter().map(|n| n.output.clone()).collect();
        nodes.extend(video::assemble(&normalized, spec));

        let audio_nodes = audio::assemble(spec.photos.len(), &spec.audio_plan, crossfade_secs);
        let graph = Self {
            audio: !audio_nodes.is_empty(),
            nodes: nodes.into_iter().chain(audio_nodes).collect(),
        };
        graph.check()?;
        Ok(graph)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes whose chain starts with the filter `name`
    pub fn count(&self, name: &str) -> usize {
        self.nodes.iter().filter(|n| n.kind() == name).count()
    }

    pub fn has_audio(&self) -> bool {
        self.audio
    }

    /// Node producing `label`
    pub fn producer(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.output == label)
    }

    /// Verify that labels are defined before use, defined once, and consumed exactly once
    /// except for the final outputs.
    pub fn check(&self) -> Result<()> {
        let mut uses: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            for pad in &node.inputs {
                if let Pad::Label(label) = pad {
                    match uses.get_mut(label.as_str()) {
                        Some(count) => *count += 1,
                        None => {
                            return Err(Error::validation(format!(
                                "filter graph reads undefined label [{}]",
                                label
                            )))
                        }
                    }
                }
            }
            if uses.insert(node.output.as_str(), 0).is_some() {
                return Err(Error::validation(format!(
                    "filter graph defines [{}] twice",
                    node.output
                )));
            }
        }

        let finals: &[&str] = if self.audio {
            &[FINAL_VIDEO, FINAL_AUDIO]
        } else {
            &[FINAL_VIDEO]
        };
        for (label, count) in uses {
            let expected = usize::from(!finals.contains(&label));
            if count != expected {
                return Err(Error::validation(format!(
                    "filter graph label [{}] used {} times",
                    label, count
                )));
            }
        }
        for label in finals {
            if self.producer(label).is_none() {
                return Err(Error::validation(format!(
                    "filter graph has no [{}] output",
                    label
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioPlanEntry;
    use std::path::PathBuf;

    pub(super) fn spec(photos: usize, seconds: f64, transition: bool) -> RenderSpec {
        RenderSpec {
            photos: (0..photos)
                .map(|i| PathBuf::from(format!("/photos/{i}.jpg")))
                .collect(),
            width: 1920,
            height: 1080,
            seconds_per_photo: seconds,
            transition_secs: if transition { 1.0 } else { 0.0 },
            total_secs: crate::total_duration(photos, seconds, transition),
            audio_plan: Vec::new(),
            output: PathBuf::from("/photos/out.mp4"),
        }
    }

    pub(super) fn plan(starts: &[f64]) -> Vec<AudioPlanEntry> {
        starts
            .iter()
            .enumerate()
            .map(|(i, s)| AudioPlanEntry {
                path: PathBuf::from(format!("/music/{i}.mp3")),
                start_secs: *s,
            })
            .collect()
    }

    #[test]
    fn test_transition_label_counts() {
        for n in 2..8 {
            let graph = FilterGraph::build(&spec(n, 3.0, true), 3.0, DEFAULT_FPS).unwrap();
            assert_eq!(graph.count("scale"), n);
            assert_eq!(graph.count("xfade"), n - 1);
            assert_eq!(graph.count("concat"), 0);
            assert_eq!(graph.producer(FINAL_VIDEO).unwrap().kind(), "xfade");
            assert!(!graph.has_audio());
        }
    }

    #[test]
    fn test_concat_without_transition() {
        let graph = FilterGraph::build(&spec(3, 4.0, false), 3.0, DEFAULT_FPS).unwrap();
        assert_eq!(graph.count("scale"), 3);
        assert_eq!(graph.count("xfade"), 0);
        let concat = graph.producer(FINAL_VIDEO).unwrap();
        assert_eq!(concat.filters, vec![Filter::Concat { segments: 3 }]);
        assert_eq!(concat.inputs.len(), 3);
    }

    #[test]
    fn test_serialized_graph() {
        let graph = FilterGraph::build(&spec(2, 4.0, true), 3.0, DEFAULT_FPS).unwrap();
        let norm = "scale=1920:1080:force_original_aspect_ratio=decrease,\
                    pad=1920:1080:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=25,format=yuv420p";
        assert_eq!(
            graph.to_string(),
            format!(
                "[0]{norm}[vPre0];[1]{norm}[vPre1];\
                 [vPre0][vPre1]xfade=transition=fade:duration=1:offset=4[vFinalVideo]"
            )
        );
    }

    #[test]
    fn test_serialized_audio_chain() {
        let mut spec = spec(2, 4.0, false);
        spec.audio_plan = plan(&[0.0, 5.0]);
        let graph = FilterGraph::build(&spec, 3.0, DEFAULT_FPS).unwrap();
        let text = graph.to_string();
        assert!(text.ends_with(
            "[2:a]atrim=duration=8,asetpts=PTS-STARTPTS[aTrimmed1];\
             [aTrimmed1][3:a]acrossfade=d=3[aFinalAudio]"
        ));
    }

    #[test]
    fn test_too_few_photos() {
        assert!(FilterGraph::build(&spec(1, 3.0, true), 3.0, DEFAULT_FPS).is_err());
    }

    #[test]
    fn test_check_rejects_dangling_label() {
        let graph = FilterGraph {
            nodes: vec![
                Node::new(vec![Pad::Video(0)], vec![Filter::SetSar], "vPre0"),
                Node::new(vec![Pad::Video(1)], vec![Filter::SetSar], FINAL_VIDEO),
            ],
            audio: false,
        };
        assert!(graph.check().is_err());
    }
}
