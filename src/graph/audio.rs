//! Multi-track music mix

use super::{Filter, Node, Pad, FINAL_AUDIO};
use crate::AudioPlanEntry;

/// Crossfade chain over the music inputs, which follow the `photo_count` photo inputs.
///
/// The running mix is trimmed to where the next track starts plus the crossfade window,
/// then blended with that track.
pub(super) fn assemble(
    photo_count: usize,
    plan: &[AudioPlanEntry],
    crossfade_secs: f64,
) -> Vec<Node> {
    match plan.len() {
        0 => Vec::new(),
        1 => vec![Node::new(
            vec![Pad::Audio(photo_count)],
            vec![Filter::Anull],
            FINAL_AUDIO,
        )],
        count => {
            let mut nodes = Vec::with_capacity(2 * (count - 1));
            let mut previous = Pad::Audio(photo_count);

            for (i, track) in plan.iter().enumerate().skip(1) {
                let trimmed = format!("aTrimmed{}", i);
                let output = if i == count - 1 {
                    FINAL_AUDIO.to_string()
                } else {
                    format!("aMix{}", i)
                };

                nodes.push(Node::new(
                    vec![previous],
                    vec![
                        Filter::Atrim {
                            duration: track.start_secs + crossfade_secs,
                        },
                        Filter::Asetpts,
                    ],
                    trimmed.clone(),
                ));
                nodes.push(Node::new(
                    vec![Pad::Label(trimmed), Pad::Audio(photo_count + i)],
                    vec![Filter::Acrossfade {
                        duration: crossfade_secs,
                    }],
                    output.clone(),
                ));
                previous = Pad::Label(output);
            }

            nodes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::plan;

    #[test]
    fn test_no_music() {
        assert!(assemble(3, &[], 3.0).is_empty());
    }

    #[test]
    fn test_single_track_passthrough() {
        let nodes = assemble(3, &plan(&[0.0]), 3.0);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].to_string(), "[3:a]anull[aFinalAudio]");
    }

    #[test]
    fn test_three_track_chain() {
        let nodes = assemble(4, &plan(&[0.0, 7.0, 12.0]), 3.0);
        let text: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "[4:a]atrim=duration=10,asetpts=PTS-STARTPTS[aTrimmed1]",
                "[aTrimmed1][5:a]acrossfade=d=3[aMix1]",
                "[aMix1]atrim=duration=15,asetpts=PTS-STARTPTS[aTrimmed2]",
                "[aTrimmed2][6:a]acrossfade=d=3[aFinalAudio]",
            ]
        );
    }
}
