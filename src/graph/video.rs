//! Photo normalization and video assembly

use super::{Filter, Node, Pad, FINAL_VIDEO};
use crate::RenderSpec;

/// One scale/pad/fps chain per photo, labelled `vPre{i}`
pub(super) fn normalize(spec: &RenderSpec, fps: u32) -> Vec<Node> {
    (0..spec.photos.len())
        .map(|i| {
            Node::new(
                vec![Pad::Video(i)],
                vec![
                    Filter::Scale {
                        width: spec.width,
                        height: spec.height,
                    },
                    Filter::Pad {
                        width: spec.width,
                        height: spec.height,
                    },
                    Filter::SetSar,
                    Filter::Fps(fps),
                    Filter::Format("yuv420p"),
                ],
                format!("vPre{}", i),
            )
        })
        .collect()
}

/// Join the normalized streams into [`FINAL_VIDEO`]
pub(super) fn assemble(normalized: &[String], spec: &RenderSpec) -> Vec<Node> {
    if spec.has_transition() {
        crossfade_chain(normalized, spec.seconds_per_photo, spec.transition_secs)
    } else {
        vec![Node::new(
            normalized.iter().cloned().map(Pad::Label).collect(),
            vec![Filter::Concat {
                segments: normalized.len(),
            }],
            FINAL_VIDEO,
        )]
    }
}

/// Left fold of pairwise dissolves. Dissolve `i` starts where photo `i` ends on screen.
fn crossfade_chain(normalized: &[String], seconds_per_photo: f64, duration: f64) -> Vec<Node> {
    let last = normalized.len().saturating_sub(2);
    let mut previous = normalized[0].clone();
    let mut nodes = Vec::with_capacity(normalized.len() - 1);

    for (i, next) in normalized.iter().skip(1).enumerate() {
        let output = if i == last {
            FINAL_VIDEO.to_string()
        } else {
            format!("vMix{}", i + 1)
        };
        nodes.push(Node::new(
            vec![Pad::Label(previous), Pad::Label(next.clone())],
            vec![Filter::Xfade {
                duration,
                offset: (i + 1) as f64 * seconds_per_photo,
            }],
            output.clone(),
        ));
        previous = output;
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::spec;

    #[test]
    fn test_normalize_holds_target_geometry() {
        let mut spec = spec(2, 3.0, false);
        spec.width = 1080;
        spec.height = 1350;
        let nodes = normalize(&spec, 25);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].inputs, vec![Pad::Video(1)]);
        assert_eq!(
            nodes[1].to_string(),
            "[1]scale=1080:1350:force_original_aspect_ratio=decrease,\
             pad=1080:1350:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=25,format=yuv420p[vPre1]"
        );
    }

    #[test]
    fn test_crossfade_offsets() {
        let labels: Vec<String> = (0..4).map(|i| format!("vPre{i}")).collect();
        let nodes = crossfade_chain(&labels, 2.5, 1.0);
        let offsets: Vec<f64> = nodes
            .iter()
            .map(|n| match n.filters[0] {
                Filter::Xfade { offset, .. } => offset,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(offsets, vec![2.5, 5.0, 7.5]);

        let outputs: Vec<&str> = nodes.iter().map(|n| n.output.as_str()).collect();
        assert_eq!(outputs, vec!["vMix1", "vMix2", FINAL_VIDEO]);
        assert_eq!(
            nodes[1].inputs,
            vec![Pad::Label("vMix1".into()), Pad::Label("vPre2".into())]
        );
    }

    #[test]
    fn test_concat_keeps_order() {
        let spec = spec(3, 4.0, false);
        let labels: Vec<String> = (0..3).map(|i| format!("vPre{i}")).collect();
        let nodes = assemble(&labels, &spec);
        assert_eq!(
            nodes[0].to_string(),
            "[vPre0][vPre1][vPre2]concat=n=3:v=1:a=0[vFinalVideo]"
        );
    }
}
