use serde::{Deserialize, Serialize};

/// Color metadata detected on a source video. Each field is the ffmpeg
/// name of the signalled value; `None` means the source carries no tag,
/// which is common for raw camera recordings and is itself a signal the
/// planner acts on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProperties {
    pub primaries: Option<String>,
    pub transfer: Option<String>,
    pub matrix: Option<String>,
}

/// Filter directives required to make the encoded output render with
/// correct perceptual brightness on consumer players. Derived per input
/// file and never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorTransformPlan {
    pub needs_gamma_correction: bool,
    pub filters: Vec<String>,
}

/// The trigger condition for gamma correction. Kept pluggable because the
/// exact source characteristics that require the remap are validated
/// against known-good reference recordings, not derived from first
/// principles.
pub type GammaTrigger = fn(&ColorProperties) -> bool;

/// Default trigger: the source stores linear-light values, either tagged
/// explicitly or untagged. Behavior cameras record linear and rarely tag,
/// so an absent transfer characteristic is treated as linear rather than
/// display-referred.
#[must_use]
pub fn source_is_linear(color: &ColorProperties) -> bool {
    matches!(color.transfer.as_deref(), Some("linear") | None)
}

/// Approximates the BT.709 OETF when remapping linear-light sources. The
/// plain power curve is what the reference recordings were validated
/// against.
const GAMMA_REMAP_FILTER: &str = "eq=gamma=0.4545";

#[must_use]
pub fn plan(source: &ColorProperties, target_pix_fmt: Option<&str>) -> ColorTransformPlan {
    plan_with(source, target_pix_fmt, source_is_linear)
}

/// Pure planning function: identical inputs always produce an identical
/// plan. Encoding is expensive, so correctness here is verified by
/// inspecting the plan rather than by re-running an encode.
///
/// The gamma remap is emitted before the color-space conversion so the
/// remap operates on the source's own pixel values, not on data already
/// resampled into the target matrix.
#[must_use]
pub fn plan_with(
    source: &ColorProperties,
    _target_pix_fmt: Option<&str>,
    trigger: GammaTrigger,
) -> ColorTransformPlan {
    let needs_gamma_correction = trigger(source);

    let mut filters = vec![];

    if needs_gamma_correction {
        filters.push(GAMMA_REMAP_FILTER.to_owned());
    }

    match source.matrix.as_deref() {
        // Already in the target matrix; nothing to convert.
        Some("bt709") => {}
        Some(_) => filters.push("colorspace=all=bt709".to_owned()),
        // Untagged sources would make the colorspace filter fail, so the
        // input side is pinned to the assumption the remap was validated
        // under.
        None => filters.push("colorspace=all=bt709:iall=bt709".to_owned()),
    }

    ColorTransformPlan {
        needs_gamma_correction,
        filters,
    }
}
