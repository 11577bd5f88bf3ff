use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, Codec, Container, GammaPolicy, Preset};
use crate::color;
use crate::config::CompressionRequest;
use crate::error::CompressionError;
use crate::ffmpeg::{InputProber, InputProperties};

/// A fully resolved encoder invocation. Once constructed it is never
/// mutated: the executor consumes it as-is, and identical inputs always
/// produce an identical argument sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeJobSpec {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Tokens between the tool's fixed boilerplate and the output path.
    pub arguments: Vec<String>,
    pub container: Option<Container>,
}

/// Fixes sources with odd dimensions, which yuv420 subsampling rejects.
const EVEN_DIMENSION_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";

fn gamma_trigger(policy: GammaPolicy) -> color::GammaTrigger {
    match policy {
        GammaPolicy::Auto => color::source_is_linear,
        GammaPolicy::Always => |_| true,
        GammaPolicy::Never => |_| false,
    }
}

/// Turns a compression request into an encoder invocation plan.
///
/// Preset lookup happens before the source is probed so that a bad label
/// is reported as such even when the input file is also unreadable.
/// Custom arguments skip both the catalog and the planner entirely; the
/// caller accepts responsibility for their correctness.
pub fn resolve(
    request: &CompressionRequest,
    catalog: &Catalog,
    prober: &dyn InputProber,
    input: &Path,
    output: &Path,
) -> Result<EncodeJobSpec, CompressionError> {
    match request {
        CompressionRequest::CustomArgs {
            input_options,
            output_options,
        } => Ok(resolve_custom(input_options, output_options, input, output)),
        CompressionRequest::NamedPreset(label) => {
            let preset = catalog.lookup(label)?;
            let properties = prober.probe(input)?;

            Ok(build_spec(preset, &properties, input, output))
        }
        CompressionRequest::Default => {
            let properties = prober.probe(input)?;

            Ok(build_spec(catalog.default_for(&properties), &properties, input, output))
        }
    }
}

/// User-supplied raw arguments, verbatim, with only the path tokens
/// substituted. Input options precede `-i`, output options follow it,
/// and the container is inferred from whatever extension the caller's
/// destination carries.
#[must_use]
pub fn resolve_custom(
    input_options: &[String],
    output_options: &[String],
    input: &Path,
    output: &Path,
) -> EncodeJobSpec {
    let mut tokens = input_options.to_vec();
    tokens.push("-i".to_owned());
    tokens.push(input.to_string_lossy().into_owned());
    tokens.extend(output_options.iter().cloned());

    EncodeJobSpec {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        arguments: tokens,
        container: output
            .extension()
            .and_then(|extension| match extension.to_string_lossy().as_ref() {
                "mp4" => Some(Container::Mp4),
                "mkv" => Some(Container::Mkv),
                _ => None,
            }),
    }
}

/// Builds the invocation plan for a validated preset. Pixel-transform
/// filters are placed ahead of the dimension correction so the gamma
/// remap operates on unresampled pixel data.
#[must_use]
pub fn build_spec(
    preset: &Preset,
    properties: &InputProperties,
    input: &Path,
    output: &Path,
) -> EncodeJobSpec {
    let output = output.with_extension(preset.container.extension());

    let mut arguments = vec!["-i".to_owned(), input.to_string_lossy().into_owned()];

    if preset.codec == Codec::Copy {
        arguments.push("-c:v".to_owned());
        arguments.push("copy".to_owned());
    } else {
        let plan = color::plan_with(
            &properties.color,
            preset.pix_fmt.as_deref(),
            gamma_trigger(preset.gamma),
        );

        let mut filters = plan.filters;

        if properties.width % 2 == 1 || properties.height % 2 == 1 {
            filters.push(EVEN_DIMENSION_FILTER.to_owned());
        }

        if !filters.is_empty() {
            arguments.push("-vf".to_owned());
            arguments.push(filters.join(","));
        }

        arguments.push("-c:v".to_owned());
        arguments.push(preset.codec.to_string());

        if let Some(speed_tier) = &preset.speed_tier {
            arguments.push("-preset".to_owned());
            arguments.push(speed_tier.clone());
        }

        if let Some(rate_control) = preset.rate_control {
            arguments.extend(preset.codec.rate_control_arguments(rate_control));
        }

        if let Some(pix_fmt) = &preset.pix_fmt {
            arguments.push("-pix_fmt".to_owned());
            arguments.push(pix_fmt.clone());
        }

        // Output streams are tagged display-referred BT.709 so players do
        // not have to guess.
        arguments.extend(
            [
                "-color_primaries",
                "bt709",
                "-color_trc",
                "bt709",
                "-colorspace",
                "bt709",
            ]
            .map(str::to_owned),
        );
    }

    if preset.container == Container::Mp4 {
        arguments.push("-movflags".to_owned());
        arguments.push("+faststart".to_owned());
    }

    EncodeJobSpec {
        input: input.to_path_buf(),
        output,
        arguments,
        container: Some(preset.container),
    }
}
