use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::ColorProperties;
use crate::error::CompressionError;

/// Source properties the resolver needs: geometry for the even-dimension
/// correction, frame rate for reporting, and color metadata for the
/// transform planner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputProperties {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pix_fmt: Option<String>,
    pub color: ColorProperties,
}

/// Boundary for source-property detection, so resolution and job logic can
/// be exercised without decodable video files on disk.
pub trait InputProber: Sync {
    fn probe(&self, source: &Path) -> Result<InputProperties, CompressionError>;
}

pub struct FfmpegProber;

impl InputProber for FfmpegProber {
    fn probe(&self, source: &Path) -> Result<InputProperties, CompressionError> {
        probe_input(source)
    }
}

fn input_error(source: &Path, reason: impl std::fmt::Display) -> CompressionError {
    CompressionError::InputProperties {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Reads the source's video stream parameters through the FFmpeg bindings.
/// Any failure here is a non-retryable input problem: the file is missing,
/// unreadable, or carries no usable video stream.
pub fn probe_input(source: &Path) -> Result<InputProperties, CompressionError> {
    let input_context = ffmpeg::format::input(&source).map_err(|err| input_error(source, err))?;

    let stream = input_context
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| input_error(source, "no video stream found"))?;

    let frame_rate = f64::from(stream.avg_frame_rate());

    let decoder_context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|err| input_error(source, err))?;
    let decoder = decoder_context
        .decoder()
        .video()
        .map_err(|err| input_error(source, err))?;

    let (width, height) = (decoder.width(), decoder.height());

    if width == 0 || height == 0 {
        return Err(input_error(source, "video stream reports zero resolution"));
    }

    Ok(InputProperties {
        width,
        height,
        frame_rate,
        pix_fmt: decoder
            .format()
            .descriptor()
            .map(|descriptor| descriptor.name().to_owned()),
        color: ColorProperties {
            primaries: primaries_name(decoder.color_primaries()),
            transfer: transfer_name(decoder.color_transfer_characteristic()),
            matrix: matrix_name(decoder.color_space()),
        },
    })
}

/// The subset of transfer characteristics seen on behavior rigs, by their
/// ffmpeg names. Anything unrecognized is reported as untagged, which the
/// planner treats conservatively.
fn transfer_name(transfer: ffmpeg::color::TransferCharacteristic) -> Option<String> {
    use ffmpeg::color::TransferCharacteristic;

    match transfer {
        TransferCharacteristic::BT709 => Some("bt709"),
        TransferCharacteristic::Linear => Some("linear"),
        TransferCharacteristic::GAMMA22 => Some("gamma22"),
        TransferCharacteristic::GAMMA28 => Some("gamma28"),
        TransferCharacteristic::SMPTE170M => Some("smpte170m"),
        TransferCharacteristic::SMPTE240M => Some("smpte240m"),
        TransferCharacteristic::IEC61966_2_1 => Some("iec61966-2-1"),
        TransferCharacteristic::BT2020_10 => Some("bt2020-10"),
        TransferCharacteristic::BT2020_12 => Some("bt2020-12"),
        _ => None,
    }
    .map(str::to_owned)
}

fn matrix_name(matrix: ffmpeg::color::Space) -> Option<String> {
    use ffmpeg::color::Space;

    match matrix {
        Space::BT709 => Some("bt709"),
        Space::BT470BG => Some("bt470bg"),
        Space::SMPTE170M => Some("smpte170m"),
        Space::SMPTE240M => Some("smpte240m"),
        Space::BT2020NCL => Some("bt2020nc"),
        _ => None,
    }
    .map(str::to_owned)
}

fn primaries_name(primaries: ffmpeg::color::Primaries) -> Option<String> {
    use ffmpeg::color::Primaries;

    match primaries {
        Primaries::BT709 => Some("bt709"),
        Primaries::BT470BG => Some("bt470bg"),
        Primaries::SMPTE170M => Some("smpte170m"),
        Primaries::SMPTE240M => Some("smpte240m"),
        Primaries::BT2020 => Some("bt2020"),
        _ => None,
    }
    .map(str::to_owned)
}

/// Representative display-referred properties for unit tests.
#[cfg(test)]
pub fn test_properties() -> InputProperties {
    InputProperties {
        width: 1920,
        height: 1080,
        frame_rate: 60.0,
        pix_fmt: Some("yuv420p".to_owned()),
        color: ColorProperties {
            primaries: Some("bt709".to_owned()),
            transfer: Some("bt709".to_owned()),
            matrix: Some("bt709".to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probing_a_missing_file_is_an_input_error() {
        let result = probe_input(Path::new("/nonexistent/video.mp4"));

        match result {
            Err(CompressionError::InputProperties { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/video.mp4"));
            }
            other => panic!("Expected InputProperties error, got {other:?}"),
        }
    }
}
