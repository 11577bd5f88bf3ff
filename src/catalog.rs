use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::error::CompressionError;
use crate::ffmpeg::InputProperties;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderFamily {
    Software,
    Hardware,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    X264,
    X265,
    HevcNvenc,
    Copy,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::X264 => write!(f, "libx264"),
            Self::X265 => write!(f, "libx265"),
            Self::HevcNvenc => write!(f, "hevc_nvenc"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

impl Codec {
    #[must_use]
    pub const fn family(&self) -> EncoderFamily {
        match self {
            Self::X264 | Self::X265 | Self::Copy => EncoderFamily::Software,
            Self::HevcNvenc => EncoderFamily::Hardware,
        }
    }

    /// Arguments selecting the rate-control mode for this codec. NVENC has
    /// no CRF mode, so constant quality maps to its own `-cq` control.
    #[must_use]
    pub fn rate_control_arguments(&self, rate_control: RateControl) -> Vec<String> {
        match (self, rate_control) {
            (Self::X264 | Self::X265, RateControl::ConstantQuality(crf)) => {
                vec!["-crf".to_owned(), format!("{crf}")]
            }
            (Self::HevcNvenc, RateControl::ConstantQuality(cq)) => {
                vec![
                    "-rc".to_owned(),
                    "vbr".to_owned(),
                    "-cq".to_owned(),
                    format!("{cq}"),
                ]
            }
            (_, RateControl::TargetBitrate(kbps)) => {
                vec!["-b:v".to_owned(), format!("{kbps}k")]
            }
            (Self::Copy, RateControl::ConstantQuality(_)) => vec![],
        }
    }
}

/// Whether encoding targets a constant perceptual-quality level or a
/// constant output bitrate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateControl {
    ConstantQuality(u8),
    TargetBitrate(u64),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Container {
    Mp4,
    Mkv,
}

impl Container {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
        }
    }
}

/// How a preset interacts with the color transform planner: follow the
/// source-property predicate, or force the gamma remap on or off for
/// sources whose metadata is known to be wrong.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GammaPolicy {
    #[default]
    Auto,
    Always,
    Never,
}

/// A named, offline-validated bundle of encoder parameters. Entries are
/// curated against perceptual metrics before they land in the catalog, so
/// the runtime treats them as trusted constants and performs selection only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub label: String,
    pub codec: Codec,
    pub speed_tier: Option<String>,
    pub rate_control: Option<RateControl>,
    pub pix_fmt: Option<String>,
    pub container: Container,
    #[serde(default)]
    pub gamma: GammaPolicy,
}

impl Preset {
    #[must_use]
    pub const fn family(&self) -> EncoderFamily {
        self.codec.family()
    }
}

pub const DEFAULT_PRESET_LABEL: &str = "default";

/// Immutable label-to-preset table. Constructed once at startup and never
/// mutated afterwards, so concurrent readers need no locking.
#[derive(Clone, Debug)]
pub struct Catalog {
    presets: BTreeMap<String, Preset>,
    default: Preset,
}

impl Catalog {
    /// Builds a catalog from a preset list. The table must contain a
    /// broadly-compatible `default` entry: a software encoder in
    /// constant-quality mode, so `default_for` can never hand out a
    /// hardware-only configuration.
    pub fn new(presets: Vec<Preset>) -> anyhow::Result<Self> {
        let default = presets
            .iter()
            .find(|preset| preset.label == DEFAULT_PRESET_LABEL)
            .cloned()
            .ok_or_else(|| anyhow!("Preset catalog has no {DEFAULT_PRESET_LABEL:?} entry"))?;

        if default.family() != EncoderFamily::Software {
            return Err(anyhow!(
                "Default preset must use a software encoder, found {}",
                default.codec
            ));
        }

        if !matches!(default.rate_control, Some(RateControl::ConstantQuality(_))) {
            return Err(anyhow!(
                "Default preset must use constant-quality rate control"
            ));
        }

        Ok(Self {
            presets: presets
                .into_iter()
                .map(|preset| (preset.label.clone(), preset))
                .collect(),
            default,
        })
    }

    /// The built-in curated table. Quality values were validated offline
    /// with VMAF against reference behavior recordings; do not adjust them
    /// here without re-running that validation.
    #[must_use]
    pub fn builtin() -> Self {
        let default = Preset {
            label: DEFAULT_PRESET_LABEL.to_owned(),
            codec: Codec::X264,
            speed_tier: Some("veryslow".to_owned()),
            rate_control: Some(RateControl::ConstantQuality(18)),
            pix_fmt: Some("yuv420p".to_owned()),
            container: Container::Mp4,
            gamma: GammaPolicy::Auto,
        };

        let presets = vec![
            default.clone(),
            Preset {
                label: "gamma-encoding".to_owned(),
                gamma: GammaPolicy::Always,
                ..default.clone()
            },
            Preset {
                label: "no-gamma".to_owned(),
                gamma: GammaPolicy::Never,
                ..default.clone()
            },
            Preset {
                label: "archival".to_owned(),
                codec: Codec::X265,
                speed_tier: Some("slower".to_owned()),
                rate_control: Some(RateControl::ConstantQuality(16)),
                pix_fmt: Some("yuv420p10le".to_owned()),
                container: Container::Mkv,
                gamma: GammaPolicy::Auto,
            },
            Preset {
                label: "hardware-hevc".to_owned(),
                codec: Codec::HevcNvenc,
                speed_tier: Some("p7".to_owned()),
                rate_control: Some(RateControl::TargetBitrate(8000)),
                pix_fmt: Some("yuv420p".to_owned()),
                container: Container::Mp4,
                gamma: GammaPolicy::Auto,
            },
            Preset {
                label: "no-compression".to_owned(),
                codec: Codec::Copy,
                speed_tier: None,
                rate_control: None,
                pix_fmt: None,
                container: Container::Mp4,
                gamma: GammaPolicy::Never,
            },
        ];

        Self {
            presets: presets
                .into_iter()
                .map(|preset| (preset.label.clone(), preset))
                .collect(),
            default,
        }
    }

    /// Loads a catalog from a JSON preset table, replacing the built-in
    /// entries. A table that fails validation halts the job before any
    /// file is processed.
    pub fn from_json(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Unable to open preset catalog {path:?}"))?;
        let reader = BufReader::new(file);

        let presets: Vec<Preset> = serde_json::from_reader(reader)
            .with_context(|| format!("Unable to deserialize preset catalog from {path:?}"))?;

        Self::new(presets).with_context(|| format!("Invalid preset catalog in {path:?}"))
    }

    pub fn lookup(&self, label: &str) -> Result<&Preset, CompressionError> {
        self.presets
            .get(label)
            .ok_or_else(|| CompressionError::UnknownPreset(label.to_owned()))
    }

    /// The conservative, broadly-compatible preset used when the caller
    /// does not request one. Always succeeds; the constructor guarantees
    /// the entry is not hardware-only.
    #[must_use]
    pub const fn default_for(&self, _properties: &InputProperties) -> &Preset {
        &self.default
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ffmpeg::test_properties;

    #[test]
    fn lookup_unknown_label_fails() {
        let catalog = Catalog::builtin();

        match catalog.lookup("nonexistent") {
            Err(CompressionError::UnknownPreset(label)) => assert_eq!(label, "nonexistent"),
            other => panic!("Expected UnknownPreset error, got {other:?}"),
        }
    }

    #[test]
    fn default_is_broadly_compatible() {
        let catalog = Catalog::builtin();
        let preset = catalog.default_for(&test_properties());

        assert_eq!(preset.family(), EncoderFamily::Software);
        assert!(matches!(
            preset.rate_control,
            Some(RateControl::ConstantQuality(_))
        ));
        assert_eq!(preset.pix_fmt.as_deref(), Some("yuv420p"));
        assert_eq!(preset.container, Container::Mp4);
    }

    #[test]
    fn builtin_contains_expected_labels() {
        let catalog = Catalog::builtin();

        for label in [
            "default",
            "gamma-encoding",
            "no-gamma",
            "archival",
            "hardware-hevc",
            "no-compression",
        ] {
            assert!(catalog.lookup(label).is_ok(), "missing preset {label}");
        }
    }

    #[test]
    fn json_catalog_round_trips() {
        let presets = vec![Preset {
            label: DEFAULT_PRESET_LABEL.to_owned(),
            codec: Codec::X264,
            speed_tier: Some("slow".to_owned()),
            rate_control: Some(RateControl::ConstantQuality(20)),
            pix_fmt: Some("yuv420p".to_owned()),
            container: Container::Mp4,
            gamma: GammaPolicy::Auto,
        }];

        let directory = tempfile::tempdir().expect("Unable to create temporary directory");
        let path = directory.path().join("catalog.json");

        let mut file = File::create(&path).expect("Unable to create catalog file");
        let json = serde_json::to_string(&presets).expect("Unable to serialize presets");
        file.write_all(json.as_bytes())
            .expect("Unable to write catalog file");

        let catalog = Catalog::from_json(&path).expect("Unable to load catalog");
        let preset = catalog.lookup("default").expect("Missing default preset");

        assert_eq!(preset.rate_control, Some(RateControl::ConstantQuality(20)));
    }

    #[test]
    fn catalog_without_default_is_rejected() {
        let presets = vec![Preset {
            label: "fast".to_owned(),
            codec: Codec::X264,
            speed_tier: Some("veryfast".to_owned()),
            rate_control: Some(RateControl::ConstantQuality(28)),
            pix_fmt: Some("yuv420p".to_owned()),
            container: Container::Mp4,
            gamma: GammaPolicy::Auto,
        }];

        assert!(Catalog::new(presets).is_err());
    }

    #[test]
    fn hardware_default_is_rejected() {
        let presets = vec![Preset {
            label: DEFAULT_PRESET_LABEL.to_owned(),
            codec: Codec::HevcNvenc,
            speed_tier: Some("p5".to_owned()),
            rate_control: Some(RateControl::ConstantQuality(24)),
            pix_fmt: Some("yuv420p".to_owned()),
            container: Container::Mp4,
            gamma: GammaPolicy::Auto,
        }];

        assert!(Catalog::new(presets).is_err());
    }
}
