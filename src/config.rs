use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser;

/// What the caller wants done to a video. Exactly one variant applies:
/// catalog default, a named catalog entry, or raw encoder arguments that
/// bypass catalog validation entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompressionRequest {
    Default,
    NamedPreset(String),
    /// Raw encoder arguments. Input options are emitted before `-i` so
    /// they apply at decode time (declaring an untagged source transfer,
    /// seeking, forced input formats); output options follow the input
    /// path as usual.
    CustomArgs {
        input_options: Vec<String>,
        output_options: Vec<String>,
    },
}

impl std::fmt::Display for CompressionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default preset"),
            Self::NamedPreset(label) => write!(f, "preset {label:?}"),
            Self::CustomArgs { .. } => write!(f, "user-supplied arguments"),
        }
    }
}

#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Named preset from the catalog to apply to all videos
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Raw ffmpeg output arguments, bypassing the preset catalog entirely
    #[arg(long, conflicts_with = "preset", allow_hyphen_values = true)]
    pub ffmpeg_args: Option<String>,

    /// Raw ffmpeg input arguments, placed before -i (requires or implies
    /// a custom request; may be combined with --ffmpeg-args)
    #[arg(long, conflicts_with = "preset", allow_hyphen_values = true)]
    pub ffmpeg_input_args: Option<String>,

    /// Per-path preset overrides; directories apply to every video beneath them
    #[arg(long = "override", value_name = "PATH=PRESET")]
    pub overrides: Vec<String>,

    /// JSON preset table replacing the built-in catalog
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Number of concurrent encodes (0 = one per logical CPU)
    #[arg(short, long, value_parser = clap::value_parser!(usize), default_value_t = 0)]
    pub workers: usize,

    /// File extensions treated as videos
    #[arg(long, value_delimiter = ',', default_values_t = default_extensions())]
    pub extensions: Vec<String>,

    /// Directory containing the source videos
    pub input_source: PathBuf,

    /// Output directory
    pub output_directory: PathBuf,
}

fn split_options(options: Option<&str>) -> Vec<String> {
    options
        .map(|arguments| arguments.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

fn default_extensions() -> Vec<String> {
    ["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm"]
        .map(str::to_owned)
        .to_vec()
}

impl Config {
    /// The request applied to videos without a per-path override.
    #[must_use]
    pub fn global_request(&self) -> CompressionRequest {
        if self.ffmpeg_args.is_some() || self.ffmpeg_input_args.is_some() {
            CompressionRequest::CustomArgs {
                input_options: split_options(self.ffmpeg_input_args.as_deref()),
                output_options: split_options(self.ffmpeg_args.as_deref()),
            }
        } else if let Some(label) = &self.preset {
            CompressionRequest::NamedPreset(label.clone())
        } else {
            CompressionRequest::Default
        }
    }

    /// Parses the `PATH=PRESET` override pairs. Relative paths are taken
    /// relative to the input source directory.
    pub fn override_set(&self) -> anyhow::Result<OverrideSet> {
        let mut entries = vec![];

        for pair in &self.overrides {
            let (path, label) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Override {pair:?} is not a PATH=PRESET pair"))?;

            let path = PathBuf::from(path);
            let path = if path.is_absolute() {
                path
            } else {
                self.input_source.join(path)
            };

            entries.push((path, CompressionRequest::NamedPreset(label.to_owned())));
        }

        Ok(OverrideSet { entries })
    }

    #[must_use]
    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .map(|extension| extension.to_string_lossy().to_lowercase())
            .is_some_and(|extension| self.extensions.iter().any(|video| *video == extension))
    }

    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            rayon::current_num_threads()
        } else {
            self.workers
        }
    }
}

/// Per-path request overrides. A pair naming a file wins over a pair
/// naming one of its ancestor directories; among directory pairs the
/// deepest match wins.
#[derive(Clone, Debug, Default)]
pub struct OverrideSet {
    entries: Vec<(PathBuf, CompressionRequest)>,
}

impl OverrideSet {
    #[must_use]
    pub fn request_for(&self, video: &Path) -> Option<&CompressionRequest> {
        if let Some((_, request)) = self
            .entries
            .iter()
            .find(|(path, _)| path.as_path() == video)
        {
            return Some(request);
        }

        self.entries
            .iter()
            .filter(|(path, _)| video.starts_with(path))
            .max_by_key(|(path, _)| path.components().count())
            .map(|(_, request)| request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(arguments: &[&str]) -> Config {
        let mut full = vec!["behavior-video-compression"];
        full.extend_from_slice(arguments);
        full.extend_from_slice(&["/videos", "/out"]);

        Config::try_parse_from(full).expect("Unable to parse arguments")
    }

    #[test]
    fn global_request_defaults_to_catalog_default() {
        assert_eq!(parse(&[]).global_request(), CompressionRequest::Default);
    }

    #[test]
    fn preset_flag_selects_a_named_preset() {
        assert_eq!(
            parse(&["--preset", "archival"]).global_request(),
            CompressionRequest::NamedPreset("archival".to_owned())
        );
    }

    #[test]
    fn ffmpeg_args_become_a_custom_request() {
        let request = parse(&["--ffmpeg-args", "-c:v libx264 -crf 40"]).global_request();

        assert_eq!(
            request,
            CompressionRequest::CustomArgs {
                input_options: vec![],
                output_options: ["-c:v", "libx264", "-crf", "40"].map(str::to_owned).to_vec(),
            }
        );
    }

    #[test]
    fn ffmpeg_input_args_are_carried_separately() {
        let request = parse(&[
            "--ffmpeg-input-args",
            "-color_trc linear",
            "--ffmpeg-args",
            "-c:v libx264",
        ])
        .global_request();

        assert_eq!(
            request,
            CompressionRequest::CustomArgs {
                input_options: ["-color_trc", "linear"].map(str::to_owned).to_vec(),
                output_options: ["-c:v", "libx264"].map(str::to_owned).to_vec(),
            }
        );
    }

    #[test]
    fn input_args_alone_still_select_a_custom_request() {
        let request = parse(&["--ffmpeg-input-args", "-r 30"]).global_request();

        assert_eq!(
            request,
            CompressionRequest::CustomArgs {
                input_options: ["-r", "30"].map(str::to_owned).to_vec(),
                output_options: vec![],
            }
        );
    }

    #[test]
    fn file_override_beats_directory_override() {
        let config = parse(&[
            "--override",
            "camera1=no-compression",
            "--override",
            "camera1/clip.mp4=archival",
        ]);
        let overrides = config.override_set().expect("Unable to parse overrides");

        assert_eq!(
            overrides.request_for(Path::new("/videos/camera1/clip.mp4")),
            Some(&CompressionRequest::NamedPreset("archival".to_owned()))
        );
        assert_eq!(
            overrides.request_for(Path::new("/videos/camera1/other.mp4")),
            Some(&CompressionRequest::NamedPreset("no-compression".to_owned()))
        );
        assert_eq!(overrides.request_for(Path::new("/videos/camera2/clip.mp4")), None);
    }

    #[test]
    fn deepest_directory_override_wins() {
        let config = parse(&[
            "--override",
            "camera1=no-compression",
            "--override",
            "camera1/session2=archival",
        ]);
        let overrides = config.override_set().expect("Unable to parse overrides");

        assert_eq!(
            overrides.request_for(Path::new("/videos/camera1/session2/clip.mp4")),
            Some(&CompressionRequest::NamedPreset("archival".to_owned()))
        );
    }

    #[test]
    fn malformed_override_is_rejected() {
        let config = parse(&["--override", "camera1"]);

        assert!(config.override_set().is_err());
    }

    #[test]
    fn video_extension_matching_is_case_insensitive() {
        let config = parse(&[]);

        assert!(config.is_video(Path::new("/videos/CLIP.MP4")));
        assert!(config.is_video(Path::new("/videos/clip.webm")));
        assert!(!config.is_video(Path::new("/videos/metadata.csv")));
    }
}
