use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::error::CompressionError;
use crate::resolver::EncodeJobSpec;

/// Lines of tool diagnostics retained for failure reporting. FFmpeg emits
/// per-frame progress on stderr, so the tail is bounded to keep memory flat
/// on pathological output.
const STDERR_TAIL_LINES: usize = 32;

/// Raw outcome of one tool invocation, before classification.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stderr_tail: Vec<String>,
}

impl RunOutput {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Process boundary for the external encoding tool. The core depends only
/// on an argument sequence going in and an exit code plus diagnostic text
/// coming out, which lets tests substitute a fake runner for the real
/// subprocess.
pub trait EncodeRunner: Sync {
    fn run(&self, spec: &EncodeJobSpec, output: &Path) -> anyhow::Result<RunOutput>;
}

/// Invokes `ffmpeg` as a child process with captured output streams. The
/// capture keeps per-frame progress noise out of the orchestrator's own
/// logs while retaining the tail for diagnosis.
pub struct FfmpegRunner;

impl EncodeRunner for FfmpegRunner {
    fn run(&self, spec: &EncodeJobSpec, output: &Path) -> anyhow::Result<RunOutput> {
        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .arg("-nostdin")
            .arg("-hide_banner")
            .args(&spec.arguments)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Unable to spawn FFmpeg subprocess")?;

        let mut stderr = BufReader::new(
            child
                .stderr
                .take()
                .ok_or_else(|| anyhow!("Unable to access stderr for FFmpeg subprocess"))?,
        );

        let mut buffer = Vec::with_capacity(256);
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

        // FFmpeg redraws progress with carriage returns, so lines are split
        // on '\r' as well as '\n'.
        while let Ok(bytes) = stderr.read_until(b'\r', &mut buffer) {
            if bytes == 0 {
                break;
            }

            for line in String::from_utf8_lossy(&buffer).lines() {
                let line = line.trim_end();

                if !line.is_empty() {
                    tail.push_back(line.to_owned());
                }
            }

            while tail.len() > STDERR_TAIL_LINES {
                tail.pop_front();
            }

            buffer.clear();
        }

        let status = child
            .wait()
            .context("Unable to wait for FFmpeg subprocess")?;

        Ok(RunOutput {
            exit_code: status.code(),
            stderr_tail: tail.into_iter().collect(),
        })
    }
}

/// The classified outcome of one file's compression. A failed encode is a
/// recorded result, never a propagated error: retries are a decision for
/// the surrounding job-scheduling layer.
#[derive(Debug)]
pub enum EncodeResult {
    Success {
        output: PathBuf,
    },
    ToolFailure {
        exit_code: Option<i32>,
        diagnostic: String,
    },
    InputError(CompressionError),
}

impl EncodeResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Runs a resolved invocation and classifies the outcome.
///
/// The tool writes to a temporary sibling of the final output, which is
/// renamed only after the exit status and the produced file both check
/// out. A partial file from a failed or killed invocation therefore never
/// occupies the output path, and a tool that reports success while leaving
/// nothing usable on disk (disk-full, for instance) is reported as a
/// failure rather than trusted.
pub fn execute(spec: &EncodeJobSpec, runner: &dyn EncodeRunner) -> EncodeResult {
    let temporary_output = temporary_path(&spec.output);

    debug!("Encoding {:?} to {:?}", spec.input, spec.output);

    let output = match runner.run(spec, &temporary_output) {
        Ok(output) => output,
        Err(err) => {
            return EncodeResult::ToolFailure {
                exit_code: None,
                diagnostic: format!("{err:#}"),
            }
        }
    };

    if !output.succeeded() {
        remove_partial(&temporary_output);

        return EncodeResult::ToolFailure {
            exit_code: output.exit_code,
            diagnostic: output.stderr_tail.join("\n"),
        };
    }

    let produced = std::fs::metadata(&temporary_output)
        .map(|metadata| metadata.len() > 0)
        .unwrap_or(false);

    if !produced {
        remove_partial(&temporary_output);

        return EncodeResult::ToolFailure {
            exit_code: output.exit_code,
            diagnostic: format!(
                "Tool reported success but {temporary_output:?} is missing or empty"
            ),
        };
    }

    if let Err(err) = std::fs::rename(&temporary_output, &spec.output) {
        return EncodeResult::ToolFailure {
            exit_code: output.exit_code,
            diagnostic: format!(
                "Unable to rename {temporary_output:?} to {:?}: {err}",
                spec.output
            ),
        };
    }

    EncodeResult::Success {
        output: spec.output.clone(),
    }
}

/// The in-progress name keeps the real extension last so the tool still
/// infers the container from it.
fn temporary_path(output: &Path) -> PathBuf {
    output.extension().map_or_else(
        || output.with_extension("tmp"),
        |extension| output.with_extension(format!("tmp.{}", extension.to_string_lossy())),
    )
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            debug!("Unable to remove partial output {path:?}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::catalog::Container;

    struct MockRunner {
        exit_code: Option<i32>,
        stderr_tail: Vec<String>,
        output_bytes: Option<&'static [u8]>,
    }

    impl MockRunner {
        const fn succeeding(output_bytes: &'static [u8]) -> Self {
            Self {
                exit_code: Some(0),
                stderr_tail: vec![],
                output_bytes: Some(output_bytes),
            }
        }
    }

    impl EncodeRunner for MockRunner {
        fn run(&self, _spec: &EncodeJobSpec, output: &Path) -> anyhow::Result<RunOutput> {
            if let Some(bytes) = self.output_bytes {
                fs::write(output, bytes).context("Unable to write mock output")?;
            }

            Ok(RunOutput {
                exit_code: self.exit_code,
                stderr_tail: self.stderr_tail.clone(),
            })
        }
    }

    fn spec_in(directory: &Path) -> EncodeJobSpec {
        EncodeJobSpec {
            input: directory.join("clip.avi"),
            output: directory.join("clip.mp4"),
            arguments: vec!["-i".to_owned(), "clip.avi".to_owned()],
            container: Some(Container::Mp4),
        }
    }

    #[test]
    fn successful_run_with_output_is_success() {
        let directory = tempfile::tempdir().expect("Unable to create temporary directory");
        let spec = spec_in(directory.path());

        let result = execute(&spec, &MockRunner::succeeding(b"video data"));

        match result {
            EncodeResult::Success { output } => {
                assert_eq!(output, spec.output);
                assert!(output.exists(), "final output should exist");
            }
            other => panic!("Expected Success, got {other:?}"),
        }

        assert!(
            !temporary_path(&spec.output).exists(),
            "temporary file should have been renamed away"
        );
    }

    #[test]
    fn successful_exit_without_output_is_not_success() {
        let directory = tempfile::tempdir().expect("Unable to create temporary directory");
        let spec = spec_in(directory.path());

        let runner = MockRunner {
            exit_code: Some(0),
            stderr_tail: vec![],
            output_bytes: None,
        };

        match execute(&spec, &runner) {
            EncodeResult::ToolFailure { exit_code, .. } => assert_eq!(exit_code, Some(0)),
            other => panic!("Expected ToolFailure, got {other:?}"),
        }
    }

    #[test]
    fn successful_exit_with_empty_output_is_not_success() {
        let directory = tempfile::tempdir().expect("Unable to create temporary directory");
        let spec = spec_in(directory.path());

        match execute(&spec, &MockRunner::succeeding(b"")) {
            EncodeResult::ToolFailure { diagnostic, .. } => {
                assert!(diagnostic.contains("missing or empty"));
            }
            other => panic!("Expected ToolFailure, got {other:?}"),
        }

        assert!(!spec.output.exists());
    }

    #[test]
    fn failed_exit_reports_diagnostics_and_removes_partial_output() {
        let directory = tempfile::tempdir().expect("Unable to create temporary directory");
        let spec = spec_in(directory.path());

        let runner = MockRunner {
            exit_code: Some(1),
            stderr_tail: vec!["clip.avi: Invalid data found".to_owned()],
            output_bytes: Some(b"partial"),
        };

        match execute(&spec, &runner) {
            EncodeResult::ToolFailure {
                exit_code,
                diagnostic,
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(diagnostic.contains("Invalid data found"));
            }
            other => panic!("Expected ToolFailure, got {other:?}"),
        }

        assert!(
            !temporary_path(&spec.output).exists(),
            "partial output should have been removed"
        );
        assert!(!spec.output.exists());
    }

    #[test]
    fn temporary_path_keeps_container_extension_last() {
        let path = temporary_path(Path::new("/out/clip.mp4"));

        assert_eq!(path, Path::new("/out/clip.tmp.mp4"));
    }
}
