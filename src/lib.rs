use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use indicatif::HumanDuration;
use tracing::{info, warn};
use walkdir::WalkDir;

pub mod catalog;
pub mod color;
pub mod config;
pub mod error;
pub mod executor;
pub mod ffmpeg;
pub mod job;
pub mod resolver;
pub mod util;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::executor::{EncodeResult, FfmpegRunner};
use crate::ffmpeg::FfmpegProber;
use crate::job::{EncodeTask, JobResult};

/// Compresses every video under the input source into the output
/// directory, mirroring the directory structure and symlinking non-video
/// files (session metadata and the like) across unchanged.
pub fn run(config: &Config) -> anyhow::Result<JobResult> {
    let started = Instant::now();

    util::verify_directory(&config.output_directory)
        .context("Unable to verify output directory")?;

    // A catalog that fails to load is the one condition that halts the job
    // before any file is touched.
    let catalog = match &config.catalog {
        Some(path) => Catalog::from_json(path).context("Unable to load preset catalog")?,
        None => Catalog::builtin(),
    };

    let overrides = config
        .override_set()
        .context("Unable to parse per-path overrides")?;
    let global_request = config.global_request();

    let mut tasks = vec![];

    for entry in WalkDir::new(&config.input_source).sort_by_file_name() {
        let entry = entry.context("Unable to walk input directory")?;

        if !entry.file_type().is_file() {
            continue;
        }

        let input = entry.path();
        let relative = input
            .strip_prefix(&config.input_source)
            .with_context(|| format!("Unable to relativize {input:?}"))?;
        let destination = config.output_directory.join(relative);

        if config.is_video(input) {
            let request = overrides
                .request_for(input)
                .cloned()
                .unwrap_or_else(|| global_request.clone());

            tasks.push(EncodeTask {
                input: input.to_path_buf(),
                output: destination,
                request,
            });
        } else {
            mirror_file(input, &destination)
                .with_context(|| format!("Unable to mirror {input:?}"))?;
        }
    }

    if tasks.is_empty() {
        info!("No video files found in {:?}", config.input_source);
    }

    let result = job::run_job(
        &tasks,
        &catalog,
        &FfmpegProber,
        &FfmpegRunner,
        config.effective_workers(),
    )
    .context("Unable to run compression job")?;

    for outcome in result.entries() {
        match &outcome.result {
            EncodeResult::Success { .. } => {}
            EncodeResult::ToolFailure {
                exit_code,
                diagnostic,
            } => warn!(
                "Failed to compress {:?} (exit code {exit_code:?}):\n{diagnostic}",
                outcome.input
            ),
            EncodeResult::InputError(err) => {
                warn!("Failed to compress {:?}: {err}", outcome.input);
            }
        }
    }

    info!(
        "Job finished in {} ({} succeeded, {} failed)",
        HumanDuration(started.elapsed()),
        result.successes(),
        result.failures()
    );

    Ok(result)
}

/// Non-video files are carried across as symlinks so the output directory
/// is a complete, self-describing session.
fn mirror_file(source: &Path, destination: &Path) -> anyhow::Result<()> {
    util::verify_filename(destination)?;

    // symlink_metadata rather than exists(): the latter follows links, so
    // a dangling symlink left by an earlier run would look absent and the
    // recreate would fail with AlreadyExists.
    if destination.symlink_metadata().is_ok() {
        return Ok(());
    }

    // Relative sources would produce links relative to the destination
    // directory, so the link target is always made absolute.
    #[cfg(unix)]
    {
        let target = std::fs::canonicalize(source)
            .with_context(|| format!("Unable to canonicalize {source:?}"))?;
        std::os::unix::fs::symlink(&target, destination)
            .with_context(|| format!("Unable to symlink {target:?} to {destination:?}"))?;
    }

    #[cfg(not(unix))]
    std::fs::copy(source, destination)
        .map(|_bytes| ())
        .with_context(|| format!("Unable to copy {source:?} to {destination:?}"))?;

    Ok(())
}
