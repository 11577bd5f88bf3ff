use std::path::PathBuf;

use anyhow::{anyhow, Context};
use crossbeam_queue::ArrayQueue;
use indicatif::ProgressBar;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::CompressionRequest;
use crate::executor::{execute, EncodeResult, EncodeRunner};
use crate::ffmpeg::InputProber;
use crate::resolver;
use crate::util::{create_progress_style, verify_filename};

/// One video to compress: where it is, where its compressed form goes,
/// and what the caller asked for. The resolver may adjust the output
/// extension to match the chosen container.
#[derive(Clone, Debug)]
pub struct EncodeTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub request: CompressionRequest,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub result: EncodeResult,
}

/// Per-file outcomes in input order, appended as files complete and never
/// mutated after the job returns. An empty result means there was nothing
/// to encode, which callers can distinguish from "everything failed".
#[derive(Debug, Default)]
pub struct JobResult {
    entries: Vec<FileOutcome>,
}

impl JobResult {
    #[must_use]
    pub fn entries(&self) -> &[FileOutcome] {
        &self.entries
    }

    #[must_use]
    pub fn successes(&self) -> usize {
        self.entries
            .iter()
            .filter(|outcome| outcome.result.is_success())
            .count()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.entries.len() - self.successes()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves and executes one task. Every failure mode lands in the
/// returned result; nothing propagates, so one bad file never aborts its
/// siblings.
fn process_task(
    task: &EncodeTask,
    catalog: &Catalog,
    prober: &dyn InputProber,
    runner: &dyn EncodeRunner,
) -> EncodeResult {
    let spec = match resolver::resolve(&task.request, catalog, prober, &task.input, &task.output) {
        Ok(spec) => spec,
        Err(err) => return EncodeResult::InputError(err),
    };

    if let Err(err) = verify_filename(&spec.output) {
        return EncodeResult::ToolFailure {
            exit_code: None,
            diagnostic: format!("{err:#}"),
        };
    }

    execute(&spec, runner)
}

/// Runs every task to completion across a bounded worker pool. Workers
/// share nothing but the read-only catalog and the two queues; completion
/// order is unconstrained, but the returned entries always match the
/// input order.
pub fn run_job(
    tasks: &[EncodeTask],
    catalog: &Catalog,
    prober: &dyn InputProber,
    runner: &dyn EncodeRunner,
    workers: usize,
) -> anyhow::Result<JobResult> {
    if tasks.is_empty() {
        return Ok(JobResult::default());
    }

    let workers = workers.clamp(1, tasks.len());

    let task_queue: ArrayQueue<(usize, &EncodeTask)> = ArrayQueue::new(tasks.len());
    let result_queue: ArrayQueue<(usize, EncodeResult)> = ArrayQueue::new(tasks.len());

    for pair in tasks.iter().enumerate() {
        if task_queue.push(pair).is_err() {
            return Err(anyhow!("Encoding task queue was unexpectedly full"));
        }
    }

    let progress_bar = ProgressBar::new(tasks.len().try_into().unwrap_or(u64::MAX));
    progress_bar.set_style(
        create_progress_style(
            "{spinner:.green} [{elapsed_precise}] Compressing videos... [{wide_bar:.cyan/blue}] {human_pos}/{human_len} (ETA: {smooth_eta})",
        )
        .context("Unable to create compression progress bar style")?,
    );

    let worker_panicked = std::thread::scope(|scope| -> anyhow::Result<bool> {
        let threads = (0..workers)
            .map(|_worker_index| {
                scope.spawn(|| -> anyhow::Result<()> {
                    while let Some((index, task)) = task_queue.pop() {
                        info!("Compressing {:?} with {}", task.input, task.request);

                        let result = process_task(task, catalog, prober, runner);

                        if let EncodeResult::ToolFailure { exit_code, .. } = &result {
                            warn!(
                                "Encoding {:?} failed with exit code {exit_code:?}",
                                task.input
                            );
                        }

                        if result_queue.push((index, result)).is_err() {
                            return Err(anyhow!("Encoding result queue was unexpectedly full"));
                        }

                        progress_bar.inc(1);
                    }

                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        // A panicked worker forfeits only the files it never finished;
        // outcomes already pushed by it or its siblings are kept.
        let mut panicked = false;

        for thread in threads {
            match thread.join() {
                Ok(result) => result.context("Unable to complete encoding worker")?,
                Err(panic) => {
                    panicked = true;
                    error!("Encoding worker panicked: {panic:?}");
                }
            }
        }

        Ok(panicked)
    })?;

    progress_bar.finish();

    let mut slots: Vec<Option<EncodeResult>> = (0..tasks.len()).map(|_| None).collect();

    while let Some((index, result)) = result_queue.pop() {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    let mut entries = vec![];

    for (task, slot) in tasks.iter().zip(slots) {
        let result = match slot {
            Some(result) => result,
            None if worker_panicked => EncodeResult::ToolFailure {
                exit_code: None,
                diagnostic: "Encoding worker panicked before recording an outcome".to_owned(),
            },
            None => return Err(anyhow!("BUG: No recorded outcome for {:?}", task.input)),
        };

        entries.push(FileOutcome {
            input: task.input.clone(),
            result,
        });
    }

    Ok(JobResult { entries })
}
