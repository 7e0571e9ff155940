//! Stage 2: dispatching simulations to a compute environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::{ComputeEnvironment, JobSpec, JobStatus, Resolved};
use crate::materialize::{run_output_dir, unit_dir};
use crate::{COMMANDS_FILE, EXEC_DIR_NAME};

use super::artifacts::run_output_valid;
use super::state::PipelineState;

/// Outcome of stage 2.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecReport {
    pub dispatched: usize,
    /// Runs skipped because their output was already complete
    pub skipped: usize,
    pub failed: usize,
}

/// Node list shared with the jobs of a single invocation.
pub fn node_file_path(batch_root: &Path, run_id: &str) -> PathBuf {
    batch_root
        .join(EXEC_DIR_NAME)
        .join(format!("nodes-{}.txt", run_id))
}

fn write_node_file(batch_root: &Path, resolved: &Resolved) -> Result<PathBuf> {
    let path = node_file_path(batch_root, &resolved.run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut text = resolved.nodes.join("\n");
    text.push('\n');
    fs::write(&path, text)?;
    Ok(path)
}

/// Collects jobs for all runs without complete output, in unit then run
/// order. Partial output of those runs is removed.
pub fn pending_jobs(
    batch_root: &Path,
    state: &PipelineState,
    metrics_leaf: &str,
) -> Result<(Vec<JobSpec>, usize)> {
    let mut jobs = Vec::new();
    let mut skipped = 0;
    for unit in 0..state.n_units {
        let dir = unit_dir(batch_root, unit);
        let commands = fs::read_to_string(dir.join(COMMANDS_FILE))?;
        for (run, command) in commands.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            let run = run as u32;
            let output = run_output_dir(batch_root, unit, &state.template_stem, run);
            if run_output_valid(&output, metrics_leaf) {
                skipped += 1;
                continue;
            }
            if output.exists() {
                warn!(
                    "removing partial output of exp{} run {} at {}",
                    unit,
                    run,
                    output.to_string_lossy()
                );
                fs::remove_dir_all(&output)?;
            }
            jobs.push(JobSpec {
                index: jobs.len(),
                unit,
                run,
                command: command.to_string(),
                workdir: dir.clone(),
            });
        }
    }
    Ok((jobs, skipped))
}

/// Dispatches every pending run and waits for all of them.
///
/// Jobs count as failed when they leave no well-formed output behind,
/// whatever their exit status.
pub fn run(
    batch_root: &Path,
    state: &PipelineState,
    env: &dyn ComputeEnvironment,
    resolved: &Resolved,
    metrics_leaf: &str,
) -> Result<ExecReport> {
    let (jobs, skipped) = pending_jobs(batch_root, state, metrics_leaf)?;
    if jobs.is_empty() {
        info!("all {} run(s) already have complete output", skipped);
        return Ok(ExecReport {
            dispatched: 0,
            skipped,
            failed: 0,
        });
    }

    let node_file = write_node_file(batch_root, resolved)?;
    info!(
        "dispatching {} simulation(s) to {} ({} node(s), {} job(s) per node, run {}), skipping {} complete",
        jobs.len(),
        env.name(),
        resolved.nodes.len(),
        resolved.jobs_per_node,
        resolved.run_id,
        skipped
    );
    debug!("node list written to {}", node_file.to_string_lossy());

    let handles = env.submit(resolved, jobs)?;
    let dispatched = handles.len();
    let mut failed = 0;
    for handle in &handles {
        let status = handle.wait();
        let output = run_output_dir(
            batch_root,
            handle.job.unit,
            &state.template_stem,
            handle.job.run,
        );
        if run_output_valid(&output, metrics_leaf) {
            if status != JobStatus::Exited(0) {
                debug!(
                    "exp{} run {} {} but its output is complete",
                    handle.job.unit, handle.job.run, status
                );
            }
        } else {
            failed += 1;
            warn!(
                "exp{} run {} left no valid output ({})",
                handle.job.unit, handle.job.run, status
            );
        }
    }

    let report = ExecReport {
        dispatched,
        skipped,
        failed,
    };
    if failed > 0 {
        return Err(Error::WorkerFailure {
            failed,
            total: dispatched,
        });
    }
    Ok(report)
}
