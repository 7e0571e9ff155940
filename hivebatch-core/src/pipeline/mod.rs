//! Staged pipeline controller.
//!
//! A batch goes through five stages:
//!
//! 1. generate: parse criteria, generate and materialize experiments
//! 2. execute: run every simulation on a compute environment
//! 3. process: average run output for each experiment
//! 4. visualize: render the processed batch
//! 5. compare: compare two or more processed batches
//!
//! Each stage checks the artifacts of the previous one before doing any
//! work. Stage 2 can be re-run any number of times, runs that already have
//! complete output are skipped.

pub mod artifacts;
pub mod execute;
pub mod external;
pub mod process;
pub mod state;

mod generate;

pub use execute::{node_file_path, ExecReport};
pub use external::{Comparator, ExternalCommand, Renderer};
pub use process::ProcessReport;
pub use state::{OwnerGuard, PipelineState, StageRecord};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_enum::TryFromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::config::AuxConfig;
use crate::criteria::{CriteriaDescriptor, CriteriaRegistry};
use crate::error::{Error, Result};
use crate::exec::ComputeEnvironment;
use crate::materialize::{run_output_dir, BatchSettings};
use crate::scenario::ScenarioSpec;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum Stage {
    Generate = 1,
    Execute = 2,
    Process = 3,
    Visualize = 4,
    Compare = 5,
}

impl Stage {
    /// Stages run when none are selected explicitly.
    pub const DEFAULT: [Stage; 4] = [
        Stage::Generate,
        Stage::Execute,
        Stage::Process,
        Stage::Visualize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Execute => "execute",
            Stage::Process => "process",
            Stage::Visualize => "visualize",
            Stage::Compare => "compare",
        }
    }

    /// Parses a comma or space separated stage list, e.g. `1,2,3`.
    pub fn parse_list(input: &str) -> Result<Vec<Stage>> {
        input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(Stage::from_str)
            .collect()
    }
}

impl FromStr for Stage {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(n) = s.parse::<u8>() {
            return Stage::try_from_primitive(n)
                .map_err(|_| Error::Other(format!("no such pipeline stage: {}", n)));
        }
        match s {
            "generate" => Ok(Stage::Generate),
            "execute" => Ok(Stage::Execute),
            "process" => Ok(Stage::Process),
            "visualize" => Ok(Stage::Visualize),
            "compare" => Ok(Stage::Compare),
            _ => Err(Error::Other(format!("no such pipeline stage: {}", s))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", *self as u8, self.name())
    }
}

/// Everything stage 1 needs to generate a batch.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub criteria: CriteriaDescriptor,
    pub scenario: ScenarioSpec,
    /// Template configuration file
    pub template: PathBuf,
    pub settings: BatchSettings,
}

/// What a single pipeline invocation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub completed: Vec<Stage>,
    pub exec: Option<ExecReport>,
    pub process: Option<ProcessReport>,
}

/// Identifier used when no compute environment provides one.
pub fn local_run_id() -> String {
    std::process::id().to_string()
}

/// Pipeline controller owning a single batch root.
pub struct Pipeline {
    batch_root: PathBuf,
    aux: AuxConfig,
    registry: CriteriaRegistry,
    batch: Option<BatchSpec>,
    renderer: Box<dyn Renderer>,
    comparator: Box<dyn Comparator>,
    compare_with: Vec<PathBuf>,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Creates a controller for the given batch root. Visualization and
    /// comparison use the external commands from the auxiliary config.
    pub fn new(batch_root: &Path, aux: AuxConfig) -> Self {
        let renderer = Box::new(ExternalCommand::new(aux.stages.visualize_command.clone()));
        let comparator = Box::new(ExternalCommand::new(aux.stages.compare_command.clone()));
        Pipeline {
            batch_root: batch_root.to_path_buf(),
            aux,
            registry: CriteriaRegistry::default(),
            batch: None,
            renderer,
            comparator,
            compare_with: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_batch(mut self, batch: BatchSpec) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_registry(mut self, registry: CriteriaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_comparator(mut self, comparator: Box<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Other batch roots to include in stage 5.
    pub fn compare_with(mut self, batch_roots: Vec<PathBuf>) -> Self {
        self.compare_with = batch_roots;
        self
    }

    /// Flag checked between stages, once set no further stage is started.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn batch_root(&self) -> &Path {
        &self.batch_root
    }

    pub fn state(&self) -> Result<Option<PipelineState>> {
        PipelineState::load(&self.batch_root)
    }

    /// Runs the selected stages in ascending order.
    ///
    /// The compute environment is only used by stage 2 and has to be given
    /// whenever stage 2 is selected.
    pub fn run(
        &self,
        stages: &[Stage],
        env: Option<&dyn ComputeEnvironment>,
    ) -> Result<RunSummary> {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();

        let resolved = if stages.contains(&Stage::Execute) {
            let env = env.ok_or_else(|| {
                Error::prerequisite(Stage::Execute, "no compute environment given")
            })?;
            let resolved = env.resolve()?;
            debug!("resolved {} environment: {:?}", env.name(), resolved);
            Some(resolved)
        } else {
            None
        };
        let run_id = resolved
            .as_ref()
            .map(|r| r.run_id.clone())
            .unwrap_or_else(local_run_id);
        let _guard = OwnerGuard::acquire(&self.batch_root, &run_id)?;

        let mut summary = RunSummary::default();
        for stage in stages {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("interrupted, not starting stage {}", stage);
                break;
            }
            info!("starting stage {}", stage);
            let mut state = match stage {
                Stage::Generate => {
                    let batch = self.batch.as_ref().ok_or_else(|| {
                        Error::prerequisite(
                            stage,
                            "criteria, scenario and template are required",
                        )
                    })?;
                    generate::run(&self.batch_root, batch, &self.aux, &self.registry)?
                }
                Stage::Execute => {
                    let state = self.check_generated(stage)?;
                    let (env, resolved) = match (env, &resolved) {
                        (Some(env), Some(resolved)) => (env, resolved),
                        _ => {
                            return Err(Error::prerequisite(
                                stage,
                                "no compute environment given",
                            ))
                        }
                    };
                    let report = execute::run(
                        &self.batch_root,
                        &state,
                        env,
                        resolved,
                        &self.aux.sim.metrics_leaf,
                    )?;
                    info!(
                        "dispatched {} simulation(s), {} already complete",
                        report.dispatched, report.skipped
                    );
                    summary.exec = Some(report);
                    state
                }
                Stage::Process => {
                    let state = self.check_executed(stage)?;
                    let report = process::run(
                        &self.batch_root,
                        &state,
                        &self.aux.sim.metrics_leaf,
                        self.aux.stages.gen_stddev,
                    )?;
                    info!(
                        "averaged {} metrics file(s) over {} experiment(s)",
                        report.files, report.units
                    );
                    summary.process = Some(report);
                    state
                }
                Stage::Visualize => {
                    let state = check_processed(&self.batch_root, stage)?;
                    self.renderer.render(&self.batch_root, &state)?;
                    state
                }
                Stage::Compare => {
                    let mut roots = vec![self.batch_root.clone()];
                    for root in &self.compare_with {
                        if !roots.contains(root) {
                            roots.push(root.clone());
                        }
                    }
                    if roots.len() < 2 {
                        return Err(Error::prerequisite(
                            stage,
                            "comparison needs at least two processed batches",
                        ));
                    }
                    let mut own = None;
                    for root in &roots {
                        let state = check_processed(root, stage)?;
                        if own.is_none() {
                            own = Some(state);
                        }
                    }
                    self.comparator.compare(&roots)?;
                    match own {
                        Some(state) => state,
                        None => return Err(Error::prerequisite(stage, "no batch to compare")),
                    }
                }
            };
            state.record(stage, &run_id);
            state.save(&self.batch_root)?;
            summary.completed.push(stage);
        }
        Ok(summary)
    }

    fn check_generated(&self, stage: Stage) -> Result<PipelineState> {
        let state = PipelineState::load_required(&self.batch_root, stage)?;
        if !state.is_complete(Stage::Generate) {
            return Err(Error::prerequisite(stage, "stage 1 never completed"));
        }
        for unit in 0..state.n_units {
            if !artifacts::unit_generated(&self.batch_root, unit, &state.template_stem) {
                return Err(Error::prerequisite(
                    stage,
                    format!("exp{} is missing generated configuration", unit),
                ));
            }
        }
        Ok(state)
    }

    fn check_executed(&self, stage: Stage) -> Result<PipelineState> {
        let state = self.check_generated(stage)?;
        if !state.is_complete(Stage::Execute) {
            return Err(Error::prerequisite(stage, "stage 2 never completed"));
        }
        for unit in 0..state.n_units {
            for run in 0..state.n_runs {
                let output = run_output_dir(&self.batch_root, unit, &state.template_stem, run);
                if !artifacts::run_output_valid(&output, &self.aux.sim.metrics_leaf) {
                    return Err(Error::prerequisite(
                        stage,
                        format!("exp{} run {} has no valid output", unit, run),
                    ));
                }
            }
        }
        Ok(state)
    }
}

fn check_processed(batch_root: &Path, stage: Stage) -> Result<PipelineState> {
    let state = PipelineState::load_required(batch_root, stage)?;
    if !state.is_complete(Stage::Process) {
        return Err(Error::prerequisite(
            stage,
            format!(
                "stage 3 never completed for {}",
                batch_root.to_string_lossy()
            ),
        ));
    }
    for unit in 0..state.n_units {
        if !artifacts::unit_processed(batch_root, unit) {
            return Err(Error::prerequisite(
                stage,
                format!(
                    "exp{} of {} has no averaged output",
                    unit,
                    batch_root.to_string_lossy()
                ),
            ));
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_lists() {
        assert_eq!(
            Stage::parse_list("1,2 3").unwrap(),
            vec![Stage::Generate, Stage::Execute, Stage::Process]
        );
        assert_eq!(Stage::from_str("compare").unwrap(), Stage::Compare);
        assert!(Stage::parse_list("1,6").is_err());
        assert_eq!(Stage::Process.to_string(), "3 (process)");
    }
}
