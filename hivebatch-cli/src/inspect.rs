//! Read-only views of batches and criteria.

use std::path::Path;

use anyhow::{Error, Result};
use colored::*;
use hivebatch::criteria::CriteriaRegistry;
use hivebatch::materialize::run_output_dir;
use hivebatch::pipeline::{artifacts, PipelineState};
use hivebatch::variables::GenContext;
use hivebatch::{AuxConfig, ScenarioSpec, Stage};

#[derive(Debug, Serialize)]
struct BatchReport {
    batch_root: String,
    state: PipelineState,
    progress: Vec<UnitProgress>,
}

#[derive(Debug, Serialize)]
struct UnitProgress {
    unit: usize,
    generated: bool,
    complete_runs: u32,
    processed: bool,
}

fn unit_progress(batch_root: &Path, state: &PipelineState, metrics_leaf: &str) -> Vec<UnitProgress> {
    (0..state.n_units)
        .map(|unit| UnitProgress {
            unit,
            generated: artifacts::unit_generated(batch_root, unit, &state.template_stem),
            complete_runs: (0..state.n_runs)
                .filter(|run| {
                    let output = run_output_dir(batch_root, unit, &state.template_stem, *run);
                    artifacts::run_output_valid(&output, metrics_leaf)
                })
                .count() as u32,
            processed: artifacts::unit_processed(batch_root, unit),
        })
        .collect()
}

/// Prints the persisted state of a batch along with what's on disk.
pub fn batch(batch_root: &Path, aux: &AuxConfig, as_toml: bool) -> Result<()> {
    let state = PipelineState::load(batch_root)?.ok_or_else(|| {
        Error::msg(format!(
            "no batch found at {}",
            batch_root.to_string_lossy()
        ))
    })?;
    let progress = unit_progress(batch_root, &state, &aux.sim.metrics_leaf);

    if as_toml {
        let report = BatchReport {
            batch_root: batch_root.to_string_lossy().to_string(),
            state,
            progress,
        };
        print!("{}", toml::to_string(&report)?);
        return Ok(());
    }

    println!("{}", batch_root.to_string_lossy().bold());
    println!("criteria:    {}", state.criteria);
    println!("scenario:    {}", state.scenario);
    println!("template:    {}", state.template_stem);
    println!(
        "experiments: {} with {} run(s) each",
        state.n_units, state.n_runs
    );
    println!("seed:        {}", state.seed);
    println!("engines:     {}", state.n_engines);
    if let Some(time_setup) = &state.time_setup {
        println!("time setup:  {}", time_setup);
    }
    println!("stages:");
    for stage in &[
        Stage::Generate,
        Stage::Execute,
        Stage::Process,
        Stage::Visualize,
        Stage::Compare,
    ] {
        match state.last_completed(*stage) {
            Some(record) => println!(
                "  {:<14} {} (run {})",
                stage.to_string(),
                record.completed_at.format("%Y-%m-%d %H:%M:%S"),
                record.run_id
            ),
            None => println!("  {:<14} {}", stage.to_string(), "not completed".dimmed()),
        }
    }

    let total = state.n_units as u32 * state.n_runs;
    let complete = progress.iter().map(|p| p.complete_runs).sum::<u32>();
    println!("runs with complete output: {}/{}", complete, total);
    for p in progress.iter().filter(|p| p.complete_runs < state.n_runs) {
        println!(
            "  exp{}: {}/{}{}",
            p.unit,
            p.complete_runs,
            state.n_runs,
            if p.generated { "" } else { " (not generated)" }
        );
    }
    Ok(())
}

/// Prints the experiments the criteria would generate for the scenario,
/// without writing anything.
pub fn preview(criteria: &str, scenario: &ScenarioSpec, aux: &AuxConfig) -> Result<()> {
    let registry = CriteriaRegistry::default();
    let desc = registry.parse(criteria)?;
    scenario.validate()?;
    let sets = registry.generate(&desc, &GenContext::new(aux, scenario))?;
    println!(
        "{} on {}: {} experiment(s)",
        desc.cli_arg().bold(),
        scenario,
        sets.len()
    );
    for (i, set) in sets.iter().enumerate() {
        println!("exp{}", i);
        for mutation in set {
            println!("  {}", mutation);
        }
    }
    Ok(())
}
