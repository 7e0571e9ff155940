//! Stage 1: experiment generation.

use std::fs;
use std::path::Path;

use crate::config::AuxConfig;
use crate::criteria::CriteriaRegistry;
use crate::error::{Error, Result};
use crate::materialize::{unit_dir, ExperimentUnit, Materializer};
use crate::variables::GenContext;
use crate::{AVERAGED_DIR_NAME, OUTPUT_DIR_NAME};

use super::state::PipelineState;
use super::BatchSpec;

/// Generates and materializes the experiment matrix, returning the updated
/// pipeline state.
///
/// Regenerating a batch clears the records of every stage. Run output and
/// averages are removed as well unless the regenerated configurations are
/// identical to the ones on disk.
pub fn run(
    batch_root: &Path,
    batch: &BatchSpec,
    aux: &AuxConfig,
    registry: &CriteriaRegistry,
) -> Result<PipelineState> {
    batch.scenario.validate()?;
    let ctx = GenContext::new(aux, &batch.scenario);
    let sets = registry.generate(&batch.criteria, &ctx)?;
    let materializer = Materializer::new(&batch.template, batch_root, batch.settings.clone())?;
    let units = materializer.build(&batch.scenario, &sets)?;

    let criteria = batch.criteria.cli_arg();
    let scenario = batch.scenario.to_string();
    let existing = PipelineState::load(batch_root)?;
    let regenerating = existing.is_some();
    let mut state = match existing {
        Some(existing) => {
            if existing.criteria != criteria || existing.scenario != scenario {
                return Err(Error::Other(format!(
                    "batch root {} already holds `{}` on `{}`",
                    batch_root.to_string_lossy(),
                    existing.criteria,
                    existing.scenario
                )));
            }
            existing
        }
        None => PipelineState::new(criteria, &scenario, materializer.stem(), 0, 0),
    };

    if regenerating {
        let unchanged = state.n_units == units.len()
            && state.same_settings(
                materializer.stem(),
                &batch.settings,
                batch.scenario.n_engines,
            )
            && all_match_disk(&materializer, &units)?;
        if !unchanged {
            info!("batch settings changed, removing previous run output");
            remove_run_output(batch_root, state.n_units.max(units.len()))?;
        }
        state.stages.clear();
        // saved before any configuration is rewritten
        state.save(batch_root)?;
    }

    materializer.write_all(&units)?;
    let warnings = units.iter().map(|u| u.warnings.len()).sum::<usize>();
    if warnings > 0 {
        warn!(
            "{} mutation(s) had no target in the template and were skipped",
            warnings
        );
    }
    state.template_stem = materializer.stem().to_string();
    state.n_units = units.len();
    state.set_settings(&batch.settings, batch.scenario.n_engines);
    Ok(state)
}

fn all_match_disk(materializer: &Materializer, units: &[ExperimentUnit]) -> Result<bool> {
    for unit in units {
        if !materializer.matches_disk(unit)? {
            debug!("exp{} differs from its configuration on disk", unit.index);
            return Ok(false);
        }
    }
    Ok(true)
}

fn remove_run_output(batch_root: &Path, n_units: usize) -> Result<()> {
    for index in 0..n_units {
        let dir = unit_dir(batch_root, index);
        for name in &[OUTPUT_DIR_NAME, AVERAGED_DIR_NAME] {
            let path = dir.join(name);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            }
        }
    }
    Ok(())
}
