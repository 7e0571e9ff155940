//! Variable generators, one per criteria family.
//!
//! Every generator is a pure function of the descriptor and the generation
//! context. The returned sequence is ordered, the mutation set at index `i`
//! defines experiment `exp{i}`.

pub mod arena;

mod block_motion;
mod density;
mod oracle;
mod population_dynamics;
mod population_size;
mod saa_noise;
mod ta_policy_set;
mod temporal_variance;

pub use oracle::flags as oracle_flags;
pub use saa_noise::device_path as noise_device_path;
pub use ta_policy_set::POLICIES as TA_POLICIES;

use crate::config::AuxConfig;
use crate::criteria::{CriteriaDescriptor, Family};
use crate::error::{Error, Result};
use crate::mutation::MutationSet;
use crate::scenario::ScenarioSpec;

/// Element holding the number of robots in the swarm.
pub const POPULATION_PATH: &str = ".//arena/distribute/entity";
/// Element holding the number of blocks of each type.
pub const BLOCK_MANIFEST_PATH: &str = ".//arena_map/blocks/distribution/manifest";

/// Everything besides the descriptor a generator may depend on.
#[derive(Debug, Clone, Copy)]
pub struct GenContext<'a> {
    pub aux: &'a AuxConfig,
    pub scenario: &'a ScenarioSpec,
}

impl<'a> GenContext<'a> {
    pub fn new(aux: &'a AuxConfig, scenario: &'a ScenarioSpec) -> Self {
        GenContext { aux, scenario }
    }
}

/// Generates the ordered sequence of mutation sets for a builtin family.
///
/// When the descriptor carries a fixed population the population mutation is
/// prepended to every set.
pub fn generate(desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<MutationSet>> {
    let mut sets = match desc.family() {
        Family::PopulationSize => population_size::generate_population(desc)?,
        Family::BlockQuantity => population_size::generate_blocks(desc)?,
        Family::PopulationDynamics => population_dynamics::generate(desc)?,
        Family::PopulationDensity => density::generate(desc, ctx, density::Target::Population)?,
        Family::BlockDensity => density::generate(desc, ctx, density::Target::Blocks)?,
        Family::BlockMotionDynamics => block_motion::generate(desc)?,
        Family::TemporalVariance => temporal_variance::generate(desc, ctx)?,
        Family::Oracle => oracle::generate(desc)?,
        Family::TaPolicySet => ta_policy_set::generate(),
        Family::SaaNoise => saa_noise::generate(desc, ctx)?,
        Family::Custom(name) => {
            return Err(Error::grammar(
                desc.cli_arg(),
                name,
                "custom families are generated through a criteria registry",
            ))
        }
    };
    if let Some(population) = desc.population() {
        let fixed = population_mutations(population as u64);
        for set in sets.iter_mut() {
            set.prepend(&fixed);
        }
    }
    debug!(
        "generated {} experiment(s) for criteria `{}`",
        sets.len(),
        desc.cli_arg()
    );
    Ok(sets)
}

/// Number of experiments the descriptor defines.
pub fn cardinality(desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<usize> {
    Ok(generate(desc, ctx)?.len())
}

/// Mutation setting the swarm size.
pub fn population_mutations(population: u64) -> MutationSet {
    let mut set = MutationSet::new();
    set.push(POPULATION_PATH, "quantity", population);
    set
}

/// Mutations setting the total block count, split evenly between cube and
/// ramp blocks with the odd block going to cubes.
pub fn block_mutations(blocks: u64) -> MutationSet {
    let mut set = MutationSet::new();
    set.push(BLOCK_MANIFEST_PATH, "n_cube", (blocks + 1) / 2);
    set.push(BLOCK_MANIFEST_PATH, "n_ramp", blocks / 2);
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::parse;

    #[test]
    fn fixed_population_comes_first() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let sets = generate(&parse("ta_policy_set.All.Z16").unwrap(), &ctx).unwrap();
        for set in &sets {
            let first = set.iter().next().unwrap();
            assert_eq!(first.path, POPULATION_PATH);
            assert_eq!(first.value, "16");
        }
    }

    #[test]
    fn block_split() {
        let set = block_mutations(7);
        assert_eq!(set.effective(BLOCK_MANIFEST_PATH, "n_cube"), Some("4"));
        assert_eq!(set.effective(BLOCK_MANIFEST_PATH, "n_ramp"), Some("3"));
    }
}
