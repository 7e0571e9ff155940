use crate::criteria::{CriteriaDescriptor, Increment};
use crate::error::Result;
use crate::mutation::MutationSet;

use super::{block_mutations, population_mutations};

/// Number of sizes a linear increment produces.
const LINEAR_STEPS: u64 = 10;

/// Sizes for the given increment kind, up to and including `bound`.
pub(super) fn sizes(kind: Increment, bound: u32) -> Vec<u64> {
    let bound = bound as u64;
    match kind {
        Increment::Log => {
            let mut sizes = Vec::new();
            let mut n = 1u64;
            while n <= bound {
                sizes.push(n);
                n *= 2;
            }
            sizes
        }
        Increment::Linear => (0..LINEAR_STEPS)
            .map(|i| 1 + i * (bound - 1) / (LINEAR_STEPS - 1))
            .collect(),
    }
}

pub(super) fn generate_population(desc: &CriteriaDescriptor) -> Result<Vec<MutationSet>> {
    let (kind, bound) = desc.increment().ok_or_else(|| desc.missing("increment"))?;
    Ok(sizes(kind, bound)
        .into_iter()
        .map(population_mutations)
        .collect())
}

pub(super) fn generate_blocks(desc: &CriteriaDescriptor) -> Result<Vec<MutationSet>> {
    let (kind, bound) = desc.increment().ok_or_else(|| desc.missing("increment"))?;
    Ok(sizes(kind, bound).into_iter().map(block_mutations).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::parse;
    use crate::variables::{BLOCK_MANIFEST_PATH, POPULATION_PATH};

    #[test]
    fn log_sizes() {
        let sizes = sizes(Increment::Log, 1024);
        assert_eq!(sizes.len(), 11);
        assert_eq!(sizes.first(), Some(&1));
        assert_eq!(sizes.last(), Some(&1024));
        assert!(sizes.windows(2).all(|w| w[1] == 2 * w[0]));

        // bound that isn't a power of two stops at the largest one below it
        assert_eq!(super::sizes(Increment::Log, 100).last(), Some(&64));
    }

    #[test]
    fn linear_sizes() {
        let sizes = sizes(Increment::Linear, 64);
        assert_eq!(sizes.len(), 10);
        assert_eq!(sizes[0], 1);
        assert_eq!(sizes[9], 64);
        assert!(sizes.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(super::sizes(Increment::Linear, 10), (1..=10).collect::<Vec<u64>>());
    }

    #[test]
    fn population_targets_entity_quantity() {
        let sets = generate_population(&parse("population_size.Log8").unwrap()).unwrap();
        let values = sets
            .iter()
            .map(|s| s.effective(POPULATION_PATH, "quantity").unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["1", "2", "4", "8"]);
    }

    #[test]
    fn blocks_target_manifest() {
        let sets = generate_blocks(&parse("block_quantity.Log4").unwrap()).unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].effective(BLOCK_MANIFEST_PATH, "n_cube"), Some("1"));
        assert_eq!(sets[0].effective(BLOCK_MANIFEST_PATH, "n_ramp"), Some("0"));
        assert_eq!(sets[2].effective(BLOCK_MANIFEST_PATH, "n_ramp"), Some("2"));
    }
}
