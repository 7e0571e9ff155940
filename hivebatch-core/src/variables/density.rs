//! Constant density families.
//!
//! The arena grows by a fixed increment every experiment while the number of
//! robots or blocks is scaled so the density stays the same.

use crate::criteria::CriteriaDescriptor;
use crate::error::{Error, Result};
use crate::mutation::MutationSet;

use super::{arena, block_mutations, population_mutations, GenContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Target {
    Population,
    Blocks,
}

/// Arena dimensions of every experiment.
///
/// X grows by the increment, Y by the increment divided by the topology
/// aspect ratio.
pub(super) fn dims(desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<(u32, u32)>> {
    let card = desc
        .cardinality_token()
        .ok_or_else(|| desc.missing("cardinality"))?;
    let inc = desc
        .arena_increment()
        .ok_or_else(|| desc.missing("arena increment"))?;
    let aspect = ctx.scenario.topology.aspect();
    if inc % aspect != 0 {
        return Err(Error::ShapeViolation(format!(
            "arena increment {} can't keep the {}:1 shape of {} arenas",
            inc, aspect, ctx.scenario.topology
        )));
    }
    (0..card)
        .map(|i| {
            let x = inc
                .checked_mul(i)
                .and_then(|d| ctx.scenario.arena_x.checked_add(d));
            let y = (inc / aspect)
                .checked_mul(i)
                .and_then(|d| ctx.scenario.arena_y.checked_add(d));
            match (x, y) {
                (Some(x), Some(y)) => Ok((x, y)),
                _ => Err(Error::ShapeViolation(format!(
                    "arena of exp{} grown by {} from {} doesn't fit in 32 bits",
                    i, inc, ctx.scenario
                ))),
            }
        })
        .collect()
}

pub(super) fn generate(
    desc: &CriteriaDescriptor,
    ctx: &GenContext,
    target: Target,
) -> Result<Vec<MutationSet>> {
    let density = desc.density().ok_or_else(|| desc.missing("density"))?;
    let mut sets = Vec::new();
    for (x, y) in dims(desc, ctx)? {
        ctx.scenario.with_dims(x, y).validate()?;
        let count = ((density * x as f64 * y as f64).round() as u64).max(1);
        let mut set = arena::shape_mutations(x, y);
        set.extend(match target {
            Target::Population => population_mutations(count),
            Target::Blocks => block_mutations(count),
        });
        sets.push(set);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuxConfig;
    use crate::criteria::parse;
    use crate::scenario::ScenarioSpec;
    use crate::variables::{BLOCK_MANIFEST_PATH, POPULATION_PATH};

    #[test]
    fn square_population_density() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("population_density.CD1p0.I16.C4").unwrap();
        let sets = generate(&desc, &ctx, Target::Population).unwrap();
        assert_eq!(sets.len(), 4);
        let expected = [(16, 256), (32, 1024), (48, 2304), (64, 4096)];
        for (set, (side, count)) in sets.iter().zip(expected.iter()) {
            assert_eq!(
                set.effective(".//arena", "size"),
                Some(format!("{}, {}, 2", side, side).as_str())
            );
            assert_eq!(
                set.effective(POPULATION_PATH, "quantity"),
                Some(count.to_string().as_str())
            );
        }
    }

    #[test]
    fn rectangular_blocks_keep_shape() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("SS.32x16", 2).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("block_density.CD0p01.I8.C3").unwrap();
        assert_eq!(
            dims(&desc, &ctx).unwrap(),
            vec![(32, 16), (40, 20), (48, 24)]
        );
        let sets = generate(&desc, &ctx, Target::Blocks).unwrap();
        // 0.01 * 32 * 16 = 5.12
        assert_eq!(sets[0].effective(BLOCK_MANIFEST_PATH, "n_cube"), Some("3"));
        assert_eq!(sets[0].effective(BLOCK_MANIFEST_PATH, "n_ramp"), Some("2"));
    }

    #[test]
    fn density_never_drops_below_one() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.4x4", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("population_density.CD0p0001.I4.C2").unwrap();
        let sets = generate(&desc, &ctx, Target::Population).unwrap();
        assert!(sets
            .iter()
            .all(|s| s.effective(POPULATION_PATH, "quantity") == Some("1")));
    }

    #[test]
    fn oversized_growth_is_rejected() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("population_density.CD1p0.I2000000000.C4").unwrap();
        assert!(matches!(
            dims(&desc, &ctx),
            Err(Error::ShapeViolation(_))
        ));
    }

    #[test]
    fn per_experiment_validation() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.8x8", 8).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("population_density.CD1p0.I4.C2").unwrap();
        assert!(matches!(
            generate(&desc, &ctx, Target::Population),
            Err(Error::DivisibilityViolation(_))
        ));
        let scenario = ScenarioSpec::parse("DS.32x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let desc = parse("population_density.CD1p0.I3.C2").unwrap();
        assert!(matches!(
            generate(&desc, &ctx, Target::Population),
            Err(Error::ShapeViolation(_))
        ));
    }
}
