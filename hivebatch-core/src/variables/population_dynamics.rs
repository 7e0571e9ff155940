use crate::criteria::CriteriaDescriptor;
use crate::error::Result;
use crate::mutation::MutationSet;
use crate::util::fmt_float;

pub const DYNAMICS_PATH: &str = ".//env_dynamics/population_dynamics";

/// Linear ramp of every named rate. Experiment `i` uses `start * factor * i`,
/// so exp0 has all rates at zero.
pub(super) fn generate(desc: &CriteriaDescriptor) -> Result<Vec<MutationSet>> {
    let card = desc
        .cardinality_token()
        .ok_or_else(|| desc.missing("cardinality"))?;
    let factor = desc.factor().ok_or_else(|| desc.missing("factor"))?;
    let rates = desc.rates();
    Ok((0..card)
        .map(|i| {
            let mut set = MutationSet::new();
            for (kind, start) in &rates {
                set.push(DYNAMICS_PATH, kind.attr(), fmt_float(start * factor * i as f64));
            }
            set
        })
        .collect())
}

#[test]
fn ramps_named_rates_only() {
    let desc = crate::criteria::parse("population_dynamics.C4.F2p0.B0p5.M0p25.R1p0").unwrap();
    let sets = generate(&desc).unwrap();
    assert_eq!(sets.len(), 4);
    assert_eq!(sets[0].effective(DYNAMICS_PATH, "birth_mu"), Some("0"));
    assert_eq!(sets[3].effective(DYNAMICS_PATH, "birth_mu"), Some("3"));
    assert_eq!(sets[3].effective(DYNAMICS_PATH, "malfunction_lambda"), Some("1.5"));
    assert_eq!(sets[3].effective(DYNAMICS_PATH, "repair_mu"), Some("6"));
    assert_eq!(sets[3].effective(DYNAMICS_PATH, "death_lambda"), None);
    assert!(sets.iter().all(|s| s.len() == 3));
}
