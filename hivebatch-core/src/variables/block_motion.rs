use crate::criteria::CriteriaDescriptor;
use crate::error::Result;
use crate::mutation::MutationSet;
use crate::util::fmt_float;

pub const MOTION_PATH: &str = ".//env_dynamics/blocks/motion_dynamics";

pub(super) fn generate(desc: &CriteriaDescriptor) -> Result<Vec<MutationSet>> {
    let card = desc
        .cardinality_token()
        .ok_or_else(|| desc.missing("cardinality"))?;
    let factor = desc.factor().ok_or_else(|| desc.missing("factor"))?;
    let prob = desc
        .random_walk()
        .ok_or_else(|| desc.missing("random walk probability"))?;
    Ok((0..card)
        .map(|i| {
            let mut set = MutationSet::new();
            set.push(
                MOTION_PATH,
                "random_walk_prob",
                fmt_float(prob * factor * i as f64),
            );
            set
        })
        .collect())
}

#[test]
fn random_walk_ramp() {
    let desc = crate::criteria::parse("block_motion_dynamics.C3.F2p0.RW0p25.Z8").unwrap();
    let sets = generate(&desc).unwrap();
    let probs = sets
        .iter()
        .map(|s| s.effective(MOTION_PATH, "random_walk_prob").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(probs, vec!["0", "0.5", "1"]);
}
