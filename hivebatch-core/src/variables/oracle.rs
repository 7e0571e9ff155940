use crate::criteria::{CriteriaDescriptor, OracleKind};
use crate::error::Result;
use crate::mutation::MutationSet;

/// Information flags an oracle of the given kind can toggle.
pub fn flags(kind: OracleKind) -> &'static [&'static str] {
    match kind {
        OracleKind::Entities => &["caches", "blocks"],
        OracleKind::Tasking => &["exec_est", "interface_est"],
    }
}

/// One experiment per non-empty subset of the oracle flags, in binary
/// counting order with the first flag as the most significant bit.
pub(super) fn generate(desc: &CriteriaDescriptor) -> Result<Vec<MutationSet>> {
    let kind = desc.oracle().ok_or_else(|| desc.missing("oracle type"))?;
    let flags = flags(kind);
    let path = format!(".//oracle_manager/{}_oracle", kind.name());
    let n = flags.len();
    Ok((1..(1u32 << n))
        .map(|mask| {
            let mut set = MutationSet::new();
            for (i, flag) in flags.iter().enumerate() {
                let enabled = mask & (1 << (n - 1 - i)) != 0;
                set.push(&path, flag, enabled);
            }
            set
        })
        .collect())
}

#[test]
fn entity_subsets() {
    let desc = crate::criteria::parse("oracle.entities").unwrap();
    let sets = generate(&desc).unwrap();
    let path = ".//oracle_manager/entities_oracle";
    let pairs = sets
        .iter()
        .map(|s| {
            (
                s.effective(path, "caches").unwrap(),
                s.effective(path, "blocks").unwrap(),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        pairs,
        vec![("false", "true"), ("true", "false"), ("true", "true")]
    );
}
