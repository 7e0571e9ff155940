use crate::mutation::MutationSet;

pub const POLICIES: [&str; 5] = [
    "random",
    "stoch_nbhd1",
    "strict_greedy",
    "epsilon_greedy",
    "UCB1",
];

pub(super) fn generate() -> Vec<MutationSet> {
    POLICIES
        .iter()
        .map(|policy| {
            let mut set = MutationSet::new();
            set.push(".//task_alloc", "policy", policy);
            set
        })
        .collect()
}

#[test]
fn one_experiment_per_policy() {
    let sets = generate();
    assert_eq!(sets.len(), 5);
    assert_eq!(sets[4].effective(".//task_alloc", "policy"), Some("UCB1"));
}
