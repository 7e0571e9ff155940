//! Configuration document mutations.

use std::fmt;

/// Single attribute overwrite within a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Element path, see [`xml::Path`](../xml/struct.Path.html) for syntax
    pub path: String,
    pub attr: String,
    pub value: String,
}

impl Mutation {
    pub fn new(path: &str, attr: &str, value: impl ToString) -> Self {
        Mutation {
            path: path.to_string(),
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}={}", self.path, self.attr, self.value)
    }
}

/// Ordered list of mutations making up a single experiment.
///
/// Mutations are applied in declaration order, so when two mutations target
/// the same attribute the later one wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationSet {
    mutations: Vec<Mutation>,
}

impl MutationSet {
    pub fn new() -> Self {
        MutationSet::default()
    }

    pub fn push(&mut self, path: &str, attr: &str, value: impl ToString) {
        self.mutations.push(Mutation::new(path, attr, value));
    }

    /// Appends all mutations from `other` after the existing ones.
    pub fn extend(&mut self, other: MutationSet) {
        self.mutations.extend(other.mutations);
    }

    /// Inserts all mutations from `other` before the existing ones.
    pub fn prepend(&mut self, other: &MutationSet) {
        let mut mutations = other.mutations.clone();
        mutations.append(&mut self.mutations);
        self.mutations = mutations;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Returns the value that applying this set would leave on the given
    /// target, taking declaration order into account.
    pub fn effective(&self, path: &str, attr: &str) -> Option<&str> {
        self.mutations
            .iter()
            .rev()
            .find(|m| m.path == path && m.attr == attr)
            .map(|m| m.value.as_str())
    }
}

impl From<Vec<Mutation>> for MutationSet {
    fn from(mutations: Vec<Mutation>) -> Self {
        MutationSet { mutations }
    }
}

impl<'a> IntoIterator for &'a MutationSet {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.iter()
    }
}

#[test]
fn later_mutation_wins() {
    let mut set = MutationSet::new();
    set.push(".//arena", "size", "10, 10, 2");
    set.push(".//arena", "size", "20, 20, 2");
    assert_eq!(set.effective(".//arena", "size"), Some("20, 20, 2"));
    assert_eq!(set.effective(".//arena", "center"), None);
}

#[test]
fn prepend_keeps_order() {
    let mut set = MutationSet::from(vec![Mutation::new(".//a", "x", 1)]);
    let mut pop = MutationSet::new();
    pop.push(".//b", "y", 2);
    set.prepend(&pop);
    let attrs = set.iter().map(|m| m.attr.as_str()).collect::<Vec<_>>();
    assert_eq!(attrs, vec!["y", "x"]);
}
