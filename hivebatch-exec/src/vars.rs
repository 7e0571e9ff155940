//! Snapshot of the process environment.
//!
//! Backends read scheduler variables from a snapshot taken when they are
//! created, never from the live environment.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Vars {
    inner: HashMap<String, String>,
}

impl Vars {
    pub fn from_env() -> Self {
        Vars {
            inner: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Vars {
            inner: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(|v| v.as_str())
    }

    /// Gets a variable that has to be set and non-empty.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim()),
            _ => Err(Error::CoreError(
                hivebatch_core::Error::EnvironmentVariableMissing(name.to_string()),
            )),
        }
    }

    /// Gets a required variable holding a positive integer.
    pub fn require_count(&self, name: &str) -> Result<usize> {
        parse_count(name, self.require(name)?)
    }

    /// Name and value pairs for the given variable names, skipping the ones
    /// that aren't set.
    pub fn select(&self, names: &[String]) -> Vec<(String, String)> {
        names
            .iter()
            .filter_map(|n| match self.get(n) {
                Some(v) => Some((n.clone(), v.to_string())),
                None => {
                    debug!("not propagating unset variable {}", n);
                    None
                }
            })
            .collect()
    }
}

pub(crate) fn parse_count(what: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidCount(what.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_vars() {
        let vars = Vars::from_pairs(vec![("PBS_NUM_PPN", "16"), ("EMPTY", " ")]);
        assert_eq!(vars.require_count("PBS_NUM_PPN").unwrap(), 16);
        match vars.require("EMPTY") {
            Err(Error::CoreError(hivebatch_core::Error::EnvironmentVariableMissing(name))) => {
                assert_eq!(name, "EMPTY")
            }
            other => panic!("expected missing variable, got {:?}", other),
        }
        assert!(vars.require("PBS_JOBID").is_err());
        assert!(parse_count("x", "0").is_err());
    }

    #[test]
    fn select_skips_unset() {
        let vars = Vars::from_pairs(vec![("LD_LIBRARY_PATH", "/opt/lib")]);
        let selected = vars.select(&["LD_LIBRARY_PATH".to_string(), "ARGOS_PLUGIN_PATH".to_string()]);
        assert_eq!(
            selected,
            vec![("LD_LIBRARY_PATH".to_string(), "/opt/lib".to_string())]
        );
    }
}
