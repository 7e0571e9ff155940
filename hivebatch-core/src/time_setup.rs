//! Simulation duration and metrics collection interval.
//!
//! Time setups are written as `T{duration}[N{datapoints}]`, optionally
//! prefixed with `time_setup.`:
//!
//! - `T1000` runs for 1000 seconds and collects 50 datapoints
//! - `T2000N100` runs for 2000 seconds and collects 100 datapoints, one
//!   every 20 seconds

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::mutation::MutationSet;

/// Controller ticks per simulated second.
pub const TICKS_PER_SECOND: u32 = 5;
/// Rows in each metrics file when the datapoint count isn't given.
pub const DEFAULT_DATAPOINTS: u32 = 50;

const PREFIX: &str = "time_setup.";
const EXPERIMENT_PATH: &str = ".//experiment";
const METRICS_PATH: &str = ".//output/metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSetup {
    /// Simulated seconds
    pub duration: u32,
    pub datapoints: u32,
}

impl TimeSetup {
    pub fn new(duration: u32, datapoints: u32) -> Self {
        TimeSetup {
            duration,
            datapoints,
        }
    }

    /// Ticks between two collected metrics rows, at least one.
    pub fn output_interval(&self) -> u64 {
        let ticks = self.duration as u64 * TICKS_PER_SECOND as u64;
        (ticks / self.datapoints.max(1) as u64).max(1)
    }

    pub fn mutations(&self) -> MutationSet {
        let mut set = MutationSet::new();
        set.push(EXPERIMENT_PATH, "length", self.duration);
        set.push(EXPERIMENT_PATH, "ticks_per_second", TICKS_PER_SECOND);
        set.push(METRICS_PATH, "output_interval", self.output_interval());
        set
    }
}

impl FromStr for TimeSetup {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let token = s.strip_prefix(PREFIX).unwrap_or(s);
        let bad = |reason: &str| Error::grammar(s, token, reason);
        let rest = token
            .strip_prefix('T')
            .ok_or_else(|| bad("expected `T{duration}` or `T{duration}N{datapoints}`"))?;
        let (duration, datapoints) = match rest.find('N') {
            Some(i) => (&rest[..i], Some(&rest[i + 1..])),
            None => (rest, None),
        };
        let positive = |input: &str, what: &str| -> Result<u32> {
            match input.parse::<u32>() {
                Ok(0) => Err(bad(&format!("{} must be at least 1", what))),
                Ok(n) => Ok(n),
                Err(e) => Err(bad(&format!("failed parsing {}: {}", what, e))),
            }
        };
        let duration = positive(duration, "duration")?;
        let datapoints = match datapoints {
            Some(n) => positive(n, "datapoint count")?,
            None => DEFAULT_DATAPOINTS,
        };
        Ok(TimeSetup::new(duration, datapoints))
    }
}

impl fmt::Display for TimeSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}N{}", self.duration, self.datapoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_setup() {
        assert_eq!(TimeSetup::from_str("T1000").unwrap(), TimeSetup::new(1000, 50));
        assert_eq!(
            TimeSetup::from_str("time_setup.T2000N100").unwrap(),
            TimeSetup::new(2000, 100)
        );
        assert_eq!(TimeSetup::new(2000, 100).to_string(), "T2000N100");

        for bad in &["1000", "T", "T0", "T100N0", "T100N", "Tx", "T100Nx"] {
            assert!(
                matches!(TimeSetup::from_str(bad), Err(Error::GrammarError { .. })),
                "accepted `{}`",
                bad
            );
        }
    }

    #[test]
    fn metrics_interval() {
        // 2000 s at 5 ticks per second, 100 rows
        let setup = TimeSetup::new(2000, 100);
        assert_eq!(setup.output_interval(), 100);
        let set = setup.mutations();
        assert_eq!(set.effective(EXPERIMENT_PATH, "length"), Some("2000"));
        assert_eq!(set.effective(EXPERIMENT_PATH, "ticks_per_second"), Some("5"));
        assert_eq!(set.effective(METRICS_PATH, "output_interval"), Some("100"));

        // more rows than ticks still collects once per tick
        assert_eq!(TimeSetup::new(1, 50).output_interval(), 1);
    }
}
