use std::f64::consts::PI;

use crate::criteria::{CriteriaDescriptor, PenaltyCategory, Waveform};
use crate::error::{Error, Result};
use crate::mutation::MutationSet;
use crate::util::fmt_float;
use crate::Float;

use super::GenContext;

/// Parent element of the waveform applied for each penalty category.
pub fn parent_path(category: PenaltyCategory) -> &'static str {
    match category {
        PenaltyCategory::BlockCarry => ".//env_dynamics/blocks/carry_throttle",
        PenaltyCategory::BlockManipulation => ".//env_dynamics/blocks/manipulation_penalty",
    }
}

/// Concrete waveform written into a single experiment.
#[derive(Debug, Clone, PartialEq)]
struct WaveformParams {
    kind: &'static str,
    frequency: Float,
    amplitude: Float,
    offset: Float,
    phase: Float,
}

impl WaveformParams {
    fn mutations(&self, parent: &str) -> MutationSet {
        let path = format!("{}/waveform", parent);
        let mut set = MutationSet::new();
        set.push(&path, "type", self.kind);
        set.push(&path, "frequency", fmt_float(self.frequency));
        set.push(&path, "amplitude", fmt_float(self.amplitude));
        set.push(&path, "offset", fmt_float(self.offset));
        set.push(&path, "phase", fmt_float(self.phase));
        set
    }
}

/// Builds the waveform list. The first entry is always a constant penalty
/// giving the ideal conditions to compare against.
fn waveforms(waveform: Waveform, hz: &[Float], amps: &[Float]) -> Vec<WaveformParams> {
    let mut out = vec![WaveformParams {
        kind: "Constant",
        frequency: hz[0],
        amplitude: amps[0],
        offset: 0.0,
        phase: 0.0,
    }];
    match waveform {
        Waveform::Sine | Waveform::Square | Waveform::Sawtooth => {
            let kind = match waveform {
                Waveform::Sine => "Sine",
                Waveform::Square => "Square",
                _ => "Sawtooth",
            };
            for h in &hz[1..] {
                for amp in &amps[1..] {
                    out.push(WaveformParams {
                        kind,
                        frequency: 1.0 / h,
                        amplitude: *amp,
                        offset: *amp,
                        phase: 0.0,
                    });
                }
            }
        }
        Waveform::StepUp(t) | Waveform::StepDown(t) => {
            let up = matches!(waveform, Waveform::StepUp(_));
            for amp in &amps[1..] {
                out.push(WaveformParams {
                    kind: "Square",
                    frequency: 1.0 / (2.0 * t as Float),
                    amplitude: *amp,
                    offset: if up { *amp } else { 0.0 },
                    phase: if up { PI } else { 0.0 },
                });
            }
        }
    }
    out
}

pub(super) fn generate(desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<MutationSet>> {
    let (category, waveform) = desc.variance().ok_or_else(|| desc.missing("variance"))?;
    let config = ctx.aux.temporal_variance()?;
    let amps = match category {
        PenaltyCategory::BlockCarry => &config.bc_amp,
        PenaltyCategory::BlockManipulation => &config.bm_amp,
    };
    if config.hz.is_empty() {
        return Err(Error::AuxConfigMissing("temporal_variance.hz".to_string()));
    }
    if amps.is_empty() {
        return Err(Error::AuxConfigMissing(format!(
            "temporal_variance.{}_amp",
            category.tag()
        )));
    }
    // the first entry is the constant baseline, every other one is a period
    if let Some(h) = config.hz[1..].iter().find(|h| !h.is_finite() || **h <= 0.0) {
        return Err(Error::InvalidAuxConfig(format!(
            "temporal_variance.hz entry {} is not a positive period",
            fmt_float(*h)
        )));
    }
    let parent = parent_path(category);
    Ok(waveforms(waveform, &config.hz, amps)
        .iter()
        .map(|w| w.mutations(parent))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuxConfig, TemporalVarianceConfig};
    use crate::criteria::parse;
    use crate::scenario::ScenarioSpec;

    fn aux() -> AuxConfig {
        AuxConfig {
            temporal_variance: Some(TemporalVarianceConfig {
                hz: vec![0.0, 100.0, 200.0],
                bc_amp: vec![0.1, 0.4, 0.8],
                bm_amp: vec![0.1, 0.2],
            }),
            ..AuxConfig::default()
        }
    }

    #[test]
    fn periodic_sweeps_product() {
        let aux = aux();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let sets = generate(&parse("temporal_variance.BCSine").unwrap(), &ctx).unwrap();
        // constant baseline + 2 hz * 2 amplitudes
        assert_eq!(sets.len(), 5);
        let path = ".//env_dynamics/blocks/carry_throttle/waveform";
        assert_eq!(sets[0].effective(path, "type"), Some("Constant"));
        assert_eq!(sets[0].effective(path, "amplitude"), Some("0.1"));
        assert_eq!(sets[1].effective(path, "type"), Some("Sine"));
        assert_eq!(sets[1].effective(path, "frequency"), Some("0.01"));
        assert_eq!(sets[1].effective(path, "offset"), Some("0.4"));
        assert_eq!(sets[4].effective(path, "frequency"), Some("0.005"));
        assert_eq!(sets[4].effective(path, "amplitude"), Some("0.8"));
    }

    #[test]
    fn step_waveforms() {
        let aux = aux();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        let path = ".//env_dynamics/blocks/manipulation_penalty/waveform";

        let up = generate(&parse("temporal_variance.BMStepU1000").unwrap(), &ctx).unwrap();
        assert_eq!(up.len(), 2);
        assert_eq!(up[1].effective(path, "type"), Some("Square"));
        assert_eq!(up[1].effective(path, "frequency"), Some("0.0005"));
        assert_eq!(up[1].effective(path, "offset"), Some("0.2"));
        assert_eq!(up[1].effective(path, "phase"), Some(fmt_float(PI).as_str()));

        let down = generate(&parse("temporal_variance.BMStepD1000").unwrap(), &ctx).unwrap();
        assert_eq!(down[1].effective(path, "offset"), Some("0"));
        assert_eq!(down[1].effective(path, "phase"), Some("0"));
    }

    #[test]
    fn zero_periods_are_rejected() {
        let mut aux = aux();
        if let Some(tv) = aux.temporal_variance.as_mut() {
            tv.hz = vec![0.0, 100.0, 0.0];
        }
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        assert!(matches!(
            generate(&parse("temporal_variance.BCSquare").unwrap(), &ctx),
            Err(Error::InvalidAuxConfig(_))
        ));
    }

    #[test]
    fn missing_config_section() {
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let ctx = GenContext::new(&aux, &scenario);
        assert!(matches!(
            generate(&parse("temporal_variance.BCSine").unwrap(), &ctx),
            Err(Error::AuxConfigMissing(_))
        ));
    }
}
