//! Token level parsing of builtin criteria families.

use crate::error::{Error, Result};
use crate::Float;

use super::{
    Family, Increment, NoiseCategory, OracleKind, Param, PenaltyCategory, RateKind, Waveform,
};

/// Parses the tokens following the family name.
pub(super) fn parse_builtin(criteria: &str, family: &Family, tokens: &[&str]) -> Result<Vec<Param>> {
    let mut params: Vec<Param> = Vec::new();
    for (n, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(Error::grammar(criteria, token, "empty token"));
        }
        let param = if let Some(pop) = token.strip_prefix('Z') {
            if !family.accepts_population_override() {
                return Err(Error::grammar(
                    criteria,
                    token,
                    format!("{} doesn't accept a fixed population", family),
                ));
            }
            Param::Population(positive_int(criteria, token, pop)?)
        } else {
            parse_family_token(criteria, family, n, token)?
        };
        if params.iter().any(|p| p.slot() == param.slot()) {
            return Err(Error::grammar(criteria, token, "duplicate token"));
        }
        params.push(param);
    }
    check_required(criteria, family, &params)?;
    if let Family::BlockMotionDynamics = family {
        check_probability_ramp(criteria, tokens, &params)?;
    }
    Ok(params)
}

/// The last experiment's random walk probability has to stay within
/// `[0, 1]`.
fn check_probability_ramp(criteria: &str, tokens: &[&str], params: &[Param]) -> Result<()> {
    let mut card = 0;
    let mut factor = 0.0;
    let mut prob = 0.0;
    for param in params {
        match param {
            Param::Cardinality(n) => card = *n,
            Param::Factor(f) => factor = *f,
            Param::RandomWalk(p) => prob = *p,
            _ => (),
        }
    }
    let last = prob * factor * card.saturating_sub(1) as Float;
    if last > 1.0 {
        let token = tokens
            .iter()
            .find(|t| t.starts_with("RW"))
            .copied()
            .unwrap_or("RW");
        return Err(Error::grammar(
            criteria,
            token,
            format!(
                "random walk probability ramps up to {}, past 1",
                crate::util::fmt_float(last)
            ),
        ));
    }
    Ok(())
}

fn parse_family_token(criteria: &str, family: &Family, n: usize, token: &str) -> Result<Param> {
    let unexpected = || {
        Error::grammar(
            criteria,
            token,
            format!("token doesn't belong to {}", family),
        )
    };
    match family {
        Family::PopulationSize | Family::BlockQuantity => {
            if n != 0 {
                return Err(unexpected());
            }
            if let Some(rest) = token.strip_prefix("Log") {
                Ok(Param::Increment {
                    kind: Increment::Log,
                    bound: positive_int(criteria, token, rest)?,
                })
            } else if let Some(rest) = token.strip_prefix("Linear") {
                let bound = positive_int(criteria, token, rest)?;
                if bound < 10 {
                    return Err(Error::grammar(
                        criteria,
                        token,
                        "linear increment requires a bound of at least 10",
                    ));
                }
                Ok(Param::Increment {
                    kind: Increment::Linear,
                    bound,
                })
            } else {
                Err(Error::grammar(
                    criteria,
                    token,
                    "expected `Log{N}` or `Linear{N}`",
                ))
            }
        }
        Family::PopulationDynamics => {
            if let Some(rest) = token.strip_prefix('C') {
                Ok(Param::Cardinality(positive_int(criteria, token, rest)?))
            } else if let Some(rest) = token.strip_prefix('F') {
                Ok(Param::Factor(decimal(criteria, token, rest)?))
            } else {
                let kind = match token.chars().next() {
                    Some('B') => RateKind::Birth,
                    Some('D') => RateKind::Death,
                    Some('M') => RateKind::Malfunction,
                    Some('R') => RateKind::Repair,
                    _ => return Err(unexpected()),
                };
                Ok(Param::Rate {
                    kind,
                    value: decimal(criteria, token, &token[1..])?,
                })
            }
        }
        Family::PopulationDensity | Family::BlockDensity => {
            if let Some(rest) = token.strip_prefix("CD") {
                Ok(Param::Density(decimal(criteria, token, rest)?))
            } else if let Some(rest) = token.strip_prefix('C') {
                Ok(Param::Cardinality(positive_int(criteria, token, rest)?))
            } else if let Some(rest) = token.strip_prefix('I') {
                Ok(Param::ArenaIncrement(positive_int(criteria, token, rest)?))
            } else {
                Err(unexpected())
            }
        }
        Family::BlockMotionDynamics => {
            if let Some(rest) = token.strip_prefix("RW") {
                Ok(Param::RandomWalk(decimal(criteria, token, rest)?))
            } else if let Some(rest) = token.strip_prefix('C') {
                Ok(Param::Cardinality(positive_int(criteria, token, rest)?))
            } else if let Some(rest) = token.strip_prefix('F') {
                Ok(Param::Factor(decimal(criteria, token, rest)?))
            } else {
                Err(unexpected())
            }
        }
        Family::TemporalVariance => {
            if n != 0 {
                return Err(unexpected());
            }
            let (category, rest) = if let Some(rest) = token.strip_prefix("BC") {
                (PenaltyCategory::BlockCarry, rest)
            } else if let Some(rest) = token.strip_prefix("BM") {
                (PenaltyCategory::BlockManipulation, rest)
            } else {
                return Err(Error::grammar(
                    criteria,
                    token,
                    "expected penalty category `BC` or `BM`",
                ));
            };
            let waveform = match rest {
                "Sine" => Waveform::Sine,
                "Square" => Waveform::Square,
                "Sawtooth" => Waveform::Sawtooth,
                _ => {
                    if let Some(t) = rest.strip_prefix("StepU") {
                        Waveform::StepUp(positive_int(criteria, token, t)?)
                    } else if let Some(t) = rest.strip_prefix("StepD") {
                        Waveform::StepDown(positive_int(criteria, token, t)?)
                    } else {
                        return Err(Error::grammar(
                            criteria,
                            token,
                            "expected waveform `Sine`, `Square`, `Sawtooth`, `StepU{t}` or `StepD{t}`",
                        ));
                    }
                }
            };
            Ok(Param::Variance { category, waveform })
        }
        Family::Oracle => match token {
            "entities" if n == 0 => Ok(Param::Oracle(OracleKind::Entities)),
            "tasking" if n == 0 => Ok(Param::Oracle(OracleKind::Tasking)),
            _ => Err(Error::grammar(
                criteria,
                token,
                "expected oracle type `entities` or `tasking`",
            )),
        },
        Family::TaPolicySet => match token {
            "All" if n == 0 => Ok(Param::PolicySetAll),
            _ => Err(Error::grammar(criteria, token, "expected `All`")),
        },
        Family::SaaNoise => {
            if n == 0 {
                let category = match token {
                    "sensors" => NoiseCategory::Sensors,
                    "actuators" => NoiseCategory::Actuators,
                    "all" => NoiseCategory::All,
                    _ => {
                        return Err(Error::grammar(
                            criteria,
                            token,
                            "expected noise category `sensors`, `actuators` or `all`",
                        ))
                    }
                };
                Ok(Param::Noise(category))
            } else if let Some(rest) = token.strip_prefix('C') {
                Ok(Param::Cardinality(positive_int(criteria, token, rest)?))
            } else {
                Err(unexpected())
            }
        }
        Family::Custom(_) => Ok(Param::Token(token.to_string())),
    }
}

/// Checks that every required parameter is present and combination rules
/// hold.
fn check_required(criteria: &str, family: &Family, params: &[Param]) -> Result<()> {
    let has = |slot: &str| params.iter().any(|p| p.slot() == slot);
    let required: &[(&str, &str)] = match family {
        Family::PopulationSize | Family::BlockQuantity => &[("increment", "`Log{N}` or `Linear{N}`")],
        Family::PopulationDynamics => &[("cardinality", "`C{card}`"), ("factor", "`F{factor}`")],
        Family::PopulationDensity | Family::BlockDensity => &[
            ("density", "`CD{density}`"),
            ("arena_increment", "`I{inc}`"),
            ("cardinality", "`C{card}`"),
        ],
        Family::BlockMotionDynamics => &[
            ("cardinality", "`C{card}`"),
            ("factor", "`F{factor}`"),
            ("random_walk", "`RW{prob}`"),
        ],
        Family::TemporalVariance => &[("variance", "`{BC|BM}{waveform}`")],
        Family::Oracle => &[("oracle", "oracle type")],
        Family::TaPolicySet => &[("policy_set", "`All`")],
        Family::SaaNoise => &[("noise", "noise category"), ("cardinality", "`C{card}`")],
        Family::Custom(_) => &[],
    };
    for (slot, what) in required {
        if !has(slot) {
            return Err(Error::grammar(
                criteria,
                family.name(),
                format!("missing required token {}", what),
            ));
        }
    }

    if let Family::PopulationDynamics = family {
        let rates = params
            .iter()
            .filter(|p| matches!(p, Param::Rate { .. }))
            .count();
        if rates == 0 {
            return Err(Error::grammar(
                criteria,
                family.name(),
                "at least one of `B`, `D` or `M`+`R` rates is required",
            ));
        }
        let malfunction = has("rate:M");
        let repair = has("rate:R");
        if malfunction != repair {
            let token = if malfunction { "M" } else { "R" };
            return Err(Error::grammar(
                criteria,
                token,
                "malfunction and repair rates must be given together",
            ));
        }
    }
    Ok(())
}

fn positive_int(criteria: &str, token: &str, input: &str) -> Result<u32> {
    let value = input.parse::<u32>().map_err(|e| {
        Error::grammar(criteria, token, format!("failed parsing integer: {}", e))
    })?;
    if value == 0 {
        return Err(Error::grammar(criteria, token, "value must be at least 1"));
    }
    Ok(value)
}

/// Parses a decimal written with `p` in place of the decimal point.
fn decimal(criteria: &str, token: &str, input: &str) -> Result<Float> {
    if input.is_empty() || input.contains('.') {
        return Err(Error::grammar(criteria, token, "expected a decimal like `0p01`"));
    }
    let value = input.replacen('p', ".", 1).parse::<Float>().map_err(|e| {
        Error::grammar(criteria, token, format!("failed parsing decimal: {}", e))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(Error::grammar(
            criteria,
            token,
            "decimal must be a non-negative finite number",
        ));
    }
    Ok(value)
}
