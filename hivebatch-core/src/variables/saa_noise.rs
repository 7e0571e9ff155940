//! Sensor and actuator noise sweeps.

use linked_hash_map::LinkedHashMap;

use crate::config::{DeviceNoise, NoiseModel};
use crate::criteria::{CriteriaDescriptor, NoiseCategory};
use crate::error::Result;
use crate::mutation::MutationSet;
use crate::util::{fmt_float, linspace};

use super::GenContext;

const SENSORS: &str = "sensors";
const ACTUATORS: &str = "actuators";

/// Element of a known device within the configuration document.
pub fn device_path(category: &str, device: &str) -> Option<&'static str> {
    match (category, device) {
        (SENSORS, "light") => Some(".//sensors/footbot_light"),
        (SENSORS, "proximity") => Some(".//sensors/footbot_proximity"),
        (SENSORS, "ground") => Some(".//sensors/footbot_motor_ground"),
        (SENSORS, "steering") => Some(".//sensors/differential_steering"),
        (ACTUATORS, "steering") => Some(".//actuators/differential_steering"),
        _ => None,
    }
}

/// Noise levels of a single device, one per experiment.
struct DeviceSweep {
    path: String,
    model: NoiseModel,
    levels: usize,
}

impl DeviceSweep {
    fn push_level(&self, set: &mut MutationSet, i: usize) {
        match &self.model {
            NoiseModel::Uniform { range } => {
                let level = linspace(range[0], range[1], self.levels)[i];
                set.push(&self.path, "model", "uniform");
                set.push(&self.path, "level", fmt_float(level));
            }
            NoiseModel::Gaussian {
                stddev_range,
                mean_range,
            } => {
                let stddev = linspace(stddev_range[0], stddev_range[1], self.levels)[i];
                let mean = linspace(mean_range[0], mean_range[1], self.levels)[i];
                set.push(&self.path, "model", "gaussian");
                set.push(&self.path, "stddev", fmt_float(stddev));
                set.push(&self.path, "mean", fmt_float(mean));
            }
        }
    }
}

fn collect_devices(
    category: &str,
    table: &LinkedHashMap<String, DeviceNoise>,
    levels: usize,
    out: &mut Vec<DeviceSweep>,
) {
    for (device, noise) in table {
        match device_path(category, device) {
            Some(path) => out.push(DeviceSweep {
                path: format!("{}/noise", path),
                model: noise.model.clone(),
                levels,
            }),
            None => warn!("ignoring noise config for unknown {} device `{}`", category, device),
        }
    }
}

/// `card + 1` experiments, exp0 is every device at the lower bound of its
/// range. Devices missing from the noise table are left untouched.
pub(super) fn generate(desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<MutationSet>> {
    let category = desc.noise().ok_or_else(|| desc.missing("noise category"))?;
    let card = desc
        .cardinality_token()
        .ok_or_else(|| desc.missing("cardinality"))? as usize;
    let config = ctx.aux.saa_noise()?;
    let levels = card + 1;

    let mut devices = Vec::new();
    if category != NoiseCategory::Actuators {
        collect_devices(SENSORS, &config.sensors, levels, &mut devices);
    }
    if category != NoiseCategory::Sensors {
        collect_devices(ACTUATORS, &config.actuators, levels, &mut devices);
    }
    if devices.is_empty() {
        warn!(
            "no configured devices for `{}`, experiments will be identical",
            desc.cli_arg()
        );
    }

    Ok((0..levels)
        .map(|i| {
            let mut set = MutationSet::new();
            for device in &devices {
                device.push_level(&mut set, i);
            }
            set
        })
        .collect())
}
