//! Auxiliary configuration, loaded from a YAML or TOML document.
//!
//! Most numeric sweep parameters are too unwieldy to express within a single
//! criteria string, so families like `temporal_variance` and `saa_noise` pull
//! their value lists from here.

use std::path::Path;

use linked_hash_map::LinkedHashMap;

use crate::error::{Error, Result};
use crate::util;
use crate::Float;

pub const DEFAULT_METRICS_LEAF: &str = "metrics";
pub const DEFAULT_SIM_COMMAND: &str =
    "argos3 -c {config} --log-file /dev/null --logerr-file /dev/null";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxConfig {
    #[serde(default)]
    pub temporal_variance: Option<TemporalVarianceConfig>,
    #[serde(default)]
    pub saa_noise: Option<NoiseConfig>,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub stages: StagesConfig,
}

impl AuxConfig {
    /// Loads the config from a `.yaml`/`.yml` or `.toml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        util::deser_struct_from_path(path.as_ref().to_path_buf())
    }

    pub fn temporal_variance(&self) -> Result<&TemporalVarianceConfig> {
        self.temporal_variance
            .as_ref()
            .ok_or_else(|| Error::AuxConfigMissing("temporal_variance".to_string()))
    }

    pub fn saa_noise(&self) -> Result<&NoiseConfig> {
        self.saa_noise
            .as_ref()
            .ok_or_else(|| Error::AuxConfigMissing("saa_noise".to_string()))
    }
}

/// Frequency and amplitude lists used by the `temporal_variance` family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalVarianceConfig {
    pub hz: Vec<Float>,
    #[serde(rename = "BC_amp", default)]
    pub bc_amp: Vec<Float>,
    #[serde(rename = "BM_amp", default)]
    pub bm_amp: Vec<Float>,
}

/// Per-device noise table used by the `saa_noise` family.
///
/// Device order is kept as written in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoiseConfig {
    #[serde(default)]
    pub sensors: LinkedHashMap<String, DeviceNoise>,
    #[serde(default)]
    pub actuators: LinkedHashMap<String, DeviceNoise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum NoiseModel {
    Uniform {
        range: [Float; 2],
    },
    Gaussian {
        stddev_range: [Float; 2],
        mean_range: [Float; 2],
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNoise {
    #[serde(flatten)]
    pub model: NoiseModel,
    /// Range of the tick axis used by downstream plotting
    pub xticks_range: [Float; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Name of the directory the simulator writes metric files into
    #[serde(default = "default_metrics_leaf")]
    pub metrics_leaf: String,
    /// Simulator invocation, `{config}` is replaced with the run config path
    #[serde(default = "default_sim_command")]
    pub command: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            metrics_leaf: default_metrics_leaf(),
            command: default_sim_command(),
        }
    }
}

fn default_metrics_leaf() -> String {
    DEFAULT_METRICS_LEAF.to_string()
}

fn default_sim_command() -> String {
    DEFAULT_SIM_COMMAND.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Environment variables exported to every simulation process
    #[serde(default)]
    pub propagate_env: Vec<String>,
}

/// External collaborators for the visualization and comparison stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub visualize_command: Option<String>,
    #[serde(default)]
    pub compare_command: Option<String>,
    /// Whether stage 3 should also write standard deviation files
    #[serde(default)]
    pub gen_stddev: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_noise_table() {
        let text = r#"
            [temporal_variance]
            hz = [0.0, 0.01]
            BC_amp = [0.1, 0.5]

            [saa_noise.sensors.light]
            model = "uniform"
            range = [0.0, 0.4]
            xticks_range = [0.0, 0.4]

            [saa_noise.sensors.proximity]
            model = "gaussian"
            stddev_range = [0.0, 0.1]
            mean_range = [0.0, 0.0]
            xticks_range = [0.0, 0.1]
        "#;
        let config: AuxConfig = toml::from_str(text).unwrap();
        let tv = config.temporal_variance().unwrap();
        assert_eq!(tv.bc_amp, vec![0.1, 0.5]);
        assert!(tv.bm_amp.is_empty());

        let noise = config.saa_noise().unwrap();
        let names = noise.sensors.keys().cloned().collect::<Vec<String>>();
        assert_eq!(names, vec!["light", "proximity"]);
        assert_eq!(
            noise.sensors["light"].model,
            NoiseModel::Uniform { range: [0.0, 0.4] }
        );
        assert_eq!(config.sim.metrics_leaf, DEFAULT_METRICS_LEAF);
    }

    #[test]
    fn tick_range_is_required() {
        let text = r#"
            [saa_noise.sensors.light]
            model = "uniform"
            range = [0.0, 0.4]
        "#;
        assert!(toml::from_str::<AuxConfig>(text).is_err());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_config() {
        let text = "
saa_noise:
  actuators:
    steering:
      model: uniform
      range: [0.0, 0.1]
      xticks_range: [0.0, 0.1]
exec:
  propagate_env: [ARGOS_PLUGIN_PATH]
";
        let config: AuxConfig = serde_yaml::from_str(text).unwrap();
        assert!(config.temporal_variance().is_err());
        assert_eq!(config.exec.propagate_env, vec!["ARGOS_PLUGIN_PATH"]);
        assert!(config.saa_noise().unwrap().sensors.is_empty());
    }
}
