//! Supports reading the executor configuration from YAML file (optional)

use std::path::Path;
use tracing::warn;
use yaml_rust2::{Yaml, YamlLoader};

use crate::config::ExecutorConfig;
use crate::parameter_error::ParameterError;
use crate::pose::JointState;

const KNOWN_OPTIONS: [&str; 10] = [
    "arm_velocity_default",
    "milestone_indices",
    "milestone_window",
    "milestone_stride",
    "fallback_enabled",
    "fallback_joint_state",
    "home_state",
    "command_timeout_ms",
    "calibration_path",
    "reference_trajectory_path",
];

impl ExecutorConfig {
    /// Read the executor configuration from YAML file. YAML file like this is supported:
    /// ```yaml
    /// # Left arm, door opening
    /// arm_velocity_default: 15
    /// milestone_indices: [20, 40, 60]
    /// milestone_window: 5
    /// milestone_stride: 3
    /// fallback_enabled: true
    /// fallback_joint_state: [0, 20, 0, 70, 0, 90, 0]
    /// home_state: [0, 0, 0, 0, 0, 0, 0]
    /// command_timeout_ms: 30000
    /// calibration_path: cam2base_H_left.csv
    /// reference_trajectory_path: refer_tjt.csv
    /// ```
    /// All options are optional and take the values of `ExecutorConfig::default()` if
    /// missing, except `fallback_joint_state` that must be given when fallback is enabled.
    /// Relative paths are resolved against the directory of the YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = ExecutorConfig::from_yaml_str(&contents)?;
        if let Some(directory) = path.parent() {
            if config.calibration_path.is_relative() {
                config.calibration_path = directory.join(&config.calibration_path);
            }
            if config.reference_trajectory_path.is_relative() {
                config.reference_trajectory_path = directory.join(&config.reference_trajectory_path);
            }
        }
        Ok(config)
    }

    /// Parses the configuration from YAML text, paths are taken as they are.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ParameterError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|e| ParameterError::ParseError(format!("{}", e)))?;
        let mut config = ExecutorConfig::default();
        let Some(doc) = docs.first() else {
            // Empty file, all defaults
            return Ok(config);
        };
        let Some(options) = doc.as_hash() else {
            return Err(ParameterError::ParseError("configuration must be a mapping".into()));
        };
        for key in options.keys() {
            match key.as_str() {
                Some(name) if KNOWN_OPTIONS.contains(&name) => {}
                _ => warn!("Unknown configuration option {:?} is ignored", key),
            }
        }

        if let Some(velocity) = number(&doc["arm_velocity_default"], "arm_velocity_default")? {
            config.arm_velocity_default = velocity;
        }
        if let Some(indices) = list(&doc["milestone_indices"], "milestone_indices", index)? {
            config.milestone_indices = indices;
        }
        if let Some(window) = index(&doc["milestone_window"], "milestone_window")? {
            config.milestone_window = window;
        }
        if let Some(stride) = index(&doc["milestone_stride"], "milestone_stride")? {
            config.milestone_stride = stride;
        }
        match &doc["fallback_enabled"] {
            Yaml::Boolean(enabled) => config.fallback_enabled = *enabled,
            Yaml::BadValue | Yaml::Null => {}
            _ => return Err(ParameterError::ParseError("fallback_enabled must be true or false".into())),
        }
        match list(&doc["fallback_joint_state"], "fallback_joint_state", number)? {
            Some(joints) => config.fallback_joint_state = JointState::new(joints),
            None if config.fallback_enabled => {
                return Err(ParameterError::MissingField("fallback_joint_state".into()));
            }
            None => {}
        }
        if let Some(joints) = list(&doc["home_state"], "home_state", number)? {
            config.home_state = JointState::new(joints);
        }
        if let Some(timeout) = index(&doc["command_timeout_ms"], "command_timeout_ms")? {
            config.command_timeout_ms = timeout as u64;
        }
        if let Some(path) = text(&doc["calibration_path"], "calibration_path")? {
            config.calibration_path = path.into();
        }
        if let Some(path) = text(&doc["reference_trajectory_path"], "reference_trajectory_path")? {
            config.reference_trajectory_path = path.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn number(value: &Yaml, name: &str) -> Result<Option<f64>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(i) => Ok(Some(*i as f64)),
        Yaml::Real(_) => value.as_f64().map(Some).ok_or_else(|| {
            ParameterError::ParseError(format!("{} is not a valid number", name))
        }),
        _ => Err(ParameterError::ParseError(format!("{} must be a number", name))),
    }
}

fn index(value: &Yaml, name: &str) -> Result<Option<usize>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(i) if *i >= 0 => Ok(Some(*i as usize)),
        _ => Err(ParameterError::ParseError(format!("{} must be a non-negative integer", name))),
    }
}

fn text(value: &Yaml, name: &str) -> Result<Option<String>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::String(s) => Ok(Some(s.clone())),
        _ => Err(ParameterError::ParseError(format!("{} must be a string", name))),
    }
}

fn list<T>(
    value: &Yaml,
    name: &str,
    element: fn(&Yaml, &str) -> Result<Option<T>, ParameterError>,
) -> Result<Option<Vec<T>>, ParameterError> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let label = format!("{}[{}]", name, i);
                element(item, &label)?.ok_or(ParameterError::MissingField(label))
            })
            .collect::<Result<Vec<T>, _>>()
            .map(Some),
        _ => Err(ParameterError::ParseError(format!("{} must be a list", name))),
    }
}
