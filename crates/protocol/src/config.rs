use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading a [`SimConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config extension: {0:?}")]
    UnsupportedExtension(PathBuf),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Broadphase algorithm requested from the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Broadphase {
    #[default]
    Dynamic,
    Sweep,
}

/// Simulation configuration. Sent verbatim as the payload of `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub gravity: Vec3,
    /// Fixed internal step, in seconds.
    pub fixed_time_step: f32,
    /// Default sub-step cap for `simulate` when the caller passes none.
    pub max_sub_steps: u32,
    pub solver_iterations: u32,
    pub broadphase: Broadphase,
    /// Enables the soft-body capable world on the simulation side.
    pub soft_bodies: bool,
    /// Optional binary payload (e.g. a compiled engine module) that must be
    /// fetched before `init` can be sent.
    pub engine_module: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            fixed_time_step: 1.0 / 60.0,
            max_sub_steps: 10,
            solver_iterations: 10,
            broadphase: Broadphase::Dynamic,
            soft_bodies: false,
            engine_module: None,
        }
    }
}

impl SimConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ConfigError::UnsupportedExtension(path.to_path_buf())),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_time_step.is_nan() || self.fixed_time_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fixed_time_step must be positive, got {}",
                self.fixed_time_step
            )));
        }
        if self.max_sub_steps == 0 {
            return Err(ConfigError::Invalid("max_sub_steps must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = SimConfig::default();
        assert_eq!(c.gravity, Vec3::new(0.0, -9.8, 0.0));
        assert_eq!(c.max_sub_steps, 10);
        assert!(c.engine_module.is_none());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let c = SimConfig::from_yaml_str("max_sub_steps: 3\nbroadphase: sweep\n").unwrap();
        assert_eq!(c.max_sub_steps, 3);
        assert_eq!(c.broadphase, Broadphase::Sweep);
        assert_eq!(c.fixed_time_step, 1.0 / 60.0);
    }

    #[test]
    fn json_roundtrip() {
        let c = SimConfig {
            soft_bodies: true,
            ..SimConfig::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(SimConfig::from_json_str(&json).unwrap(), c);
    }

    #[test]
    fn rejects_non_positive_time_step() {
        let err = SimConfig::from_yaml_str("fixed_time_step: 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "solver_iterations: 4").unwrap();
        let c = SimConfig::load(&path).unwrap();
        assert_eq!(c.solver_iterations, 4);

        let bad = dir.path().join("sim.toml");
        std::fs::write(&bad, "").unwrap();
        assert!(matches!(
            SimConfig::load(&bad),
            Err(ConfigError::UnsupportedExtension(_))
        ));
    }
}
