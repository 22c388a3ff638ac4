//! Layout configuration
//!
//! Configuration is passed explicitly into the store, the kernels and the
//! step controller. It can be loaded from YAML or JSON; every key is
//! optional and falls back to its default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::types::{
    ComputeParams, DEFAULT_C1, DEFAULT_C2, DEFAULT_CAPACITY, DEFAULT_LINK_SIZE,
    DEFAULT_LINK_STIFFNESS, DEFAULT_MIN_DISTANCE, DEFAULT_PARTICLE_MASS, DEFAULT_REPULSION,
    DEFAULT_STEP_ADJUSTMENT, DEFAULT_STEP_LENGTH,
};

/// Integration scheme used by the move kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// Plain explicit step along the stored descent direction
    #[default]
    Euler,
    /// Two-stage midpoint scheme.
    ///
    /// The move follows the descent direction at the midpoint, while the
    /// line search still measures the directional derivative along the
    /// stored descent direction, so the step conditions are approximate.
    RungeKutta,
}

impl IntegratorType {
    /// Value passed to the kernels in [`ComputeParams::integrator`]
    pub fn flag(self) -> u32 {
        match self {
            IntegratorType::Euler => 0,
            IntegratorType::RungeKutta => 1,
        }
    }

    pub fn from_flag(flag: u32) -> Self {
        if flag == 1 {
            IntegratorType::RungeKutta
        } else {
            IntegratorType::Euler
        }
    }
}

/// Step controller options, keyed the way the control surface names them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OptimizerConfig {
    /// Iterations executed per update tick
    pub iterations_per_frame: u32,
    /// Maximum line-search tries per iteration
    pub search_iterations: u32,
    /// Consecutive stable-step count before forcing FIXED mode
    pub switch_to_manual_after: u32,
    /// Step length at session start and after reset
    pub initial_step_length: f32,
    /// Additive step change applied by the line search and manual nudges
    pub step_adjustment: f32,
    /// Sufficient-decrease constant C1
    pub sufficient_decrease: f32,
    /// Curvature constant C2
    pub curvature: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            iterations_per_frame: 1,
            search_iterations: 10,
            switch_to_manual_after: 50,
            initial_step_length: DEFAULT_STEP_LENGTH,
            step_adjustment: DEFAULT_STEP_ADJUSTMENT,
            sufficient_decrease: DEFAULT_C1,
            curvature: DEFAULT_C2,
        }
    }
}

/// Options used when creating particles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Smallest particle mass
    pub min_mass: f32,
    /// Largest particle mass
    pub max_mass: f32,
    /// Rest length of links and spacing of seeded chains
    pub link_size: f32,
    /// Integration scheme for the move kernel
    pub integrator: IntegratorType,
    /// Rate of initial rotation, exposed to the hosting application
    pub rotation: f32,
    /// Seed for reproducible placement, masses and colors
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            min_mass: DEFAULT_PARTICLE_MASS,
            max_mass: DEFAULT_PARTICLE_MASS,
            link_size: DEFAULT_LINK_SIZE,
            integrator: IntegratorType::Euler,
            rotation: 2.6,
            seed: None,
        }
    }
}

/// Constants of the energy model evaluated by the kernels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Spring constant of every link
    pub link_stiffness: f32,
    /// Pairwise repulsion strength
    pub repulsion: f32,
    /// Softening distance for repulsion
    pub min_distance: f32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            link_stiffness: DEFAULT_LINK_STIFFNESS,
            repulsion: DEFAULT_REPULSION,
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

/// Complete configuration of a layout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Particle capacity of the store and the state buffers
    pub capacity: usize,
    pub optimizer: OptimizerConfig,
    pub particles: ParticleConfig,
    pub kernel: KernelConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            optimizer: OptimizerConfig::default(),
            particles: ParticleConfig::default(),
            kernel: KernelConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Load a configuration file, choosing the parser by extension
    pub fn load(path: &Path) -> LayoutResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| LayoutError::UnsupportedConfigFormat(path.display().to_string()))?;

        let content = fs::read_to_string(path)?;
        let config: LayoutConfig = match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| LayoutError::Config(e.to_string()))?
            }
            "json" => {
                serde_json::from_str(&content).map_err(|e| LayoutError::Config(e.to_string()))?
            }
            other => return Err(LayoutError::UnsupportedConfigFormat(other.to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the store or the optimizer cannot work with
    pub fn validate(&self) -> LayoutResult<()> {
        if self.capacity == 0 {
            return Err(LayoutError::Config("capacity must be positive".into()));
        }
        if self.particles.min_mass > self.particles.max_mass {
            return Err(LayoutError::Config(format!(
                "min_mass {} exceeds max_mass {}",
                self.particles.min_mass, self.particles.max_mass
            )));
        }
        if self.particles.min_mass <= 0.0 {
            return Err(LayoutError::Config("particle mass must be positive".into()));
        }
        if self.optimizer.search_iterations == 0 {
            return Err(LayoutError::Config(
                "SearchIterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Kernel parameters for a trial move of `step_length`
    pub fn compute_params(
        &self,
        step_length: f32,
        particle_count: usize,
        link_count: usize,
    ) -> ComputeParams {
        ComputeParams {
            step_length,
            link_size: self.particles.link_size,
            link_stiffness: self.kernel.link_stiffness,
            repulsion: self.kernel.repulsion,
            min_distance: self.kernel.min_distance,
            particle_count: particle_count as u32,
            link_count: link_count as u32,
            integrator: self.particles.integrator.flag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn optimizer_keys_are_pascal_case() {
        let yaml = "IterationsPerFrame: 4\nSearchIterations: 25\nSwitchToManualAfter: 7\n";
        let config: OptimizerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.iterations_per_frame, 4);
        assert_eq!(config.search_iterations, 25);
        assert_eq!(config.switch_to_manual_after, 7);
        // Unspecified keys keep their defaults
        assert_eq!(config.initial_step_length, DEFAULT_STEP_LENGTH);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = TempDir::new().unwrap();

        let yaml_path = dir.path().join("layout.yaml");
        fs::write(
            &yaml_path,
            "capacity: 64\noptimizer:\n  SearchIterations: 3\nparticles:\n  integrator: runge_kutta\n",
        )
        .unwrap();
        let config = LayoutConfig::load(&yaml_path).unwrap();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.optimizer.search_iterations, 3);
        assert_eq!(config.particles.integrator, IntegratorType::RungeKutta);

        let json_path = dir.path().join("layout.json");
        fs::write(&json_path, r#"{"kernel": {"repulsion": 2.5}}"#).unwrap();
        let config = LayoutConfig::load(&json_path).unwrap();
        assert_eq!(config.kernel.repulsion, 2.5);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout.toml");
        fs::write(&path, "capacity = 3").unwrap();
        let err = LayoutConfig::load(&path).unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedConfigFormat(ext) if ext == "toml"));
    }

    #[test]
    fn rejects_inverted_mass_range() {
        let mut config = LayoutConfig::default();
        config.particles.min_mass = 2.0;
        config.particles.max_mass = 1.0;
        assert!(matches!(config.validate(), Err(LayoutError::Config(_))));
    }

    #[test]
    fn rejects_zero_search_iterations() {
        let mut config = LayoutConfig::default();
        config.optimizer.search_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn compute_params_carry_config() {
        let mut config = LayoutConfig::default();
        config.particles.integrator = IntegratorType::RungeKutta;
        let params = config.compute_params(0.05, 3, 2);
        assert_eq!(params.step_length, 0.05);
        assert_eq!(params.particle_count, 3);
        assert_eq!(params.link_count, 2);
        assert_eq!(
            IntegratorType::from_flag(params.integrator),
            IntegratorType::RungeKutta
        );
    }
}
