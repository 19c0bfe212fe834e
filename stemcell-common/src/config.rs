use crate::params::SimParams;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration for the simulation space
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpaceConfig {
    pub width_um: f32,
    pub height_um: f32,
    /// Depth of the space; 0 selects the planar (2D) mode.
    #[serde(default)]
    pub depth_um: f32,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub end_step: u32,
    #[serde(default = "default_step_dt")]
    pub step_dt_sec: f32,
    #[serde(default = "default_move_dt")]
    pub move_dt_sec: f32,
    #[serde(default = "default_diffuse_dt")]
    pub diffuse_dt_sec: f32,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_steps: u32,
}

fn default_step_dt() -> f32 {
    1800.0 // 30 minutes per step
}

fn default_move_dt() -> f32 {
    200.0
}

fn default_diffuse_dt() -> f32 {
    0.5
}

fn default_snapshot_interval() -> u32 {
    1
}

// Initial cell population and geometry, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellConfig {
    pub num_nanog_high: u32,
    pub num_gata6_high: u32,
    pub radius_um: f32,
    pub neighbor_radius_um: f32,
    /// Randomize the initial FGF4/FGFR values of seeded cells.
    #[serde(default = "default_true")]
    pub stochastic_regulatory: bool,
    pub seed: u64,
}

// Material and motility constants for the contact mechanics
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MechanicsConfig {
    #[serde(default = "default_youngs")]
    pub youngs_mod_pa: f32,
    #[serde(default = "default_poisson")]
    pub poisson: f32,
    #[serde(default = "default_adhesion")]
    pub adhesion_const: f32,
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    #[serde(default = "default_motility_force")]
    pub motility_force: f32,
}

fn default_youngs() -> f32 {
    1000.0 // Pa
}

fn default_poisson() -> f32 {
    0.5
}

fn default_adhesion() -> f32 {
    1.07e-4 // N/m
}

fn default_viscosity() -> f32 {
    10000.0 // Pa*s
}

fn default_motility_force() -> f32 {
    2.0e-9 // N
}

// Lifecycle thresholds, all counted in macro steps
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LifecycleConfig {
    pub pluri_div_thresh: f32,
    pub diff_div_thresh: f32,
    pub pluri_to_diff: f32,
    pub death_thresh: f32,
    pub lonely_cell: u32,
    pub contact_inhibit: u32,
    pub diff_surround: u32,
}

// The symbolic regulatory network and its evaluation cadence
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegulatoryConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<String>,
    #[serde(default = "default_num_states")]
    pub num_states: u32,
    /// Evaluate the network only every this many steps per cell.
    #[serde(default = "default_boolean_thresh")]
    pub boolean_thresh: u32,
    /// Step at which the signaling pathway becomes active.
    #[serde(default)]
    pub dox_step: u32,
}

fn default_rules() -> Vec<String> {
    ["x5", "x1 * x4", "x2", "x5 + 1", "(x3+1) * (x4+1)"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_num_states() -> u32 {
    2
}

fn default_boolean_thresh() -> u32 {
    1
}

// The diffusible FGF4 field
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FieldConfig {
    #[serde(default = "default_spat_res")]
    pub spat_res_um: f32,
    #[serde(default = "default_diffuse")]
    pub diffuse_um2_per_sec: f32,
    #[serde(default = "default_max_concentration")]
    pub max_concentration: f32,
}

fn default_spat_res() -> f32 {
    10.0
}

fn default_diffuse() -> f32 {
    50.0
}

fn default_max_concentration() -> f32 {
    10.0
}

// Motility mode selection
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct MotilityConfig {
    /// Step moving pluripotent cells toward their nearest differentiated
    /// neighbor instead of a random direction.
    #[serde(default)]
    pub chemotaxis: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub backend: BackendMode,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_snapshots: bool,
    pub save_final_cells: bool,
    #[serde(default)]
    pub save_positions_in_snapshot: bool,
    #[serde(default)]
    pub save_field_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub space: SpaceConfig,
    pub timing: TimingConfig,
    pub cells: CellConfig,
    #[serde(default = "default_mechanics")]
    pub mechanics: MechanicsConfig,
    pub lifecycle: LifecycleConfig,
    #[serde(default = "default_regulatory")]
    pub regulatory: RegulatoryConfig,
    #[serde(default = "default_field")]
    pub field: FieldConfig,
    #[serde(default)]
    pub motility: MotilityConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub output: OutputConfig,
}

fn default_mechanics() -> MechanicsConfig {
    MechanicsConfig {
        youngs_mod_pa: default_youngs(),
        poisson: default_poisson(),
        adhesion_const: default_adhesion(),
        viscosity: default_viscosity(),
        motility_force: default_motility_force(),
    }
}

fn default_regulatory() -> RegulatoryConfig {
    RegulatoryConfig {
        rules: default_rules(),
        num_states: default_num_states(),
        boolean_thresh: default_boolean_thresh(),
        dox_step: 0,
    }
}

fn default_field() -> FieldConfig {
    FieldConfig {
        spat_res_um: default_spat_res(),
        diffuse_um2_per_sec: default_diffuse(),
        max_concentration: default_max_concentration(),
    }
}

fn default_true() -> bool {
    true
}

const UM_TO_M: f32 = 1.0e-6;

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e)
        })?;
        let config: SimulationConfig = toml::from_str(&config_str).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the structural constraints that would otherwise surface as
    /// nonsense mid-run. Rule syntax is checked separately when the network
    /// is compiled at setup.
    pub fn validate(&self) -> Result<()> {
        if self.cells.radius_um <= 0.0 {
            anyhow::bail!("radius_um must be positive.");
        }
        if self.cells.num_nanog_high + self.cells.num_gata6_high == 0 {
            anyhow::bail!("initial cell count must be greater than 0.");
        }
        if self.space.width_um <= 0.0 || self.space.height_um <= 0.0 {
            anyhow::bail!("space dimensions must be positive.");
        }
        if self.space.depth_um < 0.0 {
            anyhow::bail!("depth_um cannot be negative (use 0 for planar mode).");
        }
        // Contacting pairs must always fall inside one 27-bin scan.
        if self.cells.neighbor_radius_um < 2.0 * self.cells.radius_um {
            anyhow::bail!("neighbor_radius_um must be at least one cell diameter.");
        }
        if self.timing.move_dt_sec <= 0.0 || self.timing.move_dt_sec > self.timing.step_dt_sec {
            anyhow::bail!("move_dt_sec must lie in (0, step_dt_sec].");
        }
        if self.timing.diffuse_dt_sec <= 0.0 {
            anyhow::bail!("diffuse_dt_sec must be positive.");
        }
        if self.regulatory.boolean_thresh == 0 {
            anyhow::bail!("boolean_thresh must be at least 1.");
        }
        // Explicit stencil stability: dt * D / dx^2 bounded by 1/(2*dims).
        let a = self.timing.diffuse_dt_sec * self.field.diffuse_um2_per_sec
            / (self.field.spat_res_um * self.field.spat_res_um);
        let limit = if self.space.depth_um > 0.0 { 1.0 / 6.0 } else { 0.25 };
        if a > limit + 1e-6 {
            anyhow::bail!(
                "diffusion sub-step unstable: dt*D/dx^2 = {:.4} exceeds {:.4}; \
                 lower diffuse_dt_sec or raise spat_res_um.",
                a,
                limit
            );
        }
        Ok(())
    }

    /// Converts the configuration into the flat runtime parameters used by
    /// every kernel. Space-like config values are micrometers; runtime
    /// parameters are SI (meters, seconds, newtons).
    pub fn get_sim_params(&self) -> SimParams {
        let size = [
            self.space.width_um * UM_TO_M,
            self.space.height_um * UM_TO_M,
            self.space.depth_um * UM_TO_M,
        ];
        let is_3d = self.space.depth_um > 0.0;

        let max_radius = self.cells.radius_um * UM_TO_M;
        let min_radius = max_radius / 2.0f32.sqrt();
        let neighbor_radius = self.cells.neighbor_radius_um * UM_TO_M;

        let step_dt = self.timing.step_dt_sec;
        let move_dt = self.timing.move_dt_sec;
        let motion_substeps = (step_dt / move_dt).round().max(1.0) as u32;

        let spat_res = self.field.spat_res_um * UM_TO_M;

        SimParams {
            size,
            is_3d,
            bin_size: neighbor_radius,
            neighbor_radius,
            neighbor_radius_sq: neighbor_radius * neighbor_radius,
            step_dt,
            move_dt,
            diffuse_dt: self.timing.diffuse_dt_sec,
            motion_substeps,
            max_radius,
            min_radius,
            pluri_growth: (max_radius - min_radius) / self.lifecycle.pluri_div_thresh,
            diff_growth: (max_radius - min_radius) / self.lifecycle.diff_div_thresh,
            youngs_mod: self.mechanics.youngs_mod_pa,
            poisson: self.mechanics.poisson,
            adhesion_const: self.mechanics.adhesion_const,
            viscosity: self.mechanics.viscosity,
            motility_force: self.mechanics.motility_force,
            pluri_div_thresh: self.lifecycle.pluri_div_thresh,
            diff_div_thresh: self.lifecycle.diff_div_thresh,
            pluri_to_diff: self.lifecycle.pluri_to_diff,
            death_thresh: self.lifecycle.death_thresh,
            lonely_cell: self.lifecycle.lonely_cell,
            contact_inhibit: self.lifecycle.contact_inhibit,
            diff_surround: self.lifecycle.diff_surround,
            num_states: self.regulatory.num_states,
            boolean_thresh: self.regulatory.boolean_thresh,
            dox_step: self.regulatory.dox_step,
            spat_res,
            spat_res_sq: spat_res * spat_res,
            diffuse_const: self.field_diffuse_const(),
            max_concentration: self.field.max_concentration,
            chemotaxis: self.motility.chemotaxis,
        }
    }

    fn field_diffuse_const(&self) -> f32 {
        // um^2/s -> m^2/s
        self.field.diffuse_um2_per_sec * UM_TO_M * UM_TO_M
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            space: SpaceConfig { width_um: 1000.0, height_um: 1000.0, depth_um: 0.0 },
            timing: TimingConfig {
                end_step: 10,
                step_dt_sec: default_step_dt(),
                move_dt_sec: default_move_dt(),
                diffuse_dt_sec: default_diffuse_dt(),
                snapshot_interval_steps: 1,
            },
            cells: CellConfig {
                num_nanog_high: 10,
                num_gata6_high: 10,
                radius_um: 5.0,
                neighbor_radius_um: 15.0,
                stochastic_regulatory: true,
                seed: 7,
            },
            mechanics: default_mechanics(),
            lifecycle: LifecycleConfig {
                pluri_div_thresh: 36.0,
                diff_div_thresh: 72.0,
                pluri_to_diff: 72.0,
                death_thresh: 144.0,
                lonely_cell: 5,
                contact_inhibit: 6,
                diff_surround: 6,
            },
            regulatory: default_regulatory(),
            field: default_field(),
            motility: MotilityConfig::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig {
                base_filename: "run".to_string(),
                save_snapshots: false,
                save_final_cells: false,
                save_positions_in_snapshot: false,
                save_field_in_snapshot: false,
                format: None,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        base_config().validate().unwrap();
    }

    #[test]
    fn rejects_tight_neighbor_radius() {
        let mut config = base_config();
        config.cells.neighbor_radius_um = 8.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unstable_diffusion_substep() {
        let mut config = base_config();
        config.timing.diffuse_dt_sec = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn params_convert_to_meters() {
        let params = base_config().get_sim_params();
        assert!((params.max_radius - 5.0e-6).abs() < 1e-12);
        assert!((params.size[0] - 1.0e-3).abs() < 1e-9);
        assert_eq!(params.motion_substeps, 9);
        assert!(!params.is_3d);
    }
}
