use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently
/// during simulation steps. All space-like values are meters, all times
/// seconds; forces newtons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Domain
    pub size: [f32; 3], // size[2] == 0 selects planar mode
    pub is_3d: bool,

    // Spatial bins
    pub bin_size: f32,
    pub neighbor_radius: f32,
    pub neighbor_radius_sq: f32,

    // Time
    pub step_dt: f32,    // one macro step
    pub move_dt: f32,    // one motion sub-cycle
    pub diffuse_dt: f32, // one stable diffusion sub-step
    pub motion_substeps: u32,

    // Cell geometry (radius grows linearly with the division counter)
    pub max_radius: f32,
    pub min_radius: f32,
    pub pluri_growth: f32,
    pub diff_growth: f32,

    // Contact mechanics
    pub youngs_mod: f32,
    pub poisson: f32,
    pub adhesion_const: f32,
    pub viscosity: f32,
    pub motility_force: f32,

    // Lifecycle thresholds
    pub pluri_div_thresh: f32,
    pub diff_div_thresh: f32,
    pub pluri_to_diff: f32,
    pub death_thresh: f32,
    pub lonely_cell: u32,
    pub contact_inhibit: u32,
    pub diff_surround: u32,

    // Regulatory network cadence
    pub num_states: u32,
    pub boolean_thresh: u32,
    pub dox_step: u32,

    // Diffusion field
    pub spat_res: f32,
    pub spat_res_sq: f32,
    pub diffuse_const: f32,
    pub max_concentration: f32,

    // Motility mode
    pub chemotaxis: bool,
}

impl SimParams {
    /// Radius a cell of the given phenotype has after `div_counter` steps of
    /// growth, clamped to the configured maximum.
    pub fn radius_for(&self, differentiated: bool, div_counter: f32) -> f32 {
        let growth = if differentiated { self.diff_growth } else { self.pluri_growth };
        (self.min_radius + growth * div_counter).min(self.max_radius)
    }
}
