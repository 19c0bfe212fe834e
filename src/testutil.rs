//! Shared parameter fixtures for the unit tests.

use stemcell_common::SimParams;

/// Planar (2D) parameters matching the default configuration: 1000x1000 um
/// space, 5 um cells, 15 um neighbor radius, SI units.
pub fn planar_params() -> SimParams {
    let neighbor_radius = 15.0e-6f32;
    let max_radius = 5.0e-6f32;
    let min_radius = max_radius / 2.0f32.sqrt();
    let spat_res = 10.0e-6f32;
    SimParams {
        size: [1.0e-3, 1.0e-3, 0.0],
        is_3d: false,
        bin_size: neighbor_radius,
        neighbor_radius,
        neighbor_radius_sq: neighbor_radius * neighbor_radius,
        step_dt: 1800.0,
        move_dt: 200.0,
        diffuse_dt: 0.5,
        motion_substeps: 9,
        max_radius,
        min_radius,
        pluri_growth: (max_radius - min_radius) / 36.0,
        diff_growth: (max_radius - min_radius) / 72.0,
        youngs_mod: 1000.0,
        poisson: 0.5,
        adhesion_const: 1.07e-4,
        viscosity: 10000.0,
        motility_force: 2.0e-9,
        pluri_div_thresh: 36.0,
        diff_div_thresh: 72.0,
        pluri_to_diff: 72.0,
        death_thresh: 144.0,
        lonely_cell: 5,
        contact_inhibit: 6,
        diff_surround: 6,
        num_states: 2,
        boolean_thresh: 1,
        dox_step: 0,
        spat_res,
        spat_res_sq: spat_res * spat_res,
        diffuse_const: 50.0e-12,
        max_concentration: 10.0,
        chemotaxis: false,
    }
}

/// 3D variant of [`planar_params`] with a 300 um deep space. The diffusion
/// sub-step shrinks to keep the 7-point stencil inside its stability bound.
pub fn cubic_params() -> SimParams {
    let mut params = planar_params();
    params.size = [3.0e-4, 3.0e-4, 3.0e-4];
    params.is_3d = true;
    params.diffuse_dt = 0.3;
    params
}
