use crate::backend::Backend;
use stemcell_common::{clamp, SimParams, Vec3};

/// Nondimensional overlap below which an adhesion bond breaks.
pub const RUPTURE_OVERLAP: f32 = -0.360562;

/// Per-bond output of the contact force kernel.
struct BondForce {
    force: Vec3,
    ruptured: bool,
}

/// Computes the adhesive contact force for every bond and accumulates it
/// with opposite signs on the two endpoints. Returns the rupture flag per
/// bond, aligned with the bond list.
///
/// The force law is a closed-form polynomial fit to the Johnson-Kendall-
/// Roberts model: overlap is nondimensionalized by a material-derived
/// reference length and the fitted cubic gives the force scale.
pub fn adhesion_forces(
    bonds: &[[u32; 2]],
    locations: &[Vec3],
    radii: &[f32],
    adhesion_forces: &mut [Vec3],
    params: &SimParams,
    backend: Backend,
) -> Vec<bool> {
    let poisson_sq = params.poisson * params.poisson;
    // Both cells share one material, so the effective modulus folds the two
    // identical compliance terms.
    let e_hat = 1.0 / (2.0 * (1.0 - poisson_sq) / params.youngs_mod);
    let w = params.adhesion_const;

    // Per-bond gather runs on the selected backend; the two-sided scatter is
    // serial so no endpoint is written concurrently.
    let results: Vec<BondForce> = backend.map_indexed(bonds.len(), |b| {
        let [i, j] = bonds[b];
        let (i, j) = (i as usize, j as usize);

        let vector = locations[i] - locations[j];
        let distance = vector.length();
        let overlap = radii[i] + radii[j] - distance;

        let r_hat = 1.0 / (1.0 / radii[i] + 1.0 / radii[j]);
        let overlap_star =
            ((std::f32::consts::PI * w / e_hat).powf(2.0 / 3.0)) * r_hat.powf(1.0 / 3.0);
        let d = overlap / overlap_star;

        if d > RUPTURE_OVERLAP {
            let f = -0.0204 * d.powi(3) + 0.4942 * d.powi(2) + 1.0801 * d - 1.324;
            let magnitude = f * std::f32::consts::PI * w * r_hat;
            // Coincident centers give no direction and no force.
            let normal = if distance != 0.0 { vector.scale(1.0 / distance) } else { Vec3::zero() };
            BondForce { force: normal.scale(magnitude), ruptured: false }
        } else {
            BondForce { force: Vec3::zero(), ruptured: true }
        }
    });

    let mut ruptured = Vec::with_capacity(bonds.len());
    for (bond, result) in bonds.iter().zip(&results) {
        adhesion_forces[bond[0] as usize] += result.force;
        adhesion_forces[bond[1] as usize] += -result.force;
        ruptured.push(result.ruptured);
    }
    ruptured
}

/// Resolves the accumulated forces into motion over one sub-cycle using
/// overdamped Stokes dynamics, clamping each axis to the space bounds.
/// Adhesion force accumulators are zeroed afterwards; motility forces are
/// left for the remaining sub-cycles of the macro step.
pub fn apply_forces(
    locations: &mut [Vec3],
    radii: &[f32],
    adhesion: &mut [Vec3],
    motility: &[Vec3],
    velocities: &mut [Vec3],
    params: &SimParams,
    backend: Backend,
) {
    let viscosity = params.viscosity;
    let new_velocities: Vec<Vec3> = backend.map_indexed(locations.len(), |i| {
        let stokes_friction = 6.0 * std::f32::consts::PI * viscosity * radii[i];
        (adhesion[i] + motility[i]).scale(1.0 / stokes_friction)
    });

    let size = params.size;
    let move_dt = params.move_dt;
    backend.for_each_indexed(locations, |i, location| {
        let moved = *location + new_velocities[i].scale(move_dt);
        location.x = clamp(moved.x, 0.0, size[0]);
        location.y = clamp(moved.y, 0.0, size[1]);
        location.z = clamp(moved.z, 0.0, size[2]);
    });

    velocities.copy_from_slice(&new_velocities);
    adhesion.fill(Vec3::zero());
}
