use stemcell_common::{SimParams, Vec3};

/// The diffusible FGF4 concentration field on a uniform grid.
///
/// Storage carries one border cell on every active axis; before each
/// solver sub-step the border is overwritten with its nearest interior
/// value (reflecting boundary), so no mass leaks at the domain edges.
/// Cells read and write the field through `index_of`, a many-to-one
/// nearest-grid-point mapping.
pub struct DiffusionField {
    /// Storage dimensions, border included (planar mode keeps one z layer).
    dims: [usize; 3],
    /// Interior dimensions exposed to cells and snapshots.
    interior: [usize; 3],
    is_3d: bool,
    inv_spat_res: f32,
    values: Vec<f32>,
    scratch: Vec<f32>,
}

impl DiffusionField {
    pub fn new(params: &SimParams) -> Self {
        // round(location / spat_res) lands in 0..=ceil(extent / spat_res),
        // so the interior carries that many points per axis.
        let points = |extent: f32| (extent / params.spat_res).ceil() as usize + 1;
        let interior = [
            points(params.size[0]),
            points(params.size[1]),
            if params.is_3d { points(params.size[2]) } else { 1 },
        ];
        let dims = [
            interior[0] + 2,
            interior[1] + 2,
            if params.is_3d { interior[2] + 2 } else { 1 },
        ];
        let len = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            interior,
            is_3d: params.is_3d,
            inv_spat_res: 1.0 / params.spat_res,
            values: vec![0.0; len],
            scratch: vec![0.0; len],
        }
    }

    pub fn interior_dims(&self) -> [usize; 3] {
        self.interior
    }

    #[inline(always)]
    fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.dims[1] + y) * self.dims[2] + z
    }

    /// Flat storage index of the grid point nearest to a location.
    #[inline(always)]
    pub fn index_of(&self, location: Vec3) -> usize {
        let map = |value: f32, n: usize| -> usize {
            let i = (value * self.inv_spat_res).round() as i64;
            i.clamp(0, n as i64 - 1) as usize + 1
        };
        let x = map(location.x, self.interior[0]);
        let y = map(location.y, self.interior[1]);
        let z = if self.is_3d { map(location.z, self.interior[2]) } else { 0 };
        self.idx(x, y, z)
    }

    #[inline(always)]
    pub fn value(&self, index: usize) -> f32 {
        self.values[index]
    }

    #[inline(always)]
    pub fn add(&mut self, index: usize, amount: f32) {
        self.values[index] += amount;
    }

    /// Total interior concentration.
    pub fn total_mass(&self) -> f64 {
        let mut sum = 0.0f64;
        self.for_each_interior(|v| sum += v as f64);
        sum
    }

    /// Copy of the interior values, x fastest-varying last.
    pub fn interior_values(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.interior.iter().product());
        self.for_each_interior(|v| out.push(v));
        out
    }

    fn for_each_interior<F: FnMut(f32)>(&self, mut f: F) {
        let (z0, z1) = if self.is_3d { (1, self.dims[2] - 1) } else { (0, 1) };
        for x in 1..self.dims[0] - 1 {
            for y in 1..self.dims[1] - 1 {
                for z in z0..z1 {
                    f(self.values[self.idx(x, y, z)]);
                }
            }
        }
    }

    /// Sets every border cell to its nearest interior neighbor's value.
    fn reflect_borders(&mut self) {
        let [nx, ny, nz] = self.dims;
        for y in 0..ny {
            for z in 0..nz {
                let (low, low_src) = (self.idx(0, y, z), self.idx(1, y, z));
                let (high, high_src) = (self.idx(nx - 1, y, z), self.idx(nx - 2, y, z));
                self.values[low] = self.values[low_src];
                self.values[high] = self.values[high_src];
            }
        }
        for x in 0..nx {
            for z in 0..nz {
                let (low, low_src) = (self.idx(x, 0, z), self.idx(x, 1, z));
                let (high, high_src) = (self.idx(x, ny - 1, z), self.idx(x, ny - 2, z));
                self.values[low] = self.values[low_src];
                self.values[high] = self.values[high_src];
            }
        }
        if self.is_3d {
            for x in 0..nx {
                for y in 0..ny {
                    let (low, low_src) = (self.idx(x, y, 0), self.idx(x, y, 1));
                    let (high, high_src) = (self.idx(x, y, nz - 1), self.idx(x, y, nz - 2));
                    self.values[low] = self.values[low_src];
                    self.values[high] = self.values[high_src];
                }
            }
        }
    }

    /// Advances the field by one macro step: `floor(step_dt / diffuse_dt)`
    /// stable sub-steps plus one remainder sub-step, so elapsed diffusion
    /// time matches the macro step exactly.
    pub fn update(&mut self, params: &SimParams) {
        let full_steps = (params.step_dt / params.diffuse_dt).floor() as u32;
        let remainder = params.step_dt - full_steps as f32 * params.diffuse_dt;
        for _ in 0..full_steps {
            self.sub_step(params.diffuse_dt, params);
        }
        if remainder > f32::EPSILON {
            self.sub_step(remainder, params);
        }
    }

    fn sub_step(&mut self, dt: f32, params: &SimParams) {
        self.reflect_borders();

        let a = dt * params.diffuse_const / params.spat_res_sq;
        let neighbors = if self.is_3d { 6.0 } else { 4.0 };
        let b = 1.0 - neighbors * a;

        let [nx, ny, nz] = self.dims;
        let (z0, z1) = if self.is_3d { (1, nz - 1) } else { (0, 1) };
        self.scratch.copy_from_slice(&self.values);
        for x in 1..nx - 1 {
            for y in 1..ny - 1 {
                for z in z0..z1 {
                    let center = self.idx(x, y, z);
                    let mut sum = self.values[self.idx(x - 1, y, z)]
                        + self.values[self.idx(x + 1, y, z)]
                        + self.values[self.idx(x, y - 1, z)]
                        + self.values[self.idx(x, y + 1, z)];
                    if self.is_3d {
                        sum += self.values[self.idx(x, y, z - 1)]
                            + self.values[self.idx(x, y, z + 1)];
                    }
                    self.scratch[center] = b * self.values[center] + a * sum;
                }
            }
        }
        std::mem::swap(&mut self.values, &mut self.scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{cubic_params, planar_params};

    #[test]
    fn interior_mass_is_conserved() {
        let params = planar_params();
        let mut field = DiffusionField::new(&params);
        let center = field.index_of(Vec3::new(params.size[0] / 2.0, params.size[1] / 2.0, 0.0));
        field.add(center, 100.0);

        let before = field.total_mass();
        field.update(&params);
        let after = field.total_mass();
        assert!(
            (before - after).abs() < 1e-3,
            "mass drifted: {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn single_seed_spreads_symmetrically() {
        let params = planar_params();
        let mut field = DiffusionField::new(&params);
        let cx = params.size[0] / 2.0;
        let cy = params.size[1] / 2.0;
        let center = field.index_of(Vec3::new(cx, cy, 0.0));
        field.add(center, 64.0);

        field.update(&params);

        // Sample two opposite offsets from the seed along each axis.
        let offset = params.spat_res * 3.0;
        let east = field.value(field.index_of(Vec3::new(cx + offset, cy, 0.0)));
        let west = field.value(field.index_of(Vec3::new(cx - offset, cy, 0.0)));
        let north = field.value(field.index_of(Vec3::new(cx, cy + offset, 0.0)));
        let south = field.value(field.index_of(Vec3::new(cx, cy - offset, 0.0)));
        assert!(east > 0.0, "seed must have spread after a macro step");
        assert!((east - west).abs() < 1e-4 * east.abs().max(1e-12));
        assert!((north - south).abs() < 1e-4 * north.abs().max(1e-12));
        assert!((east - north).abs() < 1e-4 * east.abs().max(1e-12));
    }

    #[test]
    fn elapsed_diffusion_time_matches_macro_step() {
        // A dt that does not divide the macro step exercises the remainder
        // sub-step: two runs over the same total time must agree closely.
        let mut params = planar_params();
        params.step_dt = 10.0;
        params.diffuse_dt = 0.5;

        let seed_and_run = |p: &SimParams| {
            let mut field = DiffusionField::new(p);
            let center = field.index_of(Vec3::new(p.size[0] / 2.0, p.size[1] / 2.0, 0.0));
            field.add(center, 10.0);
            field.update(p);
            (field.value(center), field.total_mass())
        };

        let (exact, mass_a) = seed_and_run(&params);
        params.diffuse_dt = 0.4; // 25 steps of 0.4
        let (with_remainder, mass_b) = seed_and_run(&params);
        assert!((mass_a - mass_b).abs() < 1e-6);
        // Identical elapsed time, slightly different discretization.
        assert!((exact - with_remainder).abs() / exact < 0.05);
    }

    #[test]
    fn location_mapping_is_many_to_one_and_in_bounds() {
        let params = planar_params();
        let field = DiffusionField::new(&params);
        let a = field.index_of(Vec3::new(1.0e-6, 1.0e-6, 0.0));
        let b = field.index_of(Vec3::new(3.0e-6, 2.0e-6, 0.0));
        assert_eq!(a, b, "nearby locations share a grid point");

        // Corner locations stay inside the interior.
        let corner = field.index_of(Vec3::new(params.size[0], params.size[1], 0.0));
        assert!(corner < field.values.len());
    }

    #[test]
    fn volumetric_mode_conserves_mass_too() {
        let params = cubic_params();
        let mut field = DiffusionField::new(&params);
        let center = field.index_of(Vec3::new(
            params.size[0] / 2.0,
            params.size[1] / 2.0,
            params.size[2] / 2.0,
        ));
        field.add(center, 42.0);
        let before = field.total_mass();
        field.update(&params);
        assert!((before - field.total_mass()).abs() < 1e-3);
    }
}
