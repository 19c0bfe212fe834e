use crate::backend::Backend;
use stemcell_common::{SimParams, Vec3};
use std::sync::atomic::{AtomicU32, Ordering};

/// Uniform spatial bins over the simulation space, padded with one ghost
/// bin layer on every face so a 27-bin neighborhood scan never needs bounds
/// checks. Bin storage is a fixed number of slots per bin; a build that
/// would overflow any bin doubles the slot capacity and retries.
pub struct SpatialBins {
    pub dims: [usize; 3],
    bin_size: f32,
    /// Slots available per bin; doubles on overflow.
    capacity: usize,
    /// Occupancy per bin, rebuilt every pass.
    counts: Vec<u32>,
    /// Cell indices, `capacity` slots per bin.
    slots: Vec<u32>,
    /// Ghost-offset bin coordinate of each cell, kept for the scan kernels.
    pub coords: Vec<[u32; 3]>,
    /// Temporary atomic write offsets used during the parallel fill.
    write_offsets: Vec<AtomicU32>,
}

const INITIAL_BIN_CAPACITY: usize = 8;

impl SpatialBins {
    pub fn new(params: &SimParams) -> Self {
        // floor(size / bin_size) + 1 interior bins per axis covers positions
        // exactly on the far face; +2 adds the ghost layer.
        let dim = |extent: f32| (extent / params.bin_size).floor() as usize + 3;
        let dims = [dim(params.size[0]), dim(params.size[1]), dim(params.size[2])];
        let num_bins = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            bin_size: params.bin_size,
            capacity: INITIAL_BIN_CAPACITY,
            counts: vec![0; num_bins],
            slots: vec![0; num_bins * INITIAL_BIN_CAPACITY],
            coords: Vec::new(),
            write_offsets: (0..num_bins).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline(always)]
    fn flat_index(&self, coord: [u32; 3]) -> usize {
        (coord[0] as usize * self.dims[1] + coord[1] as usize) * self.dims[2] + coord[2] as usize
    }

    /// Discretizes a location into its ghost-offset bin coordinate. Locations
    /// are clamped into the interior, which only matters for values sitting
    /// exactly on a face after floating-point rounding.
    #[inline(always)]
    pub fn bin_coord(&self, location: Vec3) -> [u32; 3] {
        let inv = 1.0 / self.bin_size;
        let axis = |value: f32, dim: usize| {
            let c = (value * inv).floor() as i64 + 1;
            c.clamp(1, dim as i64 - 2) as u32
        };
        [
            axis(location.x, self.dims[0]),
            axis(location.y, self.dims[1]),
            axis(location.z, self.dims[2]),
        ]
    }

    /// Rebuilds the bins for the given locations. Overflowing a bin is a
    /// retry signal: slot capacity doubles and the whole fill runs again.
    pub fn rebuild(&mut self, locations: &[Vec3], backend: Backend) {
        let n = locations.len();

        // Phase 1: assign bin coordinates to each cell.
        let coords = backend.map_indexed(n, |i| self.bin_coord(locations[i]));
        self.coords = coords;

        loop {
            // Phase 2: fill slots; each cell claims a slot in its bin via an
            // atomic offset. Writes land in a gather list first so the slot
            // array itself needs no synchronization.
            for offset in &self.write_offsets {
                offset.store(0, Ordering::Relaxed);
            }
            let capacity = self.capacity;
            let write_data: Vec<(usize, u32, bool)> = backend.map_indexed(n, |i| {
                let bin = self.flat_index(self.coords[i]);
                let offset = self.write_offsets[bin].fetch_add(1, Ordering::Relaxed) as usize;
                (bin * capacity + offset, i as u32, offset < capacity)
            });

            // Phase 3: overflow check before any slot write.
            if write_data.iter().any(|&(_, _, fits)| !fits) {
                self.capacity *= 2;
                self.slots.resize(self.counts.len() * self.capacity, 0);
                log::debug!("bin capacity doubled to {} slots", self.capacity);
                continue;
            }

            for &(slot, cell, _) in &write_data {
                self.slots[slot] = cell;
            }
            for (count, offset) in self.counts.iter_mut().zip(&self.write_offsets) {
                *count = offset.load(Ordering::Relaxed);
            }
            return;
        }
    }

    /// Calls `f` with every cell index stored in the 27-bin neighborhood of
    /// `coord` (including the focus cell itself; callers filter).
    #[inline(always)]
    pub fn for_each_candidate<F: FnMut(u32)>(&self, coord: [u32; 3], mut f: F) {
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                for dz in -1i64..=1 {
                    let neighbor = [
                        (coord[0] as i64 + dx) as u32,
                        (coord[1] as i64 + dy) as u32,
                        (coord[2] as i64 + dz) as u32,
                    ];
                    let bin = self.flat_index(neighbor);
                    let count = self.counts[bin] as usize;
                    let start = bin * self.capacity;
                    for &cell in &self.slots[start..start + count] {
                        f(cell);
                    }
                }
            }
        }
    }
}
