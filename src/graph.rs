use crate::backend::Backend;
use crate::grid::SpatialBins;
use crate::state::Phenotype;
use stemcell_common::rules::{GATA6, NANOG};
use stemcell_common::{SimParams, Vec3};

/// Sentinel for "no cell found" in the nearest-cell outputs.
pub const NO_CELL: u32 = u32::MAX;

const INITIAL_EDGES_PER_CELL: usize = 8;

/// Reusable buffers for the edge passes. Each focus cell writes candidate
/// edges into its own slot range (`focus * max_per_agent ..`), which keeps
/// the pass lock-free on the parallel backend; overflowing the range doubles
/// the per-agent capacity and reruns the whole pass.
pub struct EdgeScratch {
    max_per_agent: usize,
    slots: Vec<[u32; 2]>,
    counts: Vec<u32>,
}

impl EdgeScratch {
    pub fn new() -> Self {
        Self {
            max_per_agent: INITIAL_EDGES_PER_CELL,
            slots: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn ensure(&mut self, num_cells: usize) {
        self.slots.resize(num_cells * self.max_per_agent, [0, 0]);
        self.counts.clear();
        self.counts.resize(num_cells, 0);
    }
}

/// Runs one dedupe-by-index edge pass: for each focus cell, every candidate
/// in the 27-bin neighborhood with a higher index is offered to `accept`.
/// Returns the compacted `[low, high]` edge list, ordered by focus index.
fn edge_pass<F>(
    bins: &SpatialBins,
    num_cells: usize,
    scratch: &mut EdgeScratch,
    backend: Backend,
    accept: F,
) -> Vec<[u32; 2]>
where
    F: Fn(usize, usize) -> bool + Sync + Send,
{
    loop {
        scratch.ensure(num_cells);
        let max = scratch.max_per_agent;
        backend.for_each_chunk(&mut scratch.slots, max, &mut scratch.counts, |focus, chunk, count| {
            let mut found = 0usize;
            bins.for_each_candidate(bins.coords[focus], |cand| {
                let cand = cand as usize;
                if cand > focus && accept(focus, cand) {
                    if found < max {
                        chunk[found] = [focus as u32, cand as u32];
                    }
                    found += 1;
                }
            });
            *count = found as u32;
        });

        let worst = scratch.counts.iter().copied().max().unwrap_or(0) as usize;
        if worst > max {
            scratch.max_per_agent = max * 2;
            log::debug!("edge capacity doubled to {} per cell", scratch.max_per_agent);
            continue;
        }

        let total: u32 = scratch.counts.iter().sum();
        let mut edges = Vec::with_capacity(total as usize);
        for focus in 0..num_cells {
            let start = focus * max;
            edges.extend_from_slice(&scratch.slots[start..start + scratch.counts[focus] as usize]);
        }
        return edges;
    }
}

/// Edges between cells whose centers lie within the neighbor radius.
pub fn proximity_edges(
    bins: &SpatialBins,
    locations: &[Vec3],
    params: &SimParams,
    scratch: &mut EdgeScratch,
    backend: Backend,
) -> Vec<[u32; 2]> {
    let radius_sq = params.neighbor_radius_sq;
    edge_pass(bins, locations.len(), scratch, backend, |focus, cand| {
        locations[focus].distance_squared(locations[cand]) <= radius_sq
    })
}

/// Edges between physically touching cells (overlap >= 0).
pub fn contact_edges(
    bins: &SpatialBins,
    locations: &[Vec3],
    radii: &[f32],
    scratch: &mut EdgeScratch,
    backend: Backend,
) -> Vec<[u32; 2]> {
    edge_pass(bins, locations.len(), scratch, backend, |focus, cand| {
        let distance = locations[focus].distance(locations[cand]);
        radii[focus] + radii[cand] - distance >= 0.0
    })
}

/// The per-step proximity graph: undirected, loop-free, rebuilt from scratch
/// every step. The edge list keeps the `i < j` orientation of the pass; the
/// CSR adjacency stores both directions for degree and neighbor queries.
pub struct NeighborGraph {
    pub edges: Vec<[u32; 2]>,
    offsets: Vec<u32>,
    adjacency: Vec<u32>,
}

impl NeighborGraph {
    pub fn empty() -> Self {
        Self { edges: Vec::new(), offsets: vec![0], adjacency: Vec::new() }
    }

    pub fn build(num_cells: usize, edges: Vec<[u32; 2]>) -> Self {
        let mut degrees = vec![0u32; num_cells];
        for edge in &edges {
            degrees[edge[0] as usize] += 1;
            degrees[edge[1] as usize] += 1;
        }

        let mut offsets = vec![0u32; num_cells + 1];
        for i in 0..num_cells {
            offsets[i + 1] = offsets[i] + degrees[i];
        }

        let mut cursor = offsets[..num_cells].to_vec();
        let mut adjacency = vec![0u32; offsets[num_cells] as usize];
        for edge in &edges {
            let (a, b) = (edge[0] as usize, edge[1] as usize);
            adjacency[cursor[a] as usize] = b as u32;
            cursor[a] += 1;
            adjacency[cursor[b] as usize] = a as u32;
            cursor[b] += 1;
        }

        Self { edges, offsets, adjacency }
    }

    #[inline(always)]
    pub fn degree(&self, cell: usize) -> usize {
        (self.offsets[cell + 1] - self.offsets[cell]) as usize
    }

    #[inline(always)]
    pub fn neighbors(&self, cell: usize) -> &[u32] {
        &self.adjacency[self.offsets[cell] as usize..self.offsets[cell + 1] as usize]
    }
}

/// Persistent adhesion bonds. Contact scans only insert fresh overlapping
/// pairs; rupture is the only removal path while a cell lives. Stored sorted
/// and deduplicated as `[low, high]` pairs.
pub struct AdhesionGraph {
    pub bonds: Vec<[u32; 2]>,
}

impl AdhesionGraph {
    pub fn new() -> Self {
        Self { bonds: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    /// Inserts freshly detected contacts, keeping existing bonds.
    pub fn merge_contacts(&mut self, fresh: &[[u32; 2]]) {
        self.bonds.extend_from_slice(fresh);
        self.bonds.sort_unstable();
        self.bonds.dedup();
    }

    /// Drops every bond flagged by the force pass.
    pub fn remove_ruptured(&mut self, ruptured: &[bool]) {
        debug_assert_eq!(ruptured.len(), self.bonds.len());
        let mut flags = ruptured.iter();
        self.bonds.retain(|_| !*flags.next().expect("flag per bond"));
    }

    /// Keeps the bond set consistent with a swap-remove of cell `removed`:
    /// its bonds vanish and the former last index is renamed to `removed`.
    pub fn swap_remove_vertex(&mut self, removed: u32, last: u32) {
        self.bonds.retain(|bond| bond[0] != removed && bond[1] != removed);
        if removed != last {
            for bond in &mut self.bonds {
                if bond[0] == last {
                    bond[0] = removed;
                }
                if bond[1] == last {
                    bond[1] = removed;
                }
                if bond[0] > bond[1] {
                    bond.swap(0, 1);
                }
            }
            self.bonds.sort_unstable();
            self.bonds.dedup();
        }
    }
}

/// Nearest cell per category for every focus cell. Categories are mutually
/// exclusive per candidate: differentiated wins, otherwise the dominant
/// marker decides, and a GATA6/NANOG tie matches nothing.
pub struct NearestCells {
    pub differentiated: Vec<u32>,
    pub gata6_high: Vec<u32>,
    pub nanog_high: Vec<u32>,
}

impl NearestCells {
    pub fn empty() -> Self {
        Self { differentiated: Vec::new(), gata6_high: Vec::new(), nanog_high: Vec::new() }
    }
}

pub fn classify_nearest(
    bins: &SpatialBins,
    locations: &[Vec3],
    regulatory: &[[u8; 5]],
    phenotypes: &[Phenotype],
    params: &SimParams,
    backend: Backend,
) -> NearestCells {
    let radius = params.neighbor_radius;
    let results: Vec<[u32; 3]> = backend.map_indexed(locations.len(), |focus| {
        let mut best = [NO_CELL; 3];
        // Running minima seeded past the search radius.
        let mut best_dist = [radius * 2.0; 3];
        bins.for_each_candidate(bins.coords[focus], |cand| {
            let cand = cand as usize;
            if cand == focus {
                return;
            }
            let distance = locations[focus].distance(locations[cand]);
            if distance > radius {
                return;
            }
            let category = if phenotypes[cand] == Phenotype::Differentiated {
                0
            } else if regulatory[cand][GATA6] > regulatory[cand][NANOG] {
                1
            } else if regulatory[cand][GATA6] < regulatory[cand][NANOG] {
                2
            } else {
                return;
            };
            if distance < best_dist[category] {
                best[category] = cand as u32;
                best_dist[category] = distance;
            }
        });
        best
    });

    let mut nearest = NearestCells {
        differentiated: Vec::with_capacity(results.len()),
        gata6_high: Vec::with_capacity(results.len()),
        nanog_high: Vec::with_capacity(results.len()),
    };
    for r in results {
        nearest.differentiated.push(r[0]);
        nearest.gata6_high.push(r[1]);
        nearest.nanog_high.push(r[2]);
    }
    nearest
}
