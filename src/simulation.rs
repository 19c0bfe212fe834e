use crate::backend::Backend;
use crate::cells::{random_unit_direction, update_cells};
use crate::diffusion::DiffusionField;
use crate::forces::{adhesion_forces, apply_forces};
use crate::graph::{
    classify_nearest, contact_edges, proximity_edges, AdhesionGraph, EdgeScratch, NearestCells,
    NeighborGraph,
};
use crate::grid::SpatialBins;
use crate::state::{CellState, NewCell, Phenotype, SharedColumn};
use anyhow::Result;
use log::{debug, info, trace};
use rand::prelude::*;
use stemcell_common::rules::NUM_RULES;
use stemcell_common::{
    FieldSnapshot, GeneNetwork, SimParams, SimulationConfig, Snapshot, Vec3,
};

/// Hard cap on in-bounds resampling when placing a daughter cell. Running
/// out means the cell radius is too large relative to the domain, which is a
/// configuration problem, not a runtime hiccup.
const MAX_PLACEMENT_ATTEMPTS: u32 = 100;

/// Manages the state and execution of the stem-cell colony simulation.
pub struct ColonySimulation {
    /// The simulation configuration, including initial conditions and parameters.
    pub config: SimulationConfig,
    /// Flat runtime parameters derived from the configuration.
    pub params: SimParams,
    /// Per-cell state vectors.
    pub state: CellState,
    /// Uniform spatial bins rebuilt before every scan.
    bins: SpatialBins,
    /// The proximity graph, rebuilt every step.
    pub neighbors: NeighborGraph,
    /// Persistent adhesion bonds.
    pub adhesion: AdhesionGraph,
    /// Nearest cell per phenotype category, refreshed every step.
    pub nearest: NearestCells,
    /// The diffusible FGF4 field.
    pub field: DiffusionField,
    /// The compiled regulatory network shared by all cells.
    network: GeneNetwork,
    /// Execution strategy for the per-cell and per-edge kernels.
    backend: Backend,
    /// Host-side RNG for seeding, motility directions and daughter placement.
    rng: StdRng,
    /// The current macro step number.
    pub current_step: u32,
    /// Scratch buffers for the edge passes.
    scratch: EdgeScratch,
    /// Stores collected simulation data snapshots at record intervals.
    recorded_snapshots: Vec<Snapshot>,
}

impl ColonySimulation {
    /// Creates a new simulation: compiles the regulatory network, seeds the
    /// two initial sub-populations and allocates the field and bins. Every
    /// configuration problem surfaces here, before the first step.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();

        // Compile the symbolic rules once; stepping never parses strings.
        let network =
            GeneNetwork::compile(&config.regulatory.rules, config.regulatory.num_states)?;

        let mut rng = StdRng::seed_from_u64(config.cells.seed);

        let num_nanog = config.cells.num_nanog_high as usize;
        let num_gata6 = config.cells.num_gata6_high as usize;
        let mut state = CellState::with_capacity(num_nanog + num_gata6);
        for group in 0..2 {
            let (count, gata6, nanog) =
                if group == 0 { (num_nanog, 0u8, 1u8) } else { (num_gata6, 1u8, 0u8) };
            for _ in 0..count {
                let location = Vec3::new(
                    rng.random::<f32>() * params.size[0],
                    rng.random::<f32>() * params.size[1],
                    if params.is_3d { rng.random::<f32>() * params.size[2] } else { 0.0 },
                );
                let (fgfr, erk) = if config.cells.stochastic_regulatory {
                    (rng.random_range(0..2) as u8, rng.random_range(0..2) as u8)
                } else {
                    (0, 0)
                };
                let regulatory: [u8; NUM_RULES] = [0, fgfr, erk, gata6, nanog];
                let div_counter = params.pluri_div_thresh * rng.random::<f32>();
                state.add_cell(NewCell {
                    location,
                    radius: params.radius_for(false, div_counter),
                    motion: true,
                    regulatory,
                    phenotype: Phenotype::Pluripotent,
                    diff_counter: params.pluri_to_diff * rng.random::<f32>(),
                    div_counter,
                    death_counter: 0.0,
                });
            }
        }

        let bins = SpatialBins::new(&params);
        let field = DiffusionField::new(&params);
        let backend = Backend::from(config.execution.backend);
        info!(
            "Seeded {} cells ({} NANOG-high, {} GATA6-high), backend {:?}.",
            state.count(),
            num_nanog,
            num_gata6,
            backend
        );

        Ok(Self {
            config,
            params,
            state,
            bins,
            neighbors: NeighborGraph::empty(),
            adhesion: AdhesionGraph::new(),
            nearest: NearestCells::empty(),
            field,
            network,
            backend,
            rng,
            current_step: 0,
            scratch: EdgeScratch::new(),
            recorded_snapshots: Vec::new(),
        })
    }

    /// Registers a collaborator per-cell array that will grow and shrink in
    /// lockstep with divisions and deaths.
    pub fn register_column(&mut self, column: SharedColumn) {
        self.state.register_column(column);
    }

    /// Advances the simulation by one macro step.
    pub fn step(&mut self) -> Result<()> {
        let backend = self.backend;

        // --- 1. Spatial bins + proximity graph ---
        self.bins.rebuild(&self.state.locations, backend);
        let edges = proximity_edges(
            &self.bins,
            &self.state.locations,
            &self.params,
            &mut self.scratch,
            backend,
        );
        self.neighbors = NeighborGraph::build(self.state.count(), edges);

        // --- 2. Nearest cells per category ---
        self.nearest = classify_nearest(
            &self.bins,
            &self.state.locations,
            &self.state.regulatory,
            &self.state.phenotypes,
            &self.params,
            backend,
        );

        // --- 3. Regulatory and lifecycle updates (serial; writes the field) ---
        let queues = update_cells(
            &mut self.state,
            &self.neighbors,
            &self.nearest,
            &mut self.field,
            &self.network,
            &self.params,
            &mut self.rng,
            self.current_step,
        );

        // --- 4. Population changes, graphs and columns in lockstep ---
        if !queues.divisions.is_empty() || !queues.removals.is_empty() {
            debug!(
                "step {}: {} divisions, {} removals",
                self.current_step,
                queues.divisions.len(),
                queues.removals.len()
            );
        }
        for parent in &queues.divisions {
            self.divide_cell(*parent as usize)?;
        }
        let mut removals = queues.removals;
        removals.sort_unstable_by(|a, b| b.cmp(a));
        removals.dedup();
        for index in removals {
            let last = self.state.count() as u32 - 1;
            self.adhesion.swap_remove_vertex(index, last);
            self.state.swap_remove_cell(index as usize);
        }

        // --- 5. Motion phase: contact refresh, forces, integration ---
        for _ in 0..self.params.motion_substeps {
            self.bins.rebuild(&self.state.locations, backend);
            let fresh = contact_edges(
                &self.bins,
                &self.state.locations,
                &self.state.radii,
                &mut self.scratch,
                backend,
            );
            self.adhesion.merge_contacts(&fresh);
            let ruptured = adhesion_forces(
                &self.adhesion.bonds,
                &self.state.locations,
                &self.state.radii,
                &mut self.state.adhesion_forces,
                &self.params,
                backend,
            );
            self.adhesion.remove_ruptured(&ruptured);
            apply_forces(
                &mut self.state.locations,
                &self.state.radii,
                &mut self.state.adhesion_forces,
                &self.state.motility_forces,
                &mut self.state.velocities,
                &self.params,
                backend,
            );
        }
        self.state.motility_forces.fill(Vec3::zero());
        trace!(
            "step {}: {} adhesion bonds after motion phase",
            self.current_step,
            self.adhesion.len()
        );

        // --- 6. Field relaxation over the full macro step ---
        self.field.update(&self.params);

        self.current_step += 1;
        Ok(())
    }

    /// Places and appends one daughter cell. The parent's counters were
    /// already halved when the division was queued.
    fn divide_cell(&mut self, parent: usize) -> Result<()> {
        let radius = self.state.radii[parent];
        let origin = self.state.locations[parent];
        let size = self.params.size;

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let direction = random_unit_direction(&mut self.rng, self.params.is_3d);
            let location = origin + direction.scale(radius);
            let inside = location.x >= 0.0
                && location.x <= size[0]
                && location.y >= 0.0
                && location.y <= size[1]
                && location.z >= 0.0
                && location.z <= size[2];
            if inside {
                self.state.spawn_child(parent, location);
                return Ok(());
            }
        }
        anyhow::bail!(
            "no in-bounds placement for a daughter of cell {} after {} attempts; \
             cell radius {:.3e} m is too large relative to the domain",
            parent,
            MAX_PLACEMENT_ATTEMPTS,
            radius
        )
    }

    /// Returns the current number of cells in the simulation.
    pub fn current_cell_count(&self) -> u32 {
        self.state.count() as u32
    }

    /// Provides access to the simulation parameters.
    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Provides access to the original simulation configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current per-cell export rows: location, radius, phenotype byte.
    pub fn get_results(&self) -> Vec<([f32; 3], f32, u8)> {
        (0..self.state.count())
            .map(|i| {
                let l = self.state.locations[i];
                ([l.x, l.y, l.z], self.state.radii[i], self.state.phenotypes[i].as_u8())
            })
            .collect()
    }

    /// Collects the metrics and optional payloads into a Snapshot.
    /// Should be called at record intervals.
    pub fn record_snapshot(&mut self) {
        let count = self.state.count();
        let differentiated = self
            .state
            .phenotypes
            .iter()
            .filter(|p| **p == Phenotype::Differentiated)
            .count() as u32;

        let output = &self.config.output;
        let locations = output.save_positions_in_snapshot.then(|| {
            self.state.locations.iter().map(|l| [l.x, l.y, l.z]).collect()
        });
        let radii = output.save_positions_in_snapshot.then(|| self.state.radii.clone());
        let phenotypes = output
            .save_positions_in_snapshot
            .then(|| self.state.phenotypes.iter().map(|p| p.as_u8()).collect());
        let regulatory = output.save_positions_in_snapshot.then(|| self.state.regulatory.clone());
        let field = output.save_field_in_snapshot.then(|| FieldSnapshot {
            dims: self.field.interior_dims(),
            values: self.field.interior_values(),
        });

        self.recorded_snapshots.push(Snapshot {
            step: self.current_step,
            time: self.current_step as f32 * self.params.step_dt,
            total_cell_count: count as u32,
            pluripotent_count: count as u32 - differentiated,
            differentiated_count: differentiated,
            locations,
            radii,
            phenotypes,
            regulatory,
            field,
        });
    }

    /// Provides access to the recorded snapshots.
    pub fn get_recorded_snapshots(&self) -> &Vec<Snapshot> {
        &self.recorded_snapshots
    }
}
