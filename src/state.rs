use std::sync::{Arc, Mutex};
use stemcell_common::rules::NUM_RULES;
use stemcell_common::Vec3;

/// Lifecycle state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phenotype {
    Pluripotent,
    Differentiated,
}

impl Phenotype {
    pub fn as_u8(self) -> u8 {
        match self {
            Phenotype::Pluripotent => 0,
            Phenotype::Differentiated => 1,
        }
    }
}

/// A collaborator-owned per-cell array kept in lockstep with the cell
/// collection. The engine calls `push_from` when a cell divides and
/// `swap_remove` when one dies, in the same order it compacts its own
/// arrays; it needs no knowledge of the element type.
pub trait AgentColumn: Send {
    fn len(&self) -> usize;
    /// Appends one entry for a newborn cell, cloned from its parent's slot.
    fn push_from(&mut self, parent: usize);
    fn swap_remove(&mut self, index: usize);
}

impl<T: Clone + Send> AgentColumn for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn push_from(&mut self, parent: usize) {
        let value = self[parent].clone();
        self.push(value);
    }

    fn swap_remove(&mut self, index: usize) {
        Vec::swap_remove(self, index);
    }
}

/// Handle collaborators keep after registering an array.
pub type SharedColumn = Arc<Mutex<dyn AgentColumn>>;

/// All per-cell values of the requested cell.
#[derive(Debug, Clone)]
pub struct NewCell {
    pub location: Vec3,
    pub radius: f32,
    pub motion: bool,
    pub regulatory: [u8; NUM_RULES],
    pub phenotype: Phenotype,
    pub diff_counter: f32,
    pub div_counter: f32,
    pub death_counter: f32,
}

/// Holds the simulation state vectors on the CPU, structure-of-arrays style.
/// Kernels read and write slices of these vectors; the vectors only change
/// length through `add_cell`, `spawn_child` and `swap_remove_cell`, which
/// also keep every registered collaborator column in lockstep.
pub struct CellState {
    pub locations: Vec<Vec3>,
    pub radii: Vec<f32>,
    pub velocities: Vec<Vec3>,
    pub adhesion_forces: Vec<Vec3>,
    pub motility_forces: Vec<Vec3>,
    pub motion: Vec<bool>,
    pub regulatory: Vec<[u8; NUM_RULES]>,
    pub phenotypes: Vec<Phenotype>,
    pub diff_counters: Vec<f32>,
    pub div_counters: Vec<f32>,
    pub death_counters: Vec<f32>,
    pub throttle_counters: Vec<u32>,
    columns: Vec<SharedColumn>,
}

impl CellState {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            locations: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            adhesion_forces: Vec::with_capacity(capacity),
            motility_forces: Vec::with_capacity(capacity),
            motion: Vec::with_capacity(capacity),
            regulatory: Vec::with_capacity(capacity),
            phenotypes: Vec::with_capacity(capacity),
            diff_counters: Vec::with_capacity(capacity),
            div_counters: Vec::with_capacity(capacity),
            death_counters: Vec::with_capacity(capacity),
            throttle_counters: Vec::with_capacity(capacity),
            columns: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.locations.len()
    }

    /// Registers a collaborator array. The array must already match the
    /// current cell count; from here on it grows and shrinks with the
    /// population automatically.
    pub fn register_column(&mut self, column: SharedColumn) {
        debug_assert_eq!(
            column.lock().expect("column lock poisoned").len(),
            self.count(),
            "registered column length must match the cell count"
        );
        self.columns.push(column);
    }

    /// Adds a freshly initialized cell (initial seeding). Seeding happens
    /// before any column registration; columns join populations that only
    /// change through division and death afterwards.
    pub fn add_cell(&mut self, cell: NewCell) {
        debug_assert!(
            self.columns.is_empty(),
            "cells added after column registration must divide, not seed"
        );
        self.locations.push(cell.location);
        self.radii.push(cell.radius);
        self.velocities.push(Vec3::zero());
        self.adhesion_forces.push(Vec3::zero());
        self.motility_forces.push(Vec3::zero());
        self.motion.push(cell.motion);
        self.regulatory.push(cell.regulatory);
        self.phenotypes.push(cell.phenotype);
        self.diff_counters.push(cell.diff_counter);
        self.div_counters.push(cell.div_counter);
        self.death_counters.push(cell.death_counter);
        self.throttle_counters.push(0);
    }

    /// Appends a daughter cell inheriting the parent's current values; only
    /// the location differs and the regulatory throttle restarts.
    pub fn spawn_child(&mut self, parent: usize, location: Vec3) {
        self.locations.push(location);
        self.radii.push(self.radii[parent]);
        self.velocities.push(Vec3::zero());
        self.adhesion_forces.push(Vec3::zero());
        self.motility_forces.push(Vec3::zero());
        self.motion.push(self.motion[parent]);
        self.regulatory.push(self.regulatory[parent]);
        self.phenotypes.push(self.phenotypes[parent]);
        self.diff_counters.push(self.diff_counters[parent]);
        self.div_counters.push(self.div_counters[parent]);
        self.death_counters.push(self.death_counters[parent]);
        self.throttle_counters.push(0);
        for column in &self.columns {
            column.lock().expect("column lock poisoned").push_from(parent);
        }
    }

    /// Removes the cell at `index`, moving the last cell into its slot.
    pub fn swap_remove_cell(&mut self, index: usize) {
        self.locations.swap_remove(index);
        self.radii.swap_remove(index);
        self.velocities.swap_remove(index);
        self.adhesion_forces.swap_remove(index);
        self.motility_forces.swap_remove(index);
        self.motion.swap_remove(index);
        self.regulatory.swap_remove(index);
        self.phenotypes.swap_remove(index);
        self.diff_counters.swap_remove(index);
        self.div_counters.swap_remove(index);
        self.death_counters.swap_remove(index);
        self.throttle_counters.swap_remove(index);
        for column in &self.columns {
            column.lock().expect("column lock poisoned").swap_remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(x: f32) -> NewCell {
        NewCell {
            location: Vec3::new(x, 0.0, 0.0),
            radius: 5.0e-6,
            motion: true,
            regulatory: [0, 0, 0, 0, 1],
            phenotype: Phenotype::Pluripotent,
            diff_counter: 0.0,
            div_counter: 1.0,
            death_counter: 0.0,
        }
    }

    #[test]
    fn spawn_child_inherits_parent_values() {
        let mut state = CellState::with_capacity(4);
        state.add_cell(seed(1.0));
        state.div_counters[0] = 3.5;
        state.spawn_child(0, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(state.count(), 2);
        assert_eq!(state.div_counters[1], 3.5);
        assert_eq!(state.regulatory[1], state.regulatory[0]);
        assert_eq!(state.throttle_counters[1], 0);
        assert_eq!(state.locations[1].x, 2.0);
    }

    #[test]
    fn registered_column_tracks_divisions_and_removals() {
        let mut state = CellState::with_capacity(4);
        for i in 0..3 {
            state.add_cell(seed(i as f32));
        }
        let column: SharedColumn = Arc::new(Mutex::new(vec![10u32, 20, 30]));
        state.register_column(Arc::clone(&column));

        state.spawn_child(1, Vec3::zero());
        {
            let column = column.lock().unwrap();
            assert_eq!(column.len(), 4);
        }

        state.swap_remove_cell(0);
        let column = column.lock().unwrap();
        assert_eq!(column.len(), 3);
        assert_eq!(state.count(), 3);
    }

    #[test]
    fn vec_column_clones_parent_and_compacts() {
        let mut column = vec![10u32, 20, 30];
        AgentColumn::push_from(&mut column, 1);
        assert_eq!(column, vec![10, 20, 30, 20]);
        AgentColumn::swap_remove(&mut column, 0);
        assert_eq!(column, vec![20, 20, 30]);
    }
}
