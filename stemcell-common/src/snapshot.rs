use serde::{Deserialize, Serialize};

/// A copy of the diffusion grid taken alongside a cell snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Interior grid dimensions (border cells excluded).
    pub dims: [usize; 3],
    /// Row-major concentrations, x fastest.
    pub values: Vec<f32>,
}

/// A snapshot of the simulation state and metrics at a specific time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation step at which the snapshot was taken.
    pub step: u32,
    /// The simulation time (in seconds) at which the snapshot was taken.
    pub time: f32,
    /// The total number of cells in the simulation.
    pub total_cell_count: u32,
    /// The number of cells still in the pluripotent state.
    pub pluripotent_count: u32,
    /// The number of differentiated cells.
    pub differentiated_count: u32,
    /// Raw [x, y, z] locations (meters) of all cells.
    /// Included only if `config.output.save_positions_in_snapshot` is true.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "locations": null
    pub locations: Option<Vec<[f32; 3]>>,
    /// Per-cell radii, aligned with `locations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radii: Option<Vec<f32>>,
    /// Per-cell phenotype (0 = pluripotent, 1 = differentiated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phenotypes: Option<Vec<u8>>,
    /// Per-cell regulatory vectors [FGF4, FGFR, ERK, GATA6, NANOG].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulatory: Option<Vec<[u8; 5]>>,
    /// The FGF4 concentration grid, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldSnapshot>,
}
