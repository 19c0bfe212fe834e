pub mod config;
pub mod params;
pub mod rules;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BackendMode, CellConfig, ExecutionConfig, FieldConfig, LifecycleConfig, MechanicsConfig,
    MotilityConfig, OutputConfig, RegulatoryConfig, SimulationConfig, SpaceConfig, TimingConfig,
};
pub use params::SimParams;
pub use rules::{GeneNetwork, ERK, FGF4, FGFR, GATA6, NANOG};
pub use snapshot::{FieldSnapshot, Snapshot};
pub use vecmath::{clamp, Vec3};
