// Core solver: grid, transport, projection and tick orchestration

pub mod advect;
pub mod config;
pub mod error;
pub mod grid;
pub mod impulse;
pub mod numeric;
pub mod projection;
pub mod snapshot;
pub mod stepper;
pub mod strategy;
pub mod task;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use grid::{Axis, FieldKind, Grid};
pub use impulse::{Emitter, Impulse};
pub use snapshot::FieldSnapshot;
pub use stepper::{InitialCondition, Stepper};
pub use strategy::{Execution, ExecutionStrategy, Parallel, Sequential};
