// Error taxonomy for the grid solver

use crate::sim::grid::FieldKind;

/// Errors raised by the grid solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    /// The grid was constructed with a zero dimension.
    #[error("invalid grid dimensions {width}x{height}; both must be at least 1")]
    InvalidDimensions { width: usize, height: usize },

    /// An indexed accessor was called outside the field's valid range.
    #[error("({col}, {row}) is out of bounds for the {field} field")]
    OutOfBounds {
        field: FieldKind,
        col: usize,
        row: usize,
    },

    /// A configuration value is outside its accepted range.
    #[error("invalid value {value} for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: f32 },

    /// The velocity field left its stable range during a tick.
    #[error("velocity reached {max_velocity}; simulation became unstable")]
    Unstable { max_velocity: f32 },
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SimError>;
