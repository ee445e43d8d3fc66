// Numeric helpers on staggered fields

use na::DMatrix;

use crate::{
    ScalarField, VectorField,
    sim::grid::{FieldShape, faces_of},
};

/// Linear interpolation
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (1. - t) * a + t * b
}

/// Bilinearly interpolate a row-major field at a position in its own index
/// space. The position is clamped into the field first, and the "+1"
/// neighbour on each axis is clamped to the last valid index, so the sample
/// never leaves the field.
///
/// Parameters:
/// - `data` - The field samples, `shape.len()` long
/// - `shape` - The column/row extent of `data`
/// - `x` - The column coordinate
/// - `y` - The row coordinate
///
/// Returns:
/// - The interpolated value
pub fn bilinear(data: &[f32], shape: FieldShape, x: f32, y: f32) -> f32 {
    let (x, y) = shape.clamp_position(x, y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(shape.cols - 1);
    let y1 = (y0 + 1).min(shape.rows - 1);

    let wx = x - x0 as f32;
    let wy = y - y0 as f32;

    let at = |c: usize, r: usize| data[c + r * shape.cols];

    lerp(
        lerp(at(x0, y0), at(x1, y0), wx),
        lerp(at(x0, y1), at(x1, y1), wx),
        wy,
    )
}

/// Discrete divergence of one cell: net outflow through its four faces.
pub fn cell_divergence(
    vertical: &[f32],
    horizontal: &[f32],
    width: usize,
    col: usize,
    row: usize,
) -> f32 {
    let f = faces_of(width, col, row);
    (vertical[f.top] - vertical[f.bottom]) + (horizontal[f.right] - horizontal[f.left])
}

/// Compute the discrete divergence of a staggered velocity field. That is,
/// ∇⋅u per cell, with outflow positive and unit cell size.
///
/// Parameters:
/// - `vertical` - The `width * (height+1)` vertical velocity samples
/// - `horizontal` - The `(width+1) * height` horizontal velocity samples
/// - `width` - The number of cell columns
/// - `height` - The number of cell rows
///
/// Returns:
/// - A `height` x `width` `ScalarField` of the divergence
pub fn divergence(vertical: &[f32], horizontal: &[f32], width: usize, height: usize) -> ScalarField {
    DMatrix::from_fn(height, width, |row, col| {
        cell_divergence(vertical, horizontal, width, col, row)
    })
}

/// Average the staggered velocity onto cell centres.
///
/// Returns:
/// - A `VectorField` of `[horizontal, vertical]` components, each
///   `height` x `width`
pub fn cell_velocity(
    vertical: &[f32],
    horizontal: &[f32],
    width: usize,
    height: usize,
) -> VectorField {
    let u = DMatrix::from_fn(height, width, |row, col| {
        let f = faces_of(width, col, row);
        0.5 * (horizontal[f.left] + horizontal[f.right])
    });
    let v = DMatrix::from_fn(height, width, |row, col| {
        let f = faces_of(width, col, row);
        0.5 * (vertical[f.bottom] + vertical[f.top])
    });

    [u, v]
}

/// Reshape a row-major cell field into a `height` x `width` matrix.
pub fn to_matrix(data: &[f32], width: usize, height: usize) -> ScalarField {
    DMatrix::from_fn(height, width, |row, col| data[col + row * width])
}

/// Largest absolute value in a slice; NaN propagates.
pub fn max_abs(data: &[f32]) -> f32 {
    data.iter().fold(0.0f32, |m, &x| {
        if x.is_nan() || m.is_nan() {
            f32::NAN
        } else {
            m.max(x.abs())
        }
    })
}
