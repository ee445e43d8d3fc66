// Semi-Lagrangian transport of the grid fields

use crate::sim::{
    grid::{FieldShape, Grid},
    numeric,
    strategy::ExecutionStrategy,
};

/// Read-only view of the pre-advection velocity field.
struct VelocitySampler<'a> {
    vertical: &'a [f32],
    horizontal: &'a [f32],
    vertical_solid: &'a [bool],
    horizontal_solid: &'a [bool],
    vertical_shape: FieldShape,
    horizontal_shape: FieldShape,
}

impl VelocitySampler<'_> {
    /// Mean of the given vertical edges that exist and are open; 0 if none.
    fn mean_vertical(&self, edges: &[(isize, isize)]) -> f32 {
        mean_open(self.vertical, self.vertical_solid, self.vertical_shape, edges)
    }

    /// Mean of the given horizontal edges that exist and are open; 0 if none.
    fn mean_horizontal(&self, edges: &[(isize, isize)]) -> f32 {
        mean_open(self.horizontal, self.horizontal_solid, self.horizontal_shape, edges)
    }
}

fn mean_open(data: &[f32], solid: &[bool], shape: FieldShape, edges: &[(isize, isize)]) -> f32 {
    let (sum, n) = edges
        .iter()
        .filter_map(|&(col, row)| shape.index_signed(col, row))
        .filter(|&k| !solid[k])
        .fold((0.0f32, 0u32), |(sum, n), k| (sum + data[k], n + 1));

    if n == 0 { 0. } else { sum / n as f32 }
}

/// Semi-Lagrangian advector: every sample traces back one timestep along
/// the current velocity and takes the bilinear interpolation of its own
/// field at the source point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advector {
    /// Timestep of one tick
    pub dt: f32,

    /// Edge length of a cell; back-trace distances are divided by it
    pub cell_size: f32,
}

impl Advector {
    pub fn new(dt: f32, cell_size: f32) -> Self {
        Self { dt, cell_size }
    }

    fn trace(&self, x: f32, y: f32, u: f32, v: f32) -> (f32, f32) {
        let scale = self.dt / self.cell_size;
        (x - scale * u, y - scale * v)
    }

    /// Transport the density field along the current velocity.
    pub fn advect_density(&self, grid: &mut Grid, strategy: &dyn ExecutionStrategy) {
        let Grid {
            vertical,
            horizontal,
            density,
            vertical_solid,
            horizontal_solid,
            ..
        } = grid;

        let velocity = VelocitySampler {
            vertical: vertical.live(),
            horizontal: horizontal.live(),
            vertical_solid,
            horizontal_solid,
            vertical_shape: vertical.shape(),
            horizontal_shape: horizontal.shape(),
        };

        let shape = density.shape();
        let (source, target) = density.split_mut();

        strategy.fill(target, &|k| {
            let (col, row) = shape.coords(k);
            let (c, r) = (col as isize, row as isize);

            let u = velocity.mean_horizontal(&[(c, r), (c + 1, r)]);
            let v = velocity.mean_vertical(&[(c, r), (c, r + 1)]);

            let (x, y) = self.trace(col as f32, row as f32, u, v);
            numeric::bilinear(source, shape, x, y)
        });

        density.swap();
    }

    /// Self-advect both velocity components. Both are sampled from the
    /// pre-advection field, then swapped in together. Solid edges come out
    /// as exactly 0.
    pub fn advect_velocity(&self, grid: &mut Grid, strategy: &dyn ExecutionStrategy) {
        let Grid {
            vertical,
            horizontal,
            vertical_solid,
            horizontal_solid,
            ..
        } = grid;

        let vertical_shape = vertical.shape();
        let horizontal_shape = horizontal.shape();
        let (vertical_live, vertical_target) = vertical.split_mut();
        let (horizontal_live, horizontal_target) = horizontal.split_mut();

        let velocity = VelocitySampler {
            vertical: vertical_live,
            horizontal: horizontal_live,
            vertical_solid,
            horizontal_solid,
            vertical_shape,
            horizontal_shape,
        };

        // vertical samples sit on horizontal edges: the cells below and above
        // contribute two horizontal faces each
        strategy.fill(vertical_target, &|k| {
            if velocity.vertical_solid[k] {
                return 0.;
            }
            let (col, row) = vertical_shape.coords(k);
            let (c, r) = (col as isize, row as isize);

            let u = velocity.mean_horizontal(&[(c, r - 1), (c + 1, r - 1), (c, r), (c + 1, r)]);
            let v = velocity.vertical[k];

            let (x, y) = self.trace(col as f32, row as f32, u, v);
            numeric::bilinear(velocity.vertical, vertical_shape, x, y)
        });

        // horizontal samples sit on vertical edges: the cells left and right
        // contribute two vertical faces each
        strategy.fill(horizontal_target, &|k| {
            if velocity.horizontal_solid[k] {
                return 0.;
            }
            let (col, row) = horizontal_shape.coords(k);
            let (c, r) = (col as isize, row as isize);

            let u = velocity.horizontal[k];
            let v = velocity.mean_vertical(&[(c - 1, r), (c - 1, r + 1), (c, r), (c, r + 1)]);

            let (x, y) = self.trace(col as f32, row as f32, u, v);
            numeric::bilinear(velocity.horizontal, horizontal_shape, x, y)
        });

        vertical.swap();
        horizontal.swap();
    }
}
