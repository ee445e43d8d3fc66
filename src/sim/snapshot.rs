// Published, read-only copies of the grid fields

use na::DMatrix;

use crate::{
    ScalarField, VectorField,
    sim::{grid::Grid, numeric},
};

/// The fields as they stood at the end of a tick. Consumers only ever see
/// these, never the grid being stepped.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    /// Ticks completed when the snapshot was taken
    pub tick: u64,

    /// Simulated time, `tick * dt`
    pub time: f32,

    pub width: usize,
    pub height: usize,

    /// Vertical velocity, `width * (height+1)`, row-major
    pub vertical: Vec<f32>,

    /// Horizontal velocity, `(width+1) * height`, row-major
    pub horizontal: Vec<f32>,

    /// Density, `width * height`, row-major
    pub density: Vec<f32>,

    /// Cells whose four faces are all boundaries, `width * height`, row-major
    pub obstacles: Vec<bool>,
}

impl FieldSnapshot {
    pub(crate) fn capture(grid: &Grid, tick: u64, time: f32) -> Self {
        FieldSnapshot {
            tick,
            time,
            width: grid.width(),
            height: grid.height(),
            vertical: grid.vertical().to_vec(),
            horizontal: grid.horizontal().to_vec(),
            density: grid.density().to_vec(),
            obstacles: grid.obstacle_mask(),
        }
    }

    /// Density as a `height` x `width` matrix; matrix row `r` is grid row `r`.
    pub fn density_matrix(&self) -> ScalarField {
        numeric::to_matrix(&self.density, self.width, self.height)
    }

    /// Obstacle cells as a `height` x `width` matrix, rows as in
    /// [`FieldSnapshot::density_matrix`].
    pub fn obstacle_matrix(&self) -> DMatrix<bool> {
        DMatrix::from_fn(self.height, self.width, |row, col| {
            self.obstacles[col + row * self.width]
        })
    }

    /// Velocity averaged to cell centres, `[horizontal, vertical]`.
    pub fn cell_velocity(&self) -> VectorField {
        numeric::cell_velocity(&self.vertical, &self.horizontal, self.width, self.height)
    }

    pub fn divergence(&self) -> ScalarField {
        numeric::divergence(&self.vertical, &self.horizontal, self.width, self.height)
    }

    pub fn total_density(&self) -> f32 {
        self.density.iter().sum()
    }

    /// Density-weighted mean cell position `(col, row)`, or `None` when the
    /// grid holds no density.
    pub fn density_centroid(&self) -> Option<(f32, f32)> {
        let total = self.total_density();
        if total <= 0. {
            return None;
        }

        let (sx, sy) = self
            .density
            .iter()
            .enumerate()
            .fold((0.0f32, 0.0f32), |(sx, sy), (k, d)| {
                let (col, row) = (k % self.width, k / self.width);
                (sx + d * col as f32, sy + d * row as f32)
            });

        Some((sx / total, sy / total))
    }

    pub fn max_speed(&self) -> f32 {
        numeric::max_abs(&self.vertical).max(numeric::max_abs(&self.horizontal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::grid::Axis;

    #[test]
    fn test_capture_shapes() {
        let mut grid = Grid::new(3, 2).unwrap();
        grid.set_density(2, 1, 4.).unwrap();
        grid.set_velocity(Axis::Horizontal, 3, 0, -2.).unwrap();

        let snapshot = FieldSnapshot::capture(&grid, 7, 0.035);

        assert_eq!(snapshot.vertical.len(), 9);
        assert_eq!(snapshot.horizontal.len(), 8);
        assert_eq!(snapshot.density.len(), 6);
        assert_eq!(snapshot.density_matrix()[(1, 2)], 4.);
        assert_eq!(snapshot.max_speed(), 2.);
        assert_eq!(snapshot.obstacles.len(), 6);
    }

    #[test]
    fn test_obstacles_follow_grid() {
        let mut grid = Grid::new(3, 2).unwrap();
        grid.carve_obstacle(0, 1, false).unwrap();

        let obstacles = FieldSnapshot::capture(&grid, 0, 0.).obstacle_matrix();

        assert_eq!(obstacles.shape(), (2, 3));
        assert!(obstacles[(1, 0)]);
        assert_eq!(obstacles.iter().filter(|b| **b).count(), 1);
    }

    #[test]
    fn test_centroid() {
        let mut grid = Grid::new(4, 2).unwrap();
        assert_eq!(FieldSnapshot::capture(&grid, 0, 0.).density_centroid(), None);

        grid.set_density(1, 0, 1.).unwrap();
        grid.set_density(3, 1, 3.).unwrap();

        let (x, y) = FieldSnapshot::capture(&grid, 0, 0.)
            .density_centroid()
            .unwrap();

        assert_eq!(x, 2.5);
        assert_eq!(y, 0.75);
    }
}
