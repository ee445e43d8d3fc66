// Iterative divergence removal (pressure projection)

use tracing::{debug, trace};

use crate::sim::{
    grid::{CellFaces, Grid, faces_of},
    numeric,
    strategy::ExecutionStrategy,
};

/// Mutable access to the live velocity buffers for one projection phase,
/// plus the boundary flags the sweep respects.
pub struct ProjectionView<'a> {
    width: usize,
    height: usize,
    over_relaxation: f32,
    vertical: &'a mut [f32],
    horizontal: &'a mut [f32],
    vertical_solid: &'a [bool],
    horizontal_solid: &'a [bool],
}

/// Which of a cell's faces the sweep may move.
#[derive(Debug, Clone, Copy)]
struct OpenFaces {
    bottom: bool,
    top: bool,
    left: bool,
    right: bool,
}

impl OpenFaces {
    fn count(&self) -> u8 {
        self.bottom as u8 + self.top as u8 + self.left as u8 + self.right as u8
    }
}

impl<'a> ProjectionView<'a> {
    pub fn new(grid: &'a mut Grid, over_relaxation: f32) -> Self {
        let Grid {
            width,
            height,
            vertical,
            horizontal,
            vertical_solid,
            horizontal_solid,
            ..
        } = grid;

        ProjectionView {
            width: *width,
            height: *height,
            over_relaxation,
            vertical: vertical.live_mut(),
            horizontal: horizontal.live_mut(),
            vertical_solid,
            horizontal_solid,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn open_faces(&self, f: &CellFaces) -> OpenFaces {
        OpenFaces {
            bottom: !self.vertical_solid[f.bottom],
            top: !self.vertical_solid[f.top],
            left: !self.horizontal_solid[f.left],
            right: !self.horizontal_solid[f.right],
        }
    }

    /// The over-relaxed per-face correction `ω·div / open` for a cell, or
    /// `None` when every face is solid.
    pub fn correction(&self, col: usize, row: usize) -> Option<f32> {
        let f = faces_of(self.width, col, row);
        let open = self.open_faces(&f).count();
        if open == 0 {
            return None;
        }

        let div = numeric::cell_divergence(self.vertical, self.horizontal, self.width, col, row);
        Some(self.over_relaxation * div / open as f32)
    }

    /// Push a correction into the open faces of a cell: inflow faces gain
    /// `d`, outflow faces lose it.
    pub fn apply(&mut self, col: usize, row: usize, d: f32) {
        let f = faces_of(self.width, col, row);
        let open = self.open_faces(&f);

        if open.bottom {
            self.vertical[f.bottom] += d;
        }
        if open.top {
            self.vertical[f.top] -= d;
        }
        if open.left {
            self.horizontal[f.left] += d;
        }
        if open.right {
            self.horizontal[f.right] -= d;
        }
    }

    /// Cells with no open face.
    pub fn degenerate_cells(&self) -> usize {
        (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| (col, row)))
            .filter(|&(col, row)| {
                let f = faces_of(self.width, col, row);
                self.open_faces(&f).count() == 0
            })
            .count()
    }

    /// Largest |divergence| over cells with at least one open face.
    pub fn residual(&self) -> f32 {
        let mut residual = 0.0f32;
        for row in 0..self.height {
            for col in 0..self.width {
                let f = faces_of(self.width, col, row);
                if self.open_faces(&f).count() == 0 {
                    continue;
                }
                let div =
                    numeric::cell_divergence(self.vertical, self.horizontal, self.width, col, row);
                residual = residual.max(div.abs());
            }
        }
        residual
    }
}

/// Outcome of one projection phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionReport {
    /// Sweeps performed
    pub sweeps: usize,

    /// Fully enclosed cells that were skipped
    pub degenerate_cells: usize,

    /// Max |divergence| over projectable cells after the last sweep
    pub residual: f32,
}

/// Fixed-budget over-relaxed Gauss-Seidel projection.
///
/// Each sweep visits cells in row-major order and pushes the cell's
/// over-relaxed divergence, split evenly, into its open faces. Updates are
/// in place, so later cells see the corrections of earlier ones. Solid faces
/// are never written. The sweep count is fixed; the residual is reported but
/// never used as a stopping criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergenceSolver {
    /// Over-relaxation factor ω, in (0, 2)
    pub over_relaxation: f32,

    /// Sweeps per solve
    pub iterations: usize,
}

impl DivergenceSolver {
    pub fn new(over_relaxation: f32, iterations: usize) -> Self {
        Self {
            over_relaxation,
            iterations,
        }
    }

    pub fn solve(&self, grid: &mut Grid, strategy: &dyn ExecutionStrategy) -> ProjectionReport {
        let mut view = ProjectionView::new(grid, self.over_relaxation);

        let degenerate_cells = view.degenerate_cells();
        if degenerate_cells > 0 {
            debug!(degenerate_cells, "skipping fully enclosed cells during projection");
        }

        for _ in 0..self.iterations {
            strategy.sweep(&mut view);
        }

        let residual = view.residual();
        trace!(sweeps = self.iterations, residual, "projection finished");

        ProjectionReport {
            sweeps: self.iterations,
            degenerate_cells,
            residual,
        }
    }
}
