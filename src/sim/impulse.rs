// External perturbations applied between ticks

use serde::{Deserialize, Serialize};

use crate::sim::{
    error::Result,
    grid::{Axis, FieldKind, Grid},
};

/// One discrete perturbation of the grid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Impulse {
    /// Add to the velocity at an edge
    InjectVelocity {
        axis: Axis,
        col: usize,
        row: usize,
        magnitude: f32,
    },

    /// Overwrite the velocity at an edge
    SetVelocity {
        axis: Axis,
        col: usize,
        row: usize,
        value: f32,
    },

    /// Open or close an edge
    SetBoundary {
        axis: Axis,
        col: usize,
        row: usize,
        solid: bool,
    },

    /// Overwrite the density of a cell
    SetDensity { col: usize, row: usize, value: f32 },

    /// Close all four faces of a cell
    CarveObstacle {
        col: usize,
        row: usize,
        clear_density: bool,
    },
}

impl Impulse {
    /// Check the impulse's coordinates against the grid without touching it.
    pub fn validate(&self, grid: &Grid) -> Result<()> {
        let (kind, col, row) = match *self {
            Impulse::InjectVelocity { axis, col, row, .. }
            | Impulse::SetVelocity { axis, col, row, .. }
            | Impulse::SetBoundary { axis, col, row, .. } => (axis.into(), col, row),
            Impulse::SetDensity { col, row, .. } | Impulse::CarveObstacle { col, row, .. } => {
                (FieldKind::Density, col, row)
            }
        };
        grid.checked_index(kind, col, row).map(|_| ())
    }

    pub fn apply(&self, grid: &mut Grid) -> Result<()> {
        match *self {
            Impulse::InjectVelocity {
                axis,
                col,
                row,
                magnitude,
            } => grid.add_velocity(axis, col, row, magnitude),
            Impulse::SetVelocity {
                axis,
                col,
                row,
                value,
            } => grid.set_velocity(axis, col, row, value),
            Impulse::SetBoundary {
                axis,
                col,
                row,
                solid,
            } => grid.set_boundary(axis, col, row, solid),
            Impulse::SetDensity { col, row, value } => grid.set_density(col, row, value),
            Impulse::CarveObstacle {
                col,
                row,
                clear_density,
            } => grid.carve_obstacle(col, row, clear_density),
        }
    }
}

/// Impulses waiting for the next tick, in submission order.
#[derive(Debug, Clone, Default)]
pub struct ImpulseQueue {
    pending: Vec<Impulse>,
}

impl ImpulseQueue {
    /// Validate and enqueue. Rejected impulses leave the queue unchanged.
    pub fn push(&mut self, grid: &Grid, impulse: Impulse) -> Result<()> {
        impulse.validate(grid)?;
        self.pending.push(impulse);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply and clear every pending impulse. Returns the number applied.
    pub fn drain_into(&mut self, grid: &mut Grid) -> Result<usize> {
        let n = self.pending.len();
        for impulse in self.pending.drain(..) {
            impulse.apply(grid)?;
        }
        Ok(n)
    }
}

/// A maintained density and velocity source on a column of cells, re-applied
/// every tick.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Emitter {
    /// Column of the source cells
    pub col: usize,

    /// First source row
    pub row_start: usize,

    /// One past the last source row
    pub row_end: usize,

    /// Density written into each source cell
    pub density: f32,

    /// Horizontal velocity written onto each source cell's left face
    pub velocity: f32,

    /// Open the right wall on the source rows so the inflow can leave
    pub open_outlet: bool,
}

impl Emitter {
    /// Source on the left wall, rows strictly between a third and two thirds
    /// of the height.
    pub fn left_inlet(height: usize, density: f32, velocity: f32) -> Self {
        Emitter {
            col: 0,
            row_start: height / 3 + 1,
            row_end: 2 * height / 3,
            density,
            velocity,
            open_outlet: true,
        }
    }

    fn rows(&self) -> std::ops::Range<usize> {
        self.row_start..self.row_end
    }

    /// Check the source cells and open the inlet (and outlet) faces.
    pub fn install(&self, grid: &mut Grid) -> Result<()> {
        for row in self.rows() {
            grid.checked_index(FieldKind::Density, self.col, row)?;
        }
        for row in self.rows() {
            grid.set_boundary(Axis::Horizontal, self.col, row, false)?;
            if self.open_outlet {
                let outlet = grid.width();
                grid.set_boundary(Axis::Horizontal, outlet, row, false)?;
            }
        }
        Ok(())
    }

    /// Refresh the source cells. Cells that have since become obstacles are
    /// left alone.
    pub fn apply(&self, grid: &mut Grid) -> Result<()> {
        for row in self.rows() {
            if grid.is_obstacle(self.col, row)? {
                continue;
            }
            grid.set_density(self.col, row, self.density)?;
            grid.set_velocity(Axis::Horizontal, self.col, row, self.velocity)?;
        }
        Ok(())
    }
}

/// A velocity injection re-applied at the start of every tick while it is
/// switched on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Source {
    pub axis: Axis,
    pub col: usize,
    pub row: usize,

    /// Added to the edge's velocity each tick
    pub magnitude: f32,
}

impl Source {
    fn same_edge(&self, other: &Source) -> bool {
        (self.axis, self.col, self.row) == (other.axis, other.col, other.row)
    }
}

/// Sustained sources, at most one per edge.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    active: Vec<Source>,
}

impl SourceSet {
    /// Switch a source on, or off if one is already on at that edge.
    /// Returns whether the edge has a source afterwards.
    pub fn toggle(&mut self, grid: &Grid, source: Source) -> Result<bool> {
        grid.checked_index(source.axis.into(), source.col, source.row)?;

        if let Some(pos) = self.active.iter().position(|s| s.same_edge(&source)) {
            self.active.remove(pos);
            return Ok(false);
        }
        self.active.push(source);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn apply(&self, grid: &mut Grid) -> Result<()> {
        for source in &self.active {
            grid.add_velocity(source.axis, source.col, source.row, source.magnitude)?;
        }
        Ok(())
    }
}
