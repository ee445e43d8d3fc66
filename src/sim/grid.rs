// Staggered (MAC) grid storage

use std::{fmt, mem};

use crate::sim::error::{Result, SimError};

/// The velocity component an edge sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Axis {
    /// Velocity along the rows, stored on horizontal edges
    Vertical,
    /// Velocity along the columns, stored on vertical edges
    Horizontal,
}

/// The three field shapes held by the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Vertical,
    Horizontal,
    Density,
}

impl From<Axis> for FieldKind {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Vertical => FieldKind::Vertical,
            Axis::Horizontal => FieldKind::Horizontal,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Vertical => "vertical velocity",
            FieldKind::Horizontal => "horizontal velocity",
            FieldKind::Density => "density",
        };
        f.write_str(name)
    }
}

/// Column/row extent of one field, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShape {
    pub cols: usize,
    pub rows: usize,
}

impl FieldShape {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Linear offset of `(col, row)`, or `None` when outside the field.
    pub fn index(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.cols && row < self.rows).then(|| col + row * self.cols)
    }

    /// Linear offset of a signed coordinate, or `None` when outside the field.
    pub fn index_signed(&self, col: isize, row: isize) -> Option<usize> {
        if col < 0 || row < 0 {
            return None;
        }
        self.index(col as usize, row as usize)
    }

    /// `(col, row)` of a linear offset.
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.cols, index / self.cols)
    }

    /// Clamp a sampling position into `[0, cols-1] x [0, rows-1]`.
    pub fn clamp_position(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(0., (self.cols - 1) as f32),
            y.clamp(0., (self.rows - 1) as f32),
        )
    }
}

/// A live buffer plus a same-shape scratch buffer. Phases write the scratch
/// buffer and then exchange the two.
#[derive(Debug, Clone)]
pub struct BufferedField {
    shape: FieldShape,
    live: Vec<f32>,
    scratch: Vec<f32>,
}

impl BufferedField {
    pub fn zeros(shape: FieldShape) -> Self {
        Self {
            shape,
            live: vec![0.; shape.len()],
            scratch: vec![0.; shape.len()],
        }
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    pub fn live(&self) -> &[f32] {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut [f32] {
        &mut self.live
    }

    /// Borrow the live buffer for reading and the scratch buffer for writing.
    pub fn split_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.live, &mut self.scratch)
    }

    /// Promote the scratch buffer to live.
    pub fn swap(&mut self) {
        mem::swap(&mut self.live, &mut self.scratch);
    }
}

/// Linear offsets of the four edges bordering a cell. `bottom`/`top` index
/// the vertical field, `left`/`right` the horizontal field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFaces {
    pub bottom: usize,
    pub top: usize,
    pub left: usize,
    pub right: usize,
}

/// Velocity, boundary and density storage of a `width` x `height` MAC grid.
///
/// Vertical velocity lives on the `width * (height + 1)` horizontal edges,
/// horizontal velocity on the `(width + 1) * height` vertical edges and
/// density at the `width * height` cell centres. All three are row-major.
#[derive(Debug, Clone)]
pub struct Grid {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) vertical: BufferedField,
    pub(crate) horizontal: BufferedField,
    pub(crate) density: BufferedField,
    pub(crate) vertical_solid: Vec<bool>,
    pub(crate) horizontal_solid: Vec<bool>,
}

impl Grid {
    /// Allocate a zeroed grid walled in on all four sides.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SimError::InvalidDimensions { width, height });
        }

        let vertical_shape = FieldShape::new(width, height + 1);
        let horizontal_shape = FieldShape::new(width + 1, height);

        // top & bottom walls
        let vertical_solid = (0..vertical_shape.len())
            .map(|k| {
                let (_, row) = vertical_shape.coords(k);
                row == 0 || row == height
            })
            .collect();

        // left & right walls
        let horizontal_solid = (0..horizontal_shape.len())
            .map(|k| {
                let (col, _) = horizontal_shape.coords(k);
                col == 0 || col == width
            })
            .collect();

        Ok(Grid {
            width,
            height,
            vertical: BufferedField::zeros(vertical_shape),
            horizontal: BufferedField::zeros(horizontal_shape),
            density: BufferedField::zeros(FieldShape::new(width, height)),
            vertical_solid,
            horizontal_solid,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self, kind: FieldKind) -> FieldShape {
        match kind {
            FieldKind::Vertical => self.vertical.shape(),
            FieldKind::Horizontal => self.horizontal.shape(),
            FieldKind::Density => self.density.shape(),
        }
    }

    /// Linear offset into the given field, or `OutOfBounds`.
    pub fn checked_index(&self, kind: FieldKind, col: usize, row: usize) -> Result<usize> {
        self.shape(kind)
            .index(col, row)
            .ok_or(SimError::OutOfBounds {
                field: kind,
                col,
                row,
            })
    }

    fn velocity(&self, axis: Axis) -> &BufferedField {
        match axis {
            Axis::Vertical => &self.vertical,
            Axis::Horizontal => &self.horizontal,
        }
    }

    fn velocity_mut(&mut self, axis: Axis) -> &mut BufferedField {
        match axis {
            Axis::Vertical => &mut self.vertical,
            Axis::Horizontal => &mut self.horizontal,
        }
    }

    fn solid_mut(&mut self, axis: Axis) -> &mut Vec<bool> {
        match axis {
            Axis::Vertical => &mut self.vertical_solid,
            Axis::Horizontal => &mut self.horizontal_solid,
        }
    }

    pub fn velocity_at(&self, axis: Axis, col: usize, row: usize) -> Result<f32> {
        let k = self.checked_index(axis.into(), col, row)?;
        Ok(self.velocity(axis).live()[k])
    }

    pub fn set_velocity(&mut self, axis: Axis, col: usize, row: usize, value: f32) -> Result<()> {
        let k = self.checked_index(axis.into(), col, row)?;
        self.velocity_mut(axis).live_mut()[k] = value;
        Ok(())
    }

    /// Add `magnitude` to the velocity component at an edge. Solid edges are
    /// not protected.
    pub fn add_velocity(&mut self, axis: Axis, col: usize, row: usize, magnitude: f32) -> Result<()> {
        let k = self.checked_index(axis.into(), col, row)?;
        self.velocity_mut(axis).live_mut()[k] += magnitude;
        Ok(())
    }

    pub fn density_at(&self, col: usize, row: usize) -> Result<f32> {
        let k = self.checked_index(FieldKind::Density, col, row)?;
        Ok(self.density.live()[k])
    }

    pub fn set_density(&mut self, col: usize, row: usize, value: f32) -> Result<()> {
        let k = self.checked_index(FieldKind::Density, col, row)?;
        self.density.live_mut()[k] = value;
        Ok(())
    }

    pub fn is_boundary(&self, axis: Axis, col: usize, row: usize) -> Result<bool> {
        let k = self.checked_index(axis.into(), col, row)?;
        Ok(self.solid(axis)[k])
    }

    /// Reclassify an edge. Edges marked solid have their velocity zeroed.
    pub fn set_boundary(&mut self, axis: Axis, col: usize, row: usize, solid: bool) -> Result<()> {
        let k = self.checked_index(axis.into(), col, row)?;
        self.solid_mut(axis)[k] = solid;
        if solid {
            self.velocity_mut(axis).live_mut()[k] = 0.;
        }
        Ok(())
    }

    /// Turn a cell into a solid obstacle: all four faces become boundaries
    /// with zero velocity, and the density is optionally cleared.
    pub fn carve_obstacle(&mut self, col: usize, row: usize, clear_density: bool) -> Result<()> {
        let faces = self.cell_faces(col, row)?;

        for k in [faces.bottom, faces.top] {
            self.vertical_solid[k] = true;
            self.vertical.live_mut()[k] = 0.;
        }
        for k in [faces.left, faces.right] {
            self.horizontal_solid[k] = true;
            self.horizontal.live_mut()[k] = 0.;
        }
        if clear_density {
            self.density.live_mut()[col + row * self.width] = 0.;
        }

        Ok(())
    }

    /// Zero the velocity on every boundary edge.
    pub fn enforce_boundaries(&mut self) {
        for (v, solid) in self.vertical.live_mut().iter_mut().zip(&self.vertical_solid) {
            if *solid {
                *v = 0.;
            }
        }
        for (h, solid) in self
            .horizontal
            .live_mut()
            .iter_mut()
            .zip(&self.horizontal_solid)
        {
            if *solid {
                *h = 0.;
            }
        }
    }

    /// Edge offsets bordering cell `(col, row)`.
    pub fn cell_faces(&self, col: usize, row: usize) -> Result<CellFaces> {
        self.checked_index(FieldKind::Density, col, row)?;
        Ok(faces_of(self.width, col, row))
    }

    pub fn vertical(&self) -> &[f32] {
        self.vertical.live()
    }

    pub fn horizontal(&self) -> &[f32] {
        self.horizontal.live()
    }

    pub fn density(&self) -> &[f32] {
        self.density.live()
    }

    /// Boundary flags parallel to the given velocity field.
    pub fn solid(&self, axis: Axis) -> &[bool] {
        match axis {
            Axis::Vertical => &self.vertical_solid,
            Axis::Horizontal => &self.horizontal_solid,
        }
    }

    /// Whether all four faces of a cell are boundaries.
    pub fn is_obstacle(&self, col: usize, row: usize) -> Result<bool> {
        let f = self.cell_faces(col, row)?;
        Ok(self.enclosed(&f))
    }

    /// Per-cell [`Grid::is_obstacle`], row-major.
    pub fn obstacle_mask(&self) -> Vec<bool> {
        (0..self.width * self.height)
            .map(|k| self.enclosed(&faces_of(self.width, k % self.width, k / self.width)))
            .collect()
    }

    fn enclosed(&self, f: &CellFaces) -> bool {
        self.vertical_solid[f.bottom]
            && self.vertical_solid[f.top]
            && self.horizontal_solid[f.left]
            && self.horizontal_solid[f.right]
    }

    pub(crate) fn velocity_mut_slices(&mut self) -> (&mut [f32], &mut [f32]) {
        (self.vertical.live_mut(), self.horizontal.live_mut())
    }
}

/// Edge offsets of cell `(col, row)` on a grid `width` cells wide.
pub(crate) fn faces_of(width: usize, col: usize, row: usize) -> CellFaces {
    CellFaces {
        bottom: col + row * width,
        top: col + (row + 1) * width,
        left: col + row * (width + 1),
        right: col + 1 + row * (width + 1),
    }
}
