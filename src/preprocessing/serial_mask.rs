use na::DMatrix;
use serde::{Deserialize, Serialize};

/// JSON-friendly obstacle mask. Matrix row `r` is grid row `r` (bottom row
/// first); `true`/`1` marks a solid cell.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SerialMask {
    data: Vec<u8>,
    nrows: usize,
    ncols: usize,
}

impl SerialMask {
    pub fn from_mask(mask: &DMatrix<bool>) -> Self {
        let (nrows, ncols) = mask.shape();

        Self {
            data: mask.iter().map(|b| *b as u8).collect(),
            nrows,
            ncols,
        }
    }

    pub fn to_mask(&self) -> DMatrix<bool> {
        DMatrix::from_iterator(self.nrows, self.ncols, self.data.iter().map(|b| *b != 0))
    }

    /// Grid `(width, height)` covered by the mask
    pub fn size(&self) -> (usize, usize) {
        (self.ncols, self.nrows)
    }

    /// `(col, row)` of every solid cell, bottom row first.
    pub fn obstacle_cells(&self) -> Vec<(usize, usize)> {
        let mask = self.to_mask();
        (0..self.nrows)
            .flat_map(|row| (0..self.ncols).map(move |col| (col, row)))
            .filter(|&(col, row)| mask[(row, col)])
            .collect()
    }
}
