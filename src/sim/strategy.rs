// Pluggable execution of the per-phase kernels

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sim::projection::ProjectionView;

/// Work per phase below which the parallel strategy stays on one thread.
const PAR_MIN_LEN_DEFAULT: usize = 4096;

/// How the advection and projection phases are executed. Every strategy must
/// produce bitwise-identical fields; only timing may differ.
pub trait ExecutionStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Set `out[k] = kernel(k)` for every index. `kernel` only reads state
    /// that is not `out`.
    fn fill(&self, out: &mut [f32], kernel: &(dyn Fn(usize) -> f32 + Sync));

    /// Run one Gauss-Seidel sweep with the same results as a row-major
    /// raster scan.
    fn sweep(&self, view: &mut ProjectionView<'_>);
}

/// Plain single-threaded loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ExecutionStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn fill(&self, out: &mut [f32], kernel: &(dyn Fn(usize) -> f32 + Sync)) {
        for (k, value) in out.iter_mut().enumerate() {
            *value = kernel(k);
        }
    }

    fn sweep(&self, view: &mut ProjectionView<'_>) {
        raster_sweep(view);
    }
}

/// Data-parallel execution on the rayon thread pool.
///
/// Advection samples are independent, so scratch buffers are filled with
/// `par_iter_mut`. A projection sweep walks the anti-diagonals
/// `col + row = k` in order: cells on one diagonal share no edge, and the
/// edges they read were last written by earlier diagonals exactly as in the
/// raster scan, so each diagonal's corrections are computed in parallel and
/// then applied.
#[derive(Debug, Clone, Copy)]
pub struct Parallel {
    /// Fields smaller than this run on the calling thread
    pub min_len: usize,
}

impl Default for Parallel {
    fn default() -> Self {
        Self {
            min_len: PAR_MIN_LEN_DEFAULT,
        }
    }
}

impl ExecutionStrategy for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn fill(&self, out: &mut [f32], kernel: &(dyn Fn(usize) -> f32 + Sync)) {
        if out.len() < self.min_len {
            return Sequential.fill(out, kernel);
        }

        out.par_iter_mut()
            .enumerate()
            .for_each(|(k, value)| *value = kernel(k));
    }

    fn sweep(&self, view: &mut ProjectionView<'_>) {
        let (width, height) = (view.width(), view.height());
        if width * height < self.min_len {
            return raster_sweep(view);
        }

        let mut corrections: Vec<(usize, Option<f32>)> = Vec::with_capacity(width.min(height));

        for k in 0..(width + height - 1) {
            let first_col = k.saturating_sub(height - 1);
            let last_col = k.min(width - 1);

            {
                let shared: &ProjectionView<'_> = view;
                (first_col..last_col + 1)
                    .into_par_iter()
                    .map(|col| (col, shared.correction(col, k - col)))
                    .collect_into_vec(&mut corrections);
            }

            for &(col, correction) in &corrections {
                if let Some(d) = correction {
                    view.apply(col, k - col, d);
                }
            }
        }
    }
}

fn raster_sweep(view: &mut ProjectionView<'_>) {
    for row in 0..view.height() {
        for col in 0..view.width() {
            if let Some(d) = view.correction(col, row) {
                view.apply(col, row, d);
            }
        }
    }
}

/// Serializable choice of execution strategy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    #[default]
    Sequential,
    Parallel,
}

impl Execution {
    pub fn strategy(self) -> Box<dyn ExecutionStrategy> {
        match self {
            Execution::Sequential => Box::new(Sequential),
            Execution::Parallel => Box::new(Parallel::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::grid::Grid;

    fn ramp_grid(width: usize, height: usize) -> Grid {
        let mut grid = Grid::new(width, height).unwrap();
        let (vertical, horizontal) = grid.velocity_mut_slices();
        for (k, v) in vertical.iter_mut().enumerate() {
            *v = ((k * 7) % 5) as f32 - 2.;
        }
        for (k, v) in horizontal.iter_mut().enumerate() {
            *v = ((k * 3) % 4) as f32 * 0.5;
        }
        grid.enforce_boundaries();
        grid
    }

    #[test]
    fn test_wavefront_sweep_matches_raster() {
        for (width, height) in [(1, 5), (5, 1), (7, 3), (3, 7), (4, 4)] {
            let mut seq = ramp_grid(width, height);
            let mut par = ramp_grid(width, height);

            for _ in 0..3 {
                Sequential.sweep(&mut ProjectionView::new(&mut seq, 1.7));
                Parallel { min_len: 0 }.sweep(&mut ProjectionView::new(&mut par, 1.7));
            }

            assert_eq!(seq.vertical(), par.vertical(), "{width}x{height}");
            assert_eq!(seq.horizontal(), par.horizontal(), "{width}x{height}");
        }
    }

    #[test]
    fn test_fill_matches() {
        let kernel = |k: usize| (k as f32).sqrt() * 0.5;

        let mut seq = vec![0.; 5000];
        let mut par = vec![0.; 5000];
        Sequential.fill(&mut seq, &kernel);
        Parallel { min_len: 0 }.fill(&mut par, &kernel);

        assert_eq!(seq, par);
        assert_eq!(seq[16], 2.);
    }

    #[test]
    fn test_execution_names() {
        assert_eq!(Execution::Sequential.strategy().name(), "sequential");
        assert_eq!(Execution::Parallel.strategy().name(), "parallel");

        let parsed: Execution = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(parsed, Execution::Parallel);
    }
}
