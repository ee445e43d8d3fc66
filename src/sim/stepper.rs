// Fixed-timestep orchestration of one simulation tick

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::sim::{
    advect::Advector,
    config::SimConfig,
    error::{Result, SimError},
    grid::{Axis, Grid},
    impulse::{Emitter, Impulse, ImpulseQueue, Source, SourceSet},
    numeric,
    projection::{DivergenceSolver, ProjectionReport},
    snapshot::FieldSnapshot,
    strategy::ExecutionStrategy,
};

/// Field contents at tick 0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InitialCondition {
    /// Number of leftmost columns seeded with density on the middle third of
    /// the rows
    pub seed_columns: usize,

    /// Density written into the seeded cells
    pub rest_density: f32,

    /// Amplitude of uniform random noise on every open edge, if any
    pub random_velocity: Option<f32>,

    /// RNG seed for the velocity noise
    pub seed: u64,
}

impl Default for InitialCondition {
    fn default() -> Self {
        Self {
            seed_columns: 3,
            rest_density: 1.,
            random_velocity: None,
            seed: 0,
        }
    }
}

impl InitialCondition {
    /// Zero velocity and no density.
    pub fn empty() -> Self {
        Self {
            seed_columns: 0,
            ..Self::default()
        }
    }

    pub fn apply(&self, grid: &mut Grid) -> Result<()> {
        let (width, height) = (grid.width(), grid.height());

        for row in (height / 3 + 1)..(2 * height / 3) {
            for col in 0..self.seed_columns.min(width) {
                grid.set_density(col, row, self.rest_density)?;
            }
        }

        if let Some(amplitude) = self.random_velocity.filter(|a| *a > 0.) {
            let mut rng = StdRng::seed_from_u64(self.seed);
            for axis in [Axis::Vertical, Axis::Horizontal] {
                let shape = grid.shape(axis.into());
                for k in 0..shape.len() {
                    let (col, row) = shape.coords(k);
                    grid.set_velocity(axis, col, row, rng.random_range(-amplitude..amplitude))?;
                }
            }
            grid.enforce_boundaries();
        }

        Ok(())
    }
}

/// Owns the grid and advances it one fixed `dt` per [`Stepper::step`].
///
/// A tick runs, in order: queued impulses and the emitter, density
/// advection, velocity advection, projection, and publication of a new
/// [`FieldSnapshot`]. Each phase finishes before the next starts.
#[derive(Debug)]
pub struct Stepper {
    config: SimConfig,
    grid: Grid,
    advector: Advector,
    solver: DivergenceSolver,
    strategy: Box<dyn ExecutionStrategy>,
    impulses: ImpulseQueue,
    emitter: Option<Emitter>,
    sources: SourceSet,
    tick: u64,
    snapshot: Arc<FieldSnapshot>,
    last_projection: Option<ProjectionReport>,
    /// First error a tick returned; every later tick returns it again
    failure: Option<SimError>,
}

impl Stepper {
    /// Create a stepper over a zeroed grid.
    pub fn new(config: SimConfig, strategy: Box<dyn ExecutionStrategy>) -> Result<Self> {
        Self::with_initial_condition(config, &InitialCondition::empty(), strategy)
    }

    pub fn with_initial_condition(
        config: SimConfig,
        initial: &InitialCondition,
        strategy: Box<dyn ExecutionStrategy>,
    ) -> Result<Self> {
        config.validate()?;

        let mut grid = Grid::new(config.width, config.height)?;
        initial.apply(&mut grid)?;

        let snapshot = Arc::new(FieldSnapshot::capture(&grid, 0, 0.));

        Ok(Stepper {
            advector: Advector::new(config.dt, config.cell_size),
            solver: DivergenceSolver::new(config.over_relaxation, config.div_iter),
            config,
            grid,
            strategy,
            impulses: ImpulseQueue::default(),
            emitter: None,
            sources: SourceSet::default(),
            tick: 0,
            snapshot,
            last_projection: None,
            failure: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The grid between ticks.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time(&self) -> f32 {
        self.tick as f32 * self.config.dt
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<FieldSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn last_projection(&self) -> Option<ProjectionReport> {
        self.last_projection
    }

    pub fn pending_impulses(&self) -> usize {
        self.impulses.len()
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// The error that stopped the simulation, if any.
    pub fn failure(&self) -> Option<&SimError> {
        self.failure.as_ref()
    }

    /// Queue an impulse for the next tick, rejecting it if it is out of range.
    pub fn submit(&mut self, impulse: Impulse) -> Result<()> {
        self.impulses.push(&self.grid, impulse)
    }

    /// Add `magnitude` to a velocity component before the next tick.
    pub fn inject_velocity(&mut self, col: usize, row: usize, axis: Axis, magnitude: f32) -> Result<()> {
        self.submit(Impulse::InjectVelocity {
            axis,
            col,
            row,
            magnitude,
        })
    }

    pub fn set_velocity(&mut self, col: usize, row: usize, axis: Axis, value: f32) -> Result<()> {
        self.submit(Impulse::SetVelocity {
            axis,
            col,
            row,
            value,
        })
    }

    pub fn set_boundary(&mut self, axis: Axis, col: usize, row: usize, solid: bool) -> Result<()> {
        self.submit(Impulse::SetBoundary {
            axis,
            col,
            row,
            solid,
        })
    }

    pub fn set_density(&mut self, col: usize, row: usize, value: f32) -> Result<()> {
        self.submit(Impulse::SetDensity { col, row, value })
    }

    pub fn carve_obstacle(&mut self, col: usize, row: usize, clear_density: bool) -> Result<()> {
        self.submit(Impulse::CarveObstacle {
            col,
            row,
            clear_density,
        })
    }

    /// Open the emitter's faces now and refresh its cells every tick.
    pub fn install_emitter(&mut self, emitter: Emitter) -> Result<()> {
        emitter.install(&mut self.grid)?;
        self.emitter = Some(emitter);
        Ok(())
    }

    /// Switch a sustained source on an edge on or off. While on, `magnitude`
    /// is added to the edge at the start of every tick. Returns whether the
    /// edge has a source afterwards.
    pub fn toggle_source(
        &mut self,
        col: usize,
        row: usize,
        axis: Axis,
        magnitude: f32,
    ) -> Result<bool> {
        self.sources.toggle(
            &self.grid,
            Source {
                axis,
                col,
                row,
                magnitude,
            },
        )
    }

    /// Advance the simulation by one `dt`.
    ///
    /// Once a tick has failed the grid stays as that tick left it, and every
    /// further call returns the same error without touching it.
    pub fn step(&mut self) -> Result<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let result = self.advance();
        if let Err(err) = &result {
            self.failure = Some(err.clone());
        }
        result
    }

    fn advance(&mut self) -> Result<()> {
        let applied = self.impulses.drain_into(&mut self.grid)?;
        if let Some(emitter) = &self.emitter {
            emitter.apply(&mut self.grid)?;
        }
        self.sources.apply(&mut self.grid)?;

        self.advector
            .advect_density(&mut self.grid, self.strategy.as_ref());
        self.advector
            .advect_velocity(&mut self.grid, self.strategy.as_ref());

        let report = self.solver.solve(&mut self.grid, self.strategy.as_ref());
        self.last_projection = Some(report);

        let max_velocity =
            numeric::max_abs(self.grid.vertical()).max(numeric::max_abs(self.grid.horizontal()));
        if !(max_velocity <= self.config.max_velocity) {
            return Err(SimError::Unstable { max_velocity });
        }

        self.tick += 1;
        self.snapshot = Arc::new(FieldSnapshot::capture(&self.grid, self.tick, self.time()));

        debug!(
            tick = self.tick,
            impulses = applied,
            residual = report.residual,
            max_velocity,
            "tick complete"
        );

        Ok(())
    }
}

impl Iterator for Stepper {
    type Item = Arc<FieldSnapshot>;

    /// Step once and yield the new snapshot. Ends after the first failed
    /// tick.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failure.is_some() {
            return None;
        }

        match self.step() {
            Ok(()) => Some(self.snapshot()),
            Err(err) => {
                error!("Tick {} failed: {err}", self.tick + 1);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::strategy::{Parallel, Sequential};

    fn stepper(config: SimConfig, initial: &InitialCondition) -> Stepper {
        Stepper::with_initial_condition(config, initial, Box::new(Sequential)).unwrap()
    }

    fn solid_edges_are_zero(grid: &Grid) -> bool {
        let vertical = grid
            .vertical()
            .iter()
            .zip(grid.solid(Axis::Vertical))
            .all(|(v, solid)| !*solid || *v == 0.);
        let horizontal = grid
            .horizontal()
            .iter()
            .zip(grid.solid(Axis::Horizontal))
            .all(|(h, solid)| !*solid || *h == 0.);
        vertical && horizontal
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Stepper::new(SimConfig::with_size(0, 5), Box::new(Sequential)).unwrap_err();
        assert_eq!(
            err,
            SimError::InvalidDimensions {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn test_default_initial_condition() {
        let sim = stepper(SimConfig::default(), &InitialCondition::default());
        let snapshot = sim.snapshot();

        // rows 4 and 5 of a 10-row grid, three leftmost columns
        for row in 0..10 {
            for col in 0..10 {
                let expected = if (4..6).contains(&row) && col < 3 { 1. } else { 0. };
                assert_eq!(snapshot.density[col + row * 10], expected);
            }
        }
        assert_eq!(snapshot.tick, 0);
        assert_eq!(snapshot.max_speed(), 0.);
    }

    #[test]
    fn test_random_initial_velocity_respects_walls() {
        let initial = InitialCondition {
            random_velocity: Some(0.5),
            seed: 42,
            ..InitialCondition::empty()
        };
        let sim = stepper(SimConfig::with_size(6, 5), &initial);

        assert!(solid_edges_are_zero(sim.grid()));
        assert!(sim.snapshot().max_speed() > 0.);
        assert!(sim.snapshot().max_speed() <= 0.5);

        // same seed, same field
        let again = stepper(SimConfig::with_size(6, 5), &initial);
        assert_eq!(sim.snapshot(), again.snapshot());
    }

    #[test]
    fn test_zero_fields_stay_zero() {
        let mut sim = stepper(SimConfig::with_size(8, 6), &InitialCondition::empty());

        for _ in 0..50 {
            sim.step().unwrap();
        }

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.tick, 50);
        assert!(snapshot.density.iter().all(|d| *d == 0.));
        assert!(snapshot.vertical.iter().all(|v| *v == 0.));
        assert!(snapshot.horizontal.iter().all(|h| *h == 0.));
    }

    #[test]
    fn test_out_of_bounds_impulse_rejected() {
        let mut sim = stepper(SimConfig::with_size(4, 4), &InitialCondition::empty());

        assert!(sim.inject_velocity(0, 5, Axis::Vertical, 1.).is_err());
        assert!(sim.set_density(4, 0, 1.).is_err());
        assert!(sim.set_boundary(Axis::Horizontal, 6, 0, true).is_err());
        assert_eq!(sim.pending_impulses(), 0);

        sim.step().unwrap();
        assert!(sim.snapshot().density.iter().all(|d| *d == 0.));
    }

    #[test]
    fn test_impulses_wait_for_step() {
        let mut sim = stepper(SimConfig::with_size(4, 4), &InitialCondition::empty());
        sim.set_density(1, 1, 5.).unwrap();

        assert_eq!(sim.grid().density_at(1, 1).unwrap(), 0.);
        assert_eq!(sim.pending_impulses(), 1);

        sim.step().unwrap();

        assert_eq!(sim.pending_impulses(), 0);
        assert_eq!(sim.snapshot().density[1 + 4], 5.);
    }

    #[test]
    fn test_boundary_invariant_after_step() {
        let initial = InitialCondition {
            random_velocity: Some(1.),
            seed: 9,
            ..InitialCondition::default()
        };
        let mut sim = stepper(SimConfig::with_size(9, 7), &initial);
        sim.carve_obstacle(4, 3, true).unwrap();
        // injections into walls are not blocked, but do not survive a tick
        sim.inject_velocity(0, 2, Axis::Horizontal, 5.).unwrap();
        sim.inject_velocity(3, 7, Axis::Vertical, -5.).unwrap();

        for _ in 0..10 {
            sim.step().unwrap();
            assert!(solid_edges_are_zero(sim.grid()));
        }
    }

    #[test]
    fn test_projection_runs_each_tick() {
        let initial = InitialCondition {
            random_velocity: Some(1.),
            seed: 3,
            ..InitialCondition::empty()
        };
        let config = SimConfig {
            div_iter: 500,
            ..SimConfig::with_size(8, 8)
        };
        let mut sim = stepper(config, &initial);
        assert_eq!(sim.last_projection(), None);

        sim.step().unwrap();

        let report = sim.last_projection().unwrap();
        assert_eq!(report.sweeps, 500);
        assert_eq!(report.degenerate_cells, 0);
        assert!(report.residual < 1e-3);
        let div = sim.snapshot().divergence();
        assert!(numeric::max_abs(div.as_slice()) < 1e-3);
    }

    #[test]
    fn test_enclosed_single_cell() {
        let mut sim = stepper(SimConfig::with_size(1, 1), &InitialCondition::empty());
        sim.inject_velocity(0, 1, Axis::Vertical, 3.).unwrap();

        sim.step().unwrap();

        assert_eq!(sim.last_projection().unwrap().degenerate_cells, 1);
        assert_eq!(sim.snapshot().max_speed(), 0.);
    }

    #[test]
    fn test_impulse_drives_density_right() {
        let config = SimConfig {
            dt: 0.005,
            ..SimConfig::with_size(10, 10)
        };
        let initial = InitialCondition {
            seed_columns: 1,
            ..InitialCondition::default()
        };
        let mut sim = stepper(config, &initial);

        let (x0, _) = sim.snapshot().density_centroid().unwrap();
        assert_eq!(x0, 0.);

        // the inlet side of the left-centre cell
        sim.inject_velocity(1, 5, Axis::Horizontal, 5.).unwrap();

        for _ in 0..200 {
            sim.step().unwrap();
        }

        let snapshot = sim.snapshot();
        let (x1, _) = snapshot.density_centroid().unwrap();
        assert!(x1 > x0, "centroid did not move right: {x1}");
        assert!(snapshot.density[1 + 5 * 10] > 0.);
        assert!(snapshot.density.iter().all(|d| d.is_finite() && *d >= 0.));
    }

    #[test]
    fn test_density_never_drifts_left_of_seed() {
        let (width, height) = (10, 10);
        let config = SimConfig {
            dt: 0.005,
            ..SimConfig::with_size(width, height)
        };
        let mut sim = stepper(config, &InitialCondition::empty());

        for row in 4..6 {
            sim.set_density(3, row, 1.).unwrap();
        }
        // open both side walls and push +5 through every vertical edge
        for row in 0..height {
            sim.set_boundary(Axis::Horizontal, 0, row, false).unwrap();
            sim.set_boundary(Axis::Horizontal, width, row, false).unwrap();
            for col in 0..=width {
                sim.inject_velocity(col, row, Axis::Horizontal, 5.).unwrap();
            }
        }

        for _ in 0..200 {
            sim.step().unwrap();

            let snapshot = sim.snapshot();
            for row in 0..height {
                for col in 0..3 {
                    assert_eq!(
                        snapshot.density[col + row * width],
                        0.,
                        "density at ({col}, {row}) on tick {}",
                        snapshot.tick
                    );
                }
            }
        }

        let snapshot = sim.snapshot();
        let (x, _) = snapshot.density_centroid().unwrap();
        assert!(x > 5., "centroid did not move right: {x}");
        assert!(snapshot.density.iter().all(|d| d.is_finite() && *d >= 0.));
    }

    #[test]
    fn test_source_accumulates_while_on() {
        let config = SimConfig {
            dt: 1e-6,
            div_iter: 0,
            ..SimConfig::with_size(6, 6)
        };
        let mut sim = stepper(config, &InitialCondition::empty());

        assert_eq!(sim.toggle_source(3, 3, Axis::Horizontal, 5.), Ok(true));
        assert_eq!(sim.active_sources(), 1);

        let mut readings = Vec::new();
        for _ in 0..3 {
            sim.step().unwrap();
            readings.push(sim.grid().velocity_at(Axis::Horizontal, 3, 3).unwrap());
        }
        for (reading, expected) in readings.iter().zip([5., 10., 15.]) {
            assert!((reading - expected).abs() < 1e-2, "{reading} != {expected}");
        }

        assert_eq!(sim.toggle_source(3, 3, Axis::Horizontal, 5.), Ok(false));
        sim.step().unwrap();
        let after = sim.grid().velocity_at(Axis::Horizontal, 3, 3).unwrap();
        assert!((after - readings[2]).abs() < 1e-2);

        assert!(sim.toggle_source(0, 7, Axis::Vertical, 5.).is_err());
        assert_eq!(sim.active_sources(), 0);
    }

    #[test]
    fn test_emitter_through_flow() {
        let config = SimConfig::with_size(12, 12);
        let mut sim = stepper(config, &InitialCondition::empty());
        sim.install_emitter(Emitter::left_inlet(12, 100., 15.)).unwrap();

        for _ in 0..100 {
            sim.step().unwrap();
        }

        let snapshot = sim.snapshot();
        // source rows 5..8
        assert!((snapshot.density[6 * 12] - 100.).abs() < 1e-3);
        assert!(snapshot.density[3 + 6 * 12] > 0.);
        assert!(snapshot.density.iter().all(|d| d.is_finite() && *d >= 0.));
        assert!(snapshot.horizontal[1 + 6 * 13] > 0.);
    }

    #[test]
    fn test_unstable_tick_is_not_published() {
        let config = SimConfig {
            max_velocity: 1.,
            ..SimConfig::with_size(5, 5)
        };
        let mut sim = stepper(config, &InitialCondition::empty());
        sim.set_velocity(2, 2, Axis::Horizontal, 50.).unwrap();

        assert!(matches!(sim.step(), Err(SimError::Unstable { .. })));
        assert_eq!(sim.snapshot().tick, 0);
        assert_eq!(sim.next(), None);
    }

    #[test]
    fn test_failed_stepper_stays_frozen() {
        let config = SimConfig {
            max_velocity: 1.,
            ..SimConfig::with_size(5, 5)
        };
        let mut sim = stepper(config, &InitialCondition::default());
        sim.set_velocity(2, 2, Axis::Horizontal, 50.).unwrap();

        let first = sim.step().unwrap_err();
        assert_eq!(sim.failure(), Some(&first));

        let frozen = sim.grid().clone();
        sim.set_density(1, 1, 3.).unwrap();

        for _ in 0..2 {
            assert_eq!(sim.step(), Err(first.clone()));
        }

        assert_eq!(sim.grid().vertical(), frozen.vertical());
        assert_eq!(sim.grid().horizontal(), frozen.horizontal());
        assert_eq!(sim.grid().density(), frozen.density());
        assert_eq!(sim.pending_impulses(), 1);
        assert_eq!(sim.tick(), 0);
    }

    #[test]
    fn test_iterator_yields_snapshots() {
        let mut sim = stepper(SimConfig::default(), &InitialCondition::default());

        let ticks: Vec<u64> = sim.by_ref().take(3).map(|s| s.tick).collect();

        assert_eq!(ticks, vec![1, 2, 3]);
        assert_eq!(sim.tick(), 3);
        assert_eq!(sim.time(), 3. * 0.005);
    }

    #[test]
    fn test_parallel_strategy_matches_sequential() {
        let initial = InitialCondition {
            random_velocity: Some(2.),
            seed: 17,
            ..InitialCondition::default()
        };
        let config = SimConfig::with_size(21, 13);

        let mut seq = stepper(config.clone(), &initial);
        let mut par = Stepper::with_initial_condition(
            config,
            &initial,
            Box::new(Parallel { min_len: 0 }),
        )
        .unwrap();

        for sim in [&mut seq, &mut par] {
            sim.install_emitter(Emitter::left_inlet(13, 50., 10.)).unwrap();
            sim.carve_obstacle(10, 6, true).unwrap();
            sim.inject_velocity(5, 5, Axis::Vertical, 3.).unwrap();
        }

        for _ in 0..15 {
            seq.step().unwrap();
            par.step().unwrap();
        }

        assert_eq!(seq.snapshot(), par.snapshot());
        assert_eq!(par.strategy_name(), "parallel");
    }
}
