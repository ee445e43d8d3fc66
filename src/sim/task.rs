// Task runner for the solver thread

use std::{
    error::Error,
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::{
    observers::imgstream::{self, DisplayPacket},
    preprocessing::{ImageStreamSettings, InterfaceMode, SimulationInput},
    sim::{impulse::Impulse, snapshot::FieldSnapshot, stepper::Stepper},
};

pub struct SimulationOutput {
    /// Ticks that finished before the run ended
    pub ticks_completed: u64,

    /// Maps frame index to simulated time
    pub temporal_map: Vec<f32>,

    /// Frames the observer wrote
    pub frames_written: usize,

    /// Residual divergence after the last projection
    pub final_residual: Option<f32>,

    /// Total density in the last snapshot
    pub total_density: f32,
}

fn progress_bar(ticks: u64) -> ProgressBar {
    let bar = ProgressBar::new(ticks);
    match ProgressStyle::with_template(
        "[Elapsed: {elapsed_precise}] [{bar:40.cyan/blue}] {percent}% (Remaining: {eta_precise})",
    ) {
        Ok(style) => bar.set_style(style.progress_chars("##-")),
        Err(err) => warn!("Invalid progress bar template: {err}"),
    }
    bar
}

/// Build the stepper described by the input: initial fields, obstacle mask,
/// emitter, initial impulses and sustained sources.
pub fn build_stepper(
    simulation_input: &SimulationInput,
) -> Result<Stepper, Box<dyn Error + Send + Sync>> {
    let mut sim = Stepper::with_initial_condition(
        simulation_input.config.clone(),
        &simulation_input.initial,
        simulation_input.execution.strategy(),
    )?;

    if let Some(mask) = &simulation_input.mask {
        for (col, row) in mask.obstacle_cells() {
            sim.submit(Impulse::CarveObstacle {
                col,
                row,
                clear_density: true,
            })?;
        }
    }

    if let Some(emitter) = simulation_input.emitter {
        sim.install_emitter(emitter)?;
    }

    for impulse in &simulation_input.impulses {
        sim.submit(*impulse)?;
    }

    for source in &simulation_input.sources {
        sim.toggle_source(source.col, source.row, source.axis, source.magnitude)?;
    }

    Ok(sim)
}

/// Step `ticks` times, handing each snapshot to `observe`.
fn run_loop(
    mut sim: Stepper,
    simulation_input: &SimulationInput,
    mut observe: impl FnMut(u64, &Arc<FieldSnapshot>),
) -> Result<SimulationOutput, Box<dyn Error + Send + Sync>> {
    let bar = progress_bar(simulation_input.ticks);
    let interval = simulation_input
        .tick_interval
        .filter(|s| *s > 0.)
        .map(Duration::from_secs_f32);

    info!(
        "Running {} ticks with the {} strategy",
        simulation_input.ticks,
        sim.strategy_name()
    );

    let mut temporal_map: Vec<f32> = Vec::new();
    for _ in 0..simulation_input.ticks {
        let started = Instant::now();

        if let Err(err) = sim.step() {
            bar.abandon();
            return Err(err.into());
        }

        let snapshot = sim.snapshot();
        observe(snapshot.tick, &snapshot);
        temporal_map.push(snapshot.time);
        bar.inc(1);

        if let Some(interval) = interval {
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }
    bar.finish();

    let snapshot = sim.snapshot();
    Ok(SimulationOutput {
        ticks_completed: sim.tick(),
        temporal_map,
        frames_written: 0,
        final_residual: sim.last_projection().map(|r| r.residual),
        total_density: snapshot.total_density(),
    })
}

/// The solver thread task to run in ImageStream mode
pub fn imgstream_task(
    settings: &ImageStreamSettings,
    sim: Stepper,
    simulation_input: &SimulationInput,
) -> Result<SimulationOutput, Box<dyn Error + Send + Sync>> {
    let (sender, receiver) = mpsc::channel();

    // spawn image io thread
    let frames_dir = settings.frames_dir.clone();
    let max_density = simulation_input.config.max_density;
    let io_thread = thread::spawn(move || {
        imgstream::image_io_loop(receiver, max_density, &frames_dir)
            .map_err(|err| err.to_string())
    });

    let stride = settings.frame_stride.max(1);
    let mut frame = 0;
    let result = run_loop(sim, simulation_input, |tick, snapshot| {
        if tick % stride != 0 {
            return;
        }
        let packet = DisplayPacket {
            snapshot: snapshot.clone(),
            i: frame,
        };
        if sender.send(packet).is_ok() {
            frame += 1;
        }
    });
    drop(sender);

    let frames_written = match io_thread.join() {
        Ok(Ok(n)) => n,
        Ok(Err(err)) => {
            warn!("Image stream failed: {err}");
            0
        }
        Err(_) => {
            warn!("Image stream thread panicked");
            0
        }
    };

    result.map(|mut output| {
        output.frames_written = frames_written;
        output
    })
}

/// Spawns the simulation thread and starts the corresponding task
pub fn spawn_sim_thread(
    simulation_input: SimulationInput,
) -> JoinHandle<Result<SimulationOutput, Box<dyn Error + Send + Sync>>> {
    thread::spawn(move || {
        let sim = build_stepper(&simulation_input)?;

        match &simulation_input.mode {
            InterfaceMode::ImageStream(settings) => {
                imgstream_task(settings, sim, &simulation_input)
            }
            InterfaceMode::Headless => run_loop(sim, &simulation_input, |_, _| {}),
        }
    })
}
