// Contains post-processers for analyzing simulation results

use crate::{
    preprocessing::{InterfaceMode, SimulationInput},
    sim::task::SimulationOutput,
};
use std::fs;
use tracing::{info, warn};

pub fn postprocess(sim_input: &SimulationInput, sim_output: &SimulationOutput) {
    let elapsed = sim_output.temporal_map.last().copied().unwrap_or(0.);

    info!(
        "Simulation finished:\n\n\
        \t ticks:           {} / {}\n\
        \t simulated time:  {} s\n\
        \t total density:   {}\n\
        \t final residual:  {}\n\
        \t frames written:  {}\n\n\
        ",
        sim_output.ticks_completed,
        sim_input.ticks,
        elapsed,
        sim_output.total_density,
        sim_output
            .final_residual
            .map(|r| r.to_string())
            .unwrap_or_else(|| "n/a".into()),
        sim_output.frames_written,
    );

    if let InterfaceMode::ImageStream(settings) = &sim_input.mode {
        if settings.retain_frames {
            info!("Frames retained in {:?}", settings.frames_dir);
        } else {
            _ = fs::remove_dir_all(&settings.frames_dir)
                .inspect_err(|err| warn!("Unable to cleanup frames output: {:?}", err));
        }
    };
}
