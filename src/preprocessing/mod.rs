use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    preprocessing::serial_mask::SerialMask,
    sim::{
        config::SimConfig,
        impulse::{Emitter, Impulse, Source},
        stepper::InitialCondition,
        strategy::Execution,
    },
};

pub mod cli;
pub mod preprocessor;
pub mod serial_mask;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageStreamSettings {
    pub frames_dir: PathBuf,
    pub retain_frames: bool,

    /// Write every n-th tick
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u64,
}

fn default_frame_stride() -> u64 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum InterfaceMode {
    /// Density frames written as PNGs by an observer thread
    ImageStream(ImageStreamSettings),

    /// No observer; only the summary is reported
    Headless,
}

/// Everything needed to run a simulation from the command line or a saved
/// JSON file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SimulationInput {
    pub mode: InterfaceMode,

    pub config: SimConfig,

    #[serde(default)]
    pub initial: InitialCondition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter: Option<Emitter>,

    /// Applied before the first tick
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impulses: Vec<Impulse>,

    /// Sustained sources switched on before the first tick
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    /// Solid cells carved before the first tick; must match the grid size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<SerialMask>,

    /// Number of ticks to run
    pub ticks: u64,

    #[serde(default)]
    pub execution: Execution,

    /// Minimum wall-clock seconds per tick, if pacing is wanted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval: Option<f32>,
}

impl SimulationInput {
    /// Check parameters that the solver cannot check on its own.
    pub fn validate(&self) -> Result<(), String> {
        self.config.validate().map_err(|err| err.to_string())?;

        if let Some(mask) = &self.mask {
            let expected = (self.config.width, self.config.height);
            if mask.size() != expected {
                return Err(format!(
                    "Mask is {}x{} but the grid is {}x{}",
                    mask.size().0,
                    mask.size().1,
                    expected.0,
                    expected.1
                ));
            }
        }

        if let InterfaceMode::ImageStream(settings) = &self.mode {
            if settings.frame_stride == 0 {
                return Err("Frame stride must be at least 1".into());
            }
        }

        if let Some(interval) = self.tick_interval {
            if !interval.is_finite() || interval < 0. {
                return Err(format!("Tick interval must be non-negative, got {interval}"));
            }
        }

        Ok(())
    }

    pub fn log(&self) {
        let mode = match &self.mode {
            InterfaceMode::ImageStream(_) => "image stream",
            InterfaceMode::Headless => "headless",
        };

        info!(
            "Simulation is shown below:\n\n\
        \t mode:             {}\n\
        \t grid:             {} x {} cells (size {})\n\
        \t timestep:         {} s\n\
        \t ticks:            {}\n\
        \t over-relaxation:  {}\n\
        \t projection iters: {}\n\
        \t execution:        {:?}\n\
        \t obstacle cells:   {}\n\
        \t emitter:          {}\n\
        \t sources:          {}\n\n\
        ",
            mode,
            self.config.width,
            self.config.height,
            self.config.cell_size,
            self.config.dt,
            self.ticks,
            self.config.over_relaxation,
            self.config.div_iter,
            self.execution,
            self.mask
                .as_ref()
                .map(|m| m.obstacle_cells().len())
                .unwrap_or(0),
            if self.emitter.is_some() { "on" } else { "off" },
            self.sources.len(),
        );

        match serde_json::to_string_pretty(&self.mode) {
            Ok(mode_str) => info!("Mode parameters are:\n\n{}", mode_str),
            Err(err) => warn!("Unable to format mode parameters: {err}"),
        }
    }
}
