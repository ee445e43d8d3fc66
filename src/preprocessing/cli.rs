use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    process::exit,
    sync::LazyLock,
};

use clap::{ArgAction, Parser};
use na::DMatrix;
use tracing::{Level, error, info};

use crate::{
    preprocessing::{
        ImageStreamSettings, InterfaceMode, SimulationInput, preprocessor::mask_from_image,
        serial_mask::SerialMask,
    },
    sim::{
        config::SimConfig, impulse::Emitter, stepper::InitialCondition, strategy::Execution,
    },
};

static DEFAULT_FRAMES_PATH: LazyLock<&Path> = LazyLock::new(|| Path::new("sim-frames"));

// Raw, CLI input
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    #[arg(help = "Optional PNG image whose dark pixels become solid cells. Sets the grid size.")]
    mask_path: Option<PathBuf>,

    #[arg(long, help = "An input file with pre-loaded parameters.")]
    input_json: Option<PathBuf>,

    #[arg(long, help = "Optional path to save the resolved input file to.")]
    input_json_savepath: Option<PathBuf>,

    #[arg(
        long,
        help = "The mode to run the simulation in: `frames` or `headless`",
        default_value = "frames"
    )]
    mode: String,

    #[arg(
        long,
        help = "An optional directory pointing to where frames should be saved."
    )]
    frames_dir: Option<PathBuf>,

    #[arg(
        short,
        long,
        help = "Whether or not frames should be retained after the run.",
        default_value = "false"
    )]
    retain_frames: bool,

    #[arg(long, help = "Write a frame every n ticks.", default_value = "1")]
    frame_stride: u64,

    #[arg(long, help = "Grid width in cells. Ignored when a mask is given.", default_value = "10")]
    width: usize,

    #[arg(long, help = "Grid height in cells. Ignored when a mask is given.", default_value = "10")]
    height: usize,

    #[arg(long, help = "Timestep per tick in seconds.", default_value = "0.005")]
    dt: f32,

    #[arg(short, long, help = "Number of ticks to run.", default_value = "1000")]
    ticks: u64,

    #[arg(long, help = "Over-relaxation factor for projection, in (0, 2).", default_value = "1.9")]
    over_relaxation: f32,

    #[arg(long, help = "Projection sweeps per tick.", default_value = "100")]
    div_iter: usize,

    #[arg(long, help = "Density mapped to full brightness in frames.", default_value = "100.0")]
    max_density: f32,

    #[arg(long, help = "Cell edge length.", default_value = "1.0")]
    cell_size: f32,

    #[arg(long, help = "Velocity past which the run is aborted.", default_value = "1000.0")]
    max_velocity: f32,

    #[arg(long, help = "Execution strategy: `sequential` or `parallel`", default_value = "sequential")]
    execution: String,

    #[arg(long, help = "Disable the left-wall inlet.")]
    no_emitter: bool,

    #[arg(long, help = "Horizontal velocity of the inlet.", default_value = "15.0")]
    inlet_velocity: f32,

    #[arg(long, help = "Columns seeded with density at tick 0.", default_value = "3")]
    seed_columns: usize,

    #[arg(long, help = "Density of the seeded cells.", default_value = "1.0")]
    rest_density: f32,

    #[arg(long, help = "Amplitude of random initial velocity.")]
    random_velocity: Option<f32>,

    #[arg(long, help = "Seed for the random initial velocity.", default_value = "0")]
    seed: u64,

    #[arg(long, help = "Minimum wall-clock seconds per tick.")]
    tick_interval: Option<f32>,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv).")]
    verbose: u8,
}

impl CliArgs {
    /// Max log level for the requested verbosity
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn input_json_savepath(&self) -> Option<&Path> {
        self.input_json_savepath.as_deref()
    }

    fn load_mask(&self) -> Option<SerialMask> {
        let mask_path = self.mask_path.as_ref()?;
        let mask: DMatrix<bool> = mask_from_image(mask_path).unwrap_or_else(|err| {
            error!("Failed to load mask {:?}: {}", mask_path, err);
            exit(1);
        });
        Some(SerialMask::from_mask(&mask))
    }

    fn load_input_file(&self, input_filepath: &Path) -> SimulationInput {
        if !input_filepath.exists() {
            error!("Input file {:?} does not exist.", input_filepath);
            exit(1);
        }
        if input_filepath.is_dir() {
            error!("Input file {:?} is a directory.", input_filepath);
            exit(1);
        }

        info!(
            "Using input file {}",
            input_filepath.to_str().unwrap_or("<unknown>")
        );

        let input_file = File::open(input_filepath).unwrap_or_else(|err| {
            error!("Failed to open input file: {:?}", err);
            exit(1);
        });

        let reader = BufReader::new(input_file);
        let mut loaded_input: SimulationInput =
            serde_json::from_reader(reader).unwrap_or_else(|err| {
                error!("Failed to deserialize input file: {:?}", err);
                exit(1);
            });

        if loaded_input.mask.is_none() {
            loaded_input.mask = self.load_mask();
        }

        loaded_input
    }

    pub fn crate_input(&self) -> SimulationInput {
        // if the input file is supplied, just use that
        let input = if let Some(input_filepath) = &self.input_json {
            self.load_input_file(input_filepath)
        } else {
            self.input_from_args()
        };

        if let Err(reason) = input.validate() {
            error!("Invalid simulation input: {reason}");
            exit(1);
        }

        input
    }

    fn input_from_args(&self) -> SimulationInput {
        let mode = match self.mode.as_str() {
            "frames" => {
                let frames_dir = self
                    .frames_dir
                    .clone()
                    .unwrap_or((*DEFAULT_FRAMES_PATH).into());

                InterfaceMode::ImageStream(ImageStreamSettings {
                    frames_dir,
                    retain_frames: self.retain_frames,
                    frame_stride: self.frame_stride,
                })
            }
            "headless" => InterfaceMode::Headless,
            _ => {
                error!(
                    "'{}' is not a valid interface mode. Use --help for info.",
                    self.mode
                );
                exit(1);
            }
        };

        let execution = match self.execution.as_str() {
            "sequential" => Execution::Sequential,
            "parallel" => Execution::Parallel,
            _ => {
                error!(
                    "'{}' is not a valid execution strategy. Use --help for info.",
                    self.execution
                );
                exit(1);
            }
        };

        let mask = self.load_mask();
        let (width, height) = mask
            .as_ref()
            .map(SerialMask::size)
            .unwrap_or((self.width, self.height));

        let config = SimConfig {
            width,
            height,
            dt: self.dt,
            over_relaxation: self.over_relaxation,
            div_iter: self.div_iter,
            max_density: self.max_density,
            cell_size: self.cell_size,
            max_velocity: self.max_velocity,
        };

        let emitter = (!self.no_emitter)
            .then(|| Emitter::left_inlet(height, self.max_density, self.inlet_velocity));

        SimulationInput {
            mode,
            config,
            initial: InitialCondition {
                seed_columns: self.seed_columns,
                rest_density: self.rest_density,
                random_velocity: self.random_velocity,
                seed: self.seed,
            },
            emitter,
            impulses: Vec::new(),
            sources: Vec::new(),
            mask,
            ticks: self.ticks,
            execution,
            tick_interval: self.tick_interval,
        }
    }
}
