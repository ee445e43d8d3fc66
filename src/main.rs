use std::{fs::File, io::BufWriter, process::exit};

use clap::Parser;
use tracing::{error, info};

use eulerian_2d::{
    postprocessing::postprocess, preprocessing::cli::CliArgs, sim::task::spawn_sim_thread,
};

fn main() {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .init();

    let input = args.crate_input();
    input.log();

    if let Some(savepath) = args.input_json_savepath() {
        let saved = File::create(savepath)
            .map_err(|err| err.to_string())
            .and_then(|file| {
                serde_json::to_writer_pretty(BufWriter::new(file), &input)
                    .map_err(|err| err.to_string())
            });
        match saved {
            Ok(()) => info!("Saved input file to {:?}", savepath),
            Err(err) => {
                error!("Failed to save input file: {err}");
                exit(1);
            }
        }
    }

    let output = match spawn_sim_thread(input.clone()).join() {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            error!("Simulation failed: {err}");
            exit(1);
        }
        Err(_) => {
            error!("Simulation thread panicked");
            exit(1);
        }
    };

    postprocess(&input, &output);
}
