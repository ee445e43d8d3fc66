use na::DMatrix;
use plotters::prelude::*;
use std::{error::Error, fs, path::Path, sync::Arc, sync::mpsc};
use tracing::debug;

use crate::sim::snapshot::FieldSnapshot;

const OBSTACLE_COLOR: RGBColor = RGBColor(200, 40, 40);

#[derive(Clone)]
pub struct DisplayPacket {
    pub snapshot: Arc<FieldSnapshot>,
    pub i: usize,
}

/// Write a density field to a greyscale PNG, one pixel per cell.
///
/// Parameters:
/// - `density` - `height` x `width` density, row 0 at the bottom of the image
/// - `max_density` - Density drawn at full brightness; larger values saturate
/// - `obstacles` - Solid cells, same shape as `density`, drawn in red
/// - `filename` - File name inside `frames_dir`
/// - `frames_dir` - Output directory
pub fn image_save(
    density: &DMatrix<f32>,
    max_density: f32,
    obstacles: Option<&DMatrix<bool>>,
    filename: &str,
    frames_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let (rows, cols) = density.shape();

    let filename = frames_dir.join(filename);

    let root = BitMapBackend::new(&filename, (cols as u32, rows as u32)).into_drawing_area();
    root.fill(&WHITE)?;

    for i in 0..rows {
        // image rows grow downward
        let y = (rows - 1 - i) as i32;
        for j in 0..cols {
            if obstacles.is_some_and(|mask| mask[(i, j)]) {
                root.draw_pixel((j as i32, y), &OBSTACLE_COLOR)?;
                continue;
            }

            let pixel_mag = density
                .get((i, j))
                .ok_or("Pixel not on density field")?
                / max_density;
            let pixel_intensity = (254.0 * pixel_mag.clamp(0., 1.)).floor() as u8;
            let pixel_color = &RGBColor(pixel_intensity, pixel_intensity, pixel_intensity);

            root.draw_pixel((j as i32, y), pixel_color)?;
        }
    }
    root.present()?;

    Ok(())
}

/// Write every received snapshot as `<i>.png` until the sender hangs up.
/// Obstacles are taken from each snapshot, so cells carved mid-run show up
/// from the frame after they were carved.
pub fn image_io_loop(
    inbound_snapshots: mpsc::Receiver<DisplayPacket>,
    max_density: f32,
    frames_dir: &Path,
) -> Result<usize, Box<dyn Error>> {
    if frames_dir.exists() {
        fs::remove_dir_all(frames_dir)?;
    }
    fs::create_dir_all(frames_dir)?;

    let mut written = 0;
    while let Ok(inbound) = inbound_snapshots.recv() {
        let obstacles = inbound.snapshot.obstacle_matrix();
        image_save(
            &inbound.snapshot.density_matrix(),
            max_density,
            Some(&obstacles),
            format!("{}.png", inbound.i).as_str(),
            frames_dir,
        )?;
        written += 1;
    }

    debug!(frames = written, "image stream closed");
    Ok(written)
}
