use image::{GenericImageView, ImageReader, Pixel};
use na::DMatrix;
use std::{error::Error, path::Path};

const THRESHOLD_LUMA: u8 = 127;

/// Load an obstacle mask from an image; dark pixels are solid cells.
///
/// The image's top row becomes the top grid row, so the returned matrix is
/// flipped vertically relative to the pixel rows.
///
/// Parameters:
/// - `image` - Path to any format the `image` crate can decode
///
/// Returns:
/// - A `height` x `width` mask where row 0 is the bottom grid row
pub fn mask_from_image(image: &Path) -> Result<DMatrix<bool>, Box<dyn Error>> {
    let image = ImageReader::open(image)?.decode()?;

    let (nrows, ncols) = (image.height() as usize, image.width() as usize);
    if nrows == 0 || ncols == 0 {
        return Err("Mask image is empty".into());
    }

    let mut mask: DMatrix<bool> = DMatrix::from_element(nrows, ncols, false);

    image.pixels().for_each(|(x, y, color)| {
        let row = nrows - 1 - y as usize;
        mask[(row, x as usize)] = color.to_luma().0[0] < THRESHOLD_LUMA
    });

    Ok(mask)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    #[test]
    fn test_mask_is_flipped_to_grid_rows() {
        let path = std::env::temp_dir().join(format!("mask-{}.png", std::process::id()));

        // 3x2 image, dark pixel in the top-left corner
        let image = GrayImage::from_fn(3, 2, |x, y| {
            if x == 0 && y == 0 { Luma([0]) } else { Luma([255]) }
        });
        image.save(&path).unwrap();

        let mask = mask_from_image(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(mask.shape(), (2, 3));
        assert!(mask[(1, 0)]);
        assert_eq!(mask.iter().filter(|b| **b).count(), 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(mask_from_image(Path::new("no-such-mask.png")).is_err());
    }
}
