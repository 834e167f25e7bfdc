use crate::canvas::Raster;
use image::{ImageFormat, Rgb, RgbImage};
use log::info;
use std::path::Path;

pub const DEFAULT_SNAPSHOT_PATH: &str = "out/image.bmp";

/// Writes `raster` as a BMP file, creating the parent directory if needed.
pub fn save(raster: &dyn Raster, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let geometry = raster.geometry();
    let image = RgbImage::from_fn(geometry.width as u32, geometry.height as u32, |x, y| {
        let pixel = raster.pixel(x as usize, y as usize);
        Rgb([pixel.red, pixel.green, pixel.blue])
    });
    image.save_with_format(path, ImageFormat::Bmp)?;
    info!("saved snapshot to {}", path.display());
    Ok(())
}
