use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;

/// File extensions (lowercase) accepted as dataset images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether `path` carries an image extension, compared case-insensitively.
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List image files directly inside `dir`, sorted by file name.
///
/// Subdirectories and files with other extensions are ignored.
pub fn list_image_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// A decoded RGB raster, row-major and interleaved (`HWC`), 8 bits per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbRaster {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RgbRaster {
    /// Pixel intensities rescaled to `[0, 1]`, still in `HWC` order.
    pub fn to_unit_f32(&self) -> Vec<f32> {
        self.pixels.iter().map(|&v| v as f32 / 255.0).collect()
    }
}

/// Decode an image file to RGB and resize it to `size`×`size` with
/// nearest-neighbour resampling.
pub fn load_rgb_raster(path: &Path, size: u32) -> Result<RgbRaster, image::ImageError> {
    let decoded = image::open(path)?.to_rgb8();
    Ok(resize_rgb(&decoded, size))
}

/// Resize an already decoded raster; rasters with inconsistent buffers come
/// back as a black square.
pub fn resize_raster(raster: &RgbRaster, size: u32) -> RgbRaster {
    match image::RgbImage::from_raw(raster.width as u32, raster.height as u32, raster.pixels.clone()) {
        Some(image) => resize_rgb(&image, size),
        None => RgbRaster {
            width: size as usize,
            height: size as usize,
            pixels: vec![0; size as usize * size as usize * 3],
        },
    }
}

pub(crate) fn resize_rgb(image: &image::RgbImage, size: u32) -> RgbRaster {
    let resized = if image.width() == size && image.height() == size {
        image.clone()
    } else {
        image::imageops::resize(image, size, size, FilterType::Nearest)
    };
    RgbRaster {
        width: size as usize,
        height: size as usize,
        pixels: resized.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/hand.JPG")));
        assert!(has_image_extension(Path::new("hand.Jpeg")));
        assert!(has_image_extension(Path::new("hand.png")));
        assert!(!has_image_extension(Path::new("hand.gif")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("png")));
    }

    #[test]
    fn listing_skips_directories_and_other_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("a.JPG"), b"x").unwrap();
        fs::write(dir.path().join("readme.md"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();
        let names: Vec<String> = list_image_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
    }

    #[test]
    fn load_resizes_to_square_rgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sign.png");
        image::RgbaImage::from_pixel(100, 80, image::Rgba([255, 0, 0, 128]))
            .save(&path)
            .unwrap();
        let raster = load_rgb_raster(&path, 64).unwrap();
        assert_eq!((raster.width, raster.height), (64, 64));
        assert_eq!(raster.pixels.len(), 64 * 64 * 3);
        assert_eq!(&raster.pixels[..3], &[255, 0, 0]);
        let unit = raster.to_unit_f32();
        assert_eq!(unit[0], 1.0);
        assert_eq!(unit[1], 0.0);
    }

    #[test]
    fn resize_raster_scales_in_memory_images() {
        let raster = RgbRaster {
            width: 2,
            height: 1,
            pixels: vec![10, 20, 30, 40, 50, 60],
        };
        let resized = resize_raster(&raster, 4);
        assert_eq!((resized.width, resized.height), (4, 4));
        assert_eq!(&resized.pixels[..3], &[10, 20, 30]);
        assert_eq!(&resized.pixels[9..12], &[40, 50, 60]);
    }

    #[test]
    fn load_reports_undecodable_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not an image").unwrap();
        assert!(load_rgb_raster(&path, 64).is_err());
    }
}
