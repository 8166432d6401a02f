use std::path::{Path, PathBuf};

/// Fill colour used for a class directory, distinct per name.
pub fn class_colour(name: &str) -> [u8; 3] {
    let hash = name
        .bytes()
        .fold(0x811c_9dc5u32, |acc, b| (acc ^ b as u32).wrapping_mul(0x0100_0193));
    [(hash >> 16) as u8, (hash >> 8) as u8, hash as u8]
}

pub fn write_png(path: &Path, size: u32, colour: [u8; 3]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create image parent dirs");
    }
    let image = image::RgbImage::from_fn(size, size, |x, y| {
        // A faint gradient so images within a class are not byte-identical.
        let shade = ((x + y) % 8) as u8;
        image::Rgb([
            colour[0].saturating_add(shade),
            colour[1].saturating_add(shade),
            colour[2].saturating_add(shade),
        ])
    });
    image.save(path).expect("write png");
}

/// Create `root/<class>/<class>_<n>.png` for every `(class, count)`.
pub fn write_dataset(root: &Path, classes: &[(&str, usize)], size: u32) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for (class, count) in classes {
        let colour = class_colour(class);
        for n in 0..*count {
            let path = root.join(class).join(format!("{class}_{n}.png"));
            write_png(&path, size, colour);
            written.push(path);
        }
    }
    written
}
