//! Renders a reconstructed grid to a grayscale PNG under `spectrograms/`,
//! independent of classification outcome, so evidence survives even if
//! every classifier tier fails.

use image::{GrayImage, ImageFormat, Luma};
use std::path::{Path, PathBuf};

pub fn render_grid_png(grid: &wire::Grid, dir: &Path, id: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let dim = wire::GRID_DIM as u32;
    let mut image = GrayImage::new(dim, dim);
    for y in 0..dim {
        for x in 0..dim {
            let value = grid.get(y as usize, x as usize);
            image.put_pixel(x, y, Luma([value]));
        }
    }

    let path = dir.join(format!("{id}.png"));
    image.save_with_format(&path, ImageFormat::Png).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(path)
}

pub fn encode_grid_png_bytes(grid: &wire::Grid) -> Vec<u8> {
    let dim = wire::GRID_DIM as u32;
    let mut image = GrayImage::new(dim, dim);
    for y in 0..dim {
        for x in 0..dim {
            let value = grid.get(y as usize, x as usize);
            image.put_pixel(x, y, Luma([value]));
        }
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encoding a 32x32 grayscale PNG to an in-memory buffer cannot fail");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_grid_to_a_readable_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let grid = wire::Grid::zeroed();
        let path = render_grid_png(&grid, dir.path(), "abc").unwrap();
        assert!(path.exists());
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), wire::GRID_DIM as u32);
    }

    #[test]
    fn encodes_in_memory_png_bytes() {
        let grid = wire::Grid::zeroed();
        let bytes = encode_grid_png_bytes(&grid);
        assert!(image::load_from_memory(&bytes).is_ok());
    }
}
