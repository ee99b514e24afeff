// compositor.rs - merges loaded tiles into one equirectangular texture

use crate::error::CompositeError;
use crate::tiles::{TileCoord, TileGrid};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::sync::Arc;

/// Edge length of every tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Largest composite edge we are willing to allocate.
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

#[derive(Debug, Default)]
pub struct TileCompositor {
    background: Option<Arc<RgbaImage>>,
}

impl TileCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the background layer; `None` clears it.
    pub fn bind_background_image(&mut self, background: Option<Arc<RgbaImage>>) {
        self.background = background;
    }

    pub fn background(&self) -> Option<&Arc<RgbaImage>> {
        self.background.as_ref()
    }

    /// Draw the background (stretched to the whole surface) and then each tile
    /// at `(x * 256, y * 256)`. `textures[i]` belongs to `coords[i]`.
    pub fn merge_tiles(
        &self,
        textures: &[Arc<RgbaImage>],
        coords: &[TileCoord],
        grid: TileGrid,
    ) -> Result<RgbaImage, CompositeError> {
        if textures.len() != coords.len() {
            return Err(CompositeError::LengthMismatch {
                textures: textures.len(),
                coords: coords.len(),
            });
        }

        let width = grid.columns as u64 * TILE_SIZE as u64;
        let height = grid.rows as u64 * TILE_SIZE as u64;
        if width == 0
            || height == 0
            || width > MAX_SURFACE_DIMENSION as u64
            || height > MAX_SURFACE_DIMENSION as u64
        {
            return Err(CompositeError::SurfaceUnavailable { width, height });
        }
        let (width, height) = (width as u32, height as u32);

        let mut surface = match &self.background {
            Some(bg) if bg.dimensions() == (width, height) => RgbaImage::clone(bg),
            Some(bg) => imageops::resize(&**bg, width, height, FilterType::Triangle),
            None => RgbaImage::new(width, height),
        };

        for (texture, coord) in textures.iter().zip(coords) {
            if coord.x >= grid.columns || coord.y >= grid.rows {
                return Err(CompositeError::TileOutOfGrid {
                    x: coord.x,
                    y: coord.y,
                    columns: grid.columns,
                    rows: grid.rows,
                });
            }
            let x = (coord.x * TILE_SIZE) as i64;
            let y = (coord.y * TILE_SIZE) as i64;
            if texture.dimensions() == (TILE_SIZE, TILE_SIZE) {
                imageops::replace(&mut surface, &**texture, x, y);
            } else {
                let scaled =
                    imageops::resize(&**texture, TILE_SIZE, TILE_SIZE, FilterType::Triangle);
                imageops::replace(&mut surface, &scaled, x, y);
            }
        }

        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn solid(size: u32, px: Rgba<u8>) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(size, size, px))
    }

    #[test]
    fn places_tile_at_grid_offset_over_blank() {
        let compositor = TileCompositor::new();
        let out = compositor
            .merge_tiles(&[solid(256, RED)], &[TileCoord::new(1, 0)], TileGrid::new(2, 1))
            .unwrap();

        assert_eq!(out.dimensions(), (512, 256));
        assert_eq!(out.get_pixel(256, 0), &RED);
        assert_eq!(out.get_pixel(511, 255), &RED);
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(out.get_pixel(255, 255), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn background_fills_uncovered_region() {
        let mut compositor = TileCompositor::new();
        compositor.bind_background_image(Some(Arc::new(RgbaImage::from_pixel(512, 256, BLUE))));
        let out = compositor
            .merge_tiles(&[solid(256, RED)], &[TileCoord::new(1, 0)], TileGrid::new(2, 1))
            .unwrap();

        assert_eq!(out.get_pixel(100, 100), &BLUE);
        assert_eq!(out.get_pixel(300, 100), &RED);
    }

    #[test]
    fn small_background_is_stretched() {
        let mut compositor = TileCompositor::new();
        compositor.bind_background_image(Some(Arc::new(RgbaImage::from_pixel(64, 32, BLUE))));
        let out = compositor.merge_tiles(&[], &[], TileGrid::new(2, 1)).unwrap();
        assert_eq!(out.dimensions(), (512, 256));
        for (x, y) in [(0, 0), (255, 128), (511, 255)] {
            let px = out.get_pixel(x, y);
            assert!(px[2] > 250 && px[0] < 5, "pixel ({x}, {y}) = {px:?}");
        }
    }

    #[test]
    fn clearing_background_restores_blank() {
        let mut compositor = TileCompositor::new();
        compositor.bind_background_image(Some(solid(512, BLUE)));
        compositor.bind_background_image(None);
        let out = compositor.merge_tiles(&[], &[], TileGrid::new(2, 2)).unwrap();
        assert_eq!(out.get_pixel(10, 10), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn odd_sized_tiles_are_stretched_to_cell() {
        let compositor = TileCompositor::new();
        let out = compositor
            .merge_tiles(&[solid(128, RED)], &[TileCoord::new(0, 1)], TileGrid::new(1, 2))
            .unwrap();
        for (x, y) in [(0, 256), (128, 384), (255, 511)] {
            let px = out.get_pixel(x, y);
            assert!(px[0] > 250 && px[2] < 5, "pixel ({x}, {y}) = {px:?}");
        }
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn empty_grid_fails_loudly() {
        let compositor = TileCompositor::new();
        let err = compositor.merge_tiles(&[], &[], TileGrid::new(0, 4)).unwrap_err();
        assert!(matches!(err, CompositeError::SurfaceUnavailable { .. }));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let compositor = TileCompositor::new();
        let err = compositor
            .merge_tiles(&[solid(256, RED)], &[], TileGrid::new(1, 1))
            .unwrap_err();
        assert_eq!(err, CompositeError::LengthMismatch { textures: 1, coords: 0 });
    }
}
