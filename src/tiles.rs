// tiles.rs - tile grid coordinates and front-hemisphere visibility

use glam::{Quat, Vec3};
use serde::Deserialize;
use std::f32::consts::PI;

/// Zero-based (column, row) position of a tile inside its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Grid shape of one detail level. Deserialised from `[columns, rows]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "[u32; 2]")]
pub struct TileGrid {
    pub columns: u32,
    pub rows: u32,
}

impl From<[u32; 2]> for TileGrid {
    fn from([columns, rows]: [u32; 2]) -> Self {
        Self { columns, rows }
    }
}

impl TileGrid {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Direction on the unit sphere used to represent a tile in the visibility test.
///
/// The cell index is offset by one before projection, so the direction sits on
/// the far edge of the cell rather than its center.
pub fn tile_direction(coord: TileCoord, grid: TileGrid) -> Vec3 {
    let phi = ((coord.y + 1) as f32 / grid.rows as f32) * PI;
    let theta = ((coord.x + 1) as f32 / grid.columns as f32) * 2.0 * PI;
    Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin())
}

/// World-space viewing direction of a camera with the given orientation.
pub fn camera_forward(orientation: Quat) -> Vec3 {
    orientation * Vec3::NEG_Z
}

/// Front-hemisphere test: a tile is visible when its direction does not point
/// away from the camera. No frustum narrowing is applied.
pub fn is_tile_visible(orientation: Quat, coord: TileCoord, grid: TileGrid) -> bool {
    tile_direction(coord, grid).dot(camera_forward(orientation)) >= 0.0
}

/// Enumerate the grid row-major (y outer, x inner) and keep the cells accepted
/// by `condition`.
pub fn tiles_by_condition(
    grid: TileGrid,
    mut condition: impl FnMut(TileCoord) -> bool,
) -> Vec<TileCoord> {
    let mut tiles = Vec::new();
    for y in 0..grid.rows {
        for x in 0..grid.columns {
            let coord = TileCoord::new(x, y);
            if condition(coord) {
                tiles.push(coord);
            }
        }
    }
    tiles
}

/// Substitute `{x}`/`{y}` in a resolved URL template.
pub fn resolve_tile_url(template: &str, coord: TileCoord) -> String {
    template
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_along(dir: Vec3) -> Quat {
        Quat::from_rotation_arc(Vec3::NEG_Z, dir.normalize())
    }

    #[test]
    fn enumerates_full_grid_row_major() {
        let tiles = tiles_by_condition(TileGrid::new(3, 2), |_| true);
        let expected: Vec<TileCoord> = [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
            .into_iter()
            .map(|(x, y)| TileCoord::new(x, y))
            .collect();
        assert_eq!(tiles, expected);
    }

    #[test]
    fn condition_filters_cells() {
        let tiles = tiles_by_condition(TileGrid::new(4, 4), |c| c.x == c.y);
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|c| c.x == c.y));
    }

    #[test]
    fn direction_matches_equirectangular_projection() {
        let grid = TileGrid::new(4, 2);
        // y = 0 of 2 rows lands on the equator, x = 0 of 4 columns at a quarter turn.
        let d = tile_direction(TileCoord::new(0, 0), grid);
        assert!(d.x.abs() < 1e-5);
        assert!(d.y.abs() < 1e-5);
        assert!((d.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn visibility_follows_dot_product_sign() {
        let grid = TileGrid::new(4, 2);
        for y in 0..grid.rows {
            for x in 0..grid.columns {
                let coord = TileCoord::new(x, y);
                for forward in [Vec3::X, Vec3::NEG_X, Vec3::Z, Vec3::new(0.3, 0.2, -1.0)] {
                    let expected = tile_direction(coord, grid).dot(forward.normalize()) >= 0.0;
                    assert_eq!(is_tile_visible(looking_along(forward), coord, grid), expected);
                }
            }
        }
    }

    #[test]
    fn visibility_is_pure() {
        let grid = TileGrid::new(8, 4);
        let orientation = looking_along(Vec3::new(1.0, 0.1, 0.2));
        let first = tiles_by_condition(grid, |c| is_tile_visible(orientation, c, grid));
        let second = tiles_by_condition(grid, |c| is_tile_visible(orientation, c, grid));
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.len() < grid.len());
    }

    #[test]
    fn url_template_substitution() {
        let url = resolve_tile_url("https://cdn/p/l2/{y}/{x}.jpg", TileCoord::new(3, 1));
        assert_eq!(url, "https://cdn/p/l2/1/3.jpg");
    }
}
