// panorama.rs - panorama descriptors and detail-level selection

use crate::compositor::{MAX_SURFACE_DIMENSION, TILE_SIZE};
use crate::error::ConfigError;
use crate::tiles::TileGrid;
use glam::Vec3;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Position> for Vec3 {
    fn from(p: Position) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

/// Authored link from one panorama to another.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HotspotDescriptor {
    pub position: Position,
    pub next_panorama_key: String,
}

/// One panoramic scene. Immutable once the tour is loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct PanoramaDescriptor {
    pub tiles_path: String,
    #[serde(default)]
    pub buttons: Vec<HotspotDescriptor>,
    /// Minimum field of view (degrees) -> detail level key, ascending.
    pub zoom_levels_by_fov: BTreeMap<u32, String>,
    pub tile_grid_by_level: HashMap<String, TileGrid>,
    pub url_template_by_level: HashMap<String, String>,
    #[serde(default)]
    pub prerender_by_level: HashMap<String, bool>,
}

/// Everything a load cycle needs to know about one detail level.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailLevel {
    pub key: String,
    pub grid: TileGrid,
    /// `tiles_path` joined with the level fragment; still holds `{x}`/`{y}`.
    pub url_template: String,
    pub prerender: bool,
}

impl PanoramaDescriptor {
    /// Level key for a field of view: the largest threshold not above `fov`,
    /// or the lowest-threshold level when `fov` is below every threshold.
    pub fn level_key_for_fov(&self, fov: f32) -> Option<&str> {
        let mut chosen = self.zoom_levels_by_fov.values().next()?;
        for (threshold, level) in self.zoom_levels_by_fov.iter() {
            if *threshold as f32 <= fov {
                chosen = level;
            } else {
                break;
            }
        }
        Some(chosen.as_str())
    }

    /// Coarsest configured level, used for background preloading.
    pub fn coarsest_level_key(&self) -> Option<&str> {
        self.level_key_for_fov(f32::MAX)
    }

    pub fn level_for_fov(&self, fov: f32) -> Option<DetailLevel> {
        let key = self.level_key_for_fov(fov)?;
        self.detail_level(key)
    }

    pub fn detail_level(&self, key: &str) -> Option<DetailLevel> {
        let grid = *self.tile_grid_by_level.get(key)?;
        let fragment = self.url_template_by_level.get(key)?;
        Some(DetailLevel {
            key: key.to_string(),
            grid,
            url_template: format!("{}{}", self.tiles_path, fragment),
            prerender: self.prerender_by_level.get(key).copied().unwrap_or(false),
        })
    }

    /// Like `detail_level`, but a hole in the tables is a configuration error.
    pub fn require_level(&self, name: &str, key: &str) -> Result<DetailLevel, ConfigError> {
        if !self.tile_grid_by_level.contains_key(key) {
            return Err(ConfigError::MissingGrid { panorama: name.to_string(), level: key.to_string() });
        }
        self.detail_level(key).ok_or_else(|| ConfigError::MissingTemplate {
            panorama: name.to_string(),
            level: key.to_string(),
        })
    }

    /// Check that every level key is consistent across the tables, so that
    /// level lookups during streaming cannot fail.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.zoom_levels_by_fov.is_empty() {
            return Err(ConfigError::NoZoomLevels { panorama: name.to_string() });
        }

        let known = |level: &String| self.zoom_levels_by_fov.values().any(|l| l == level);
        let unknown = |table: &'static str, level: &String| ConfigError::UnknownLevel {
            panorama: name.to_string(),
            table,
            level: level.clone(),
        };

        for level in self.tile_grid_by_level.keys() {
            if !known(level) {
                return Err(unknown("tile_grid_by_level", level));
            }
        }
        for level in self.url_template_by_level.keys() {
            if !known(level) {
                return Err(unknown("url_template_by_level", level));
            }
        }
        for level in self.prerender_by_level.keys() {
            if !known(level) {
                return Err(unknown("prerender_by_level", level));
            }
        }

        for level in self.zoom_levels_by_fov.values() {
            let grid = self.tile_grid_by_level.get(level).ok_or_else(|| {
                ConfigError::MissingGrid { panorama: name.to_string(), level: level.clone() }
            })?;
            if grid.is_empty() {
                return Err(ConfigError::EmptyGrid {
                    panorama: name.to_string(),
                    level: level.clone(),
                });
            }
            let width = grid.columns as u64 * TILE_SIZE as u64;
            let height = grid.rows as u64 * TILE_SIZE as u64;
            let limit = MAX_SURFACE_DIMENSION as u64;
            if width > limit || height > limit {
                return Err(ConfigError::GridTooLarge {
                    panorama: name.to_string(),
                    level: level.clone(),
                    width,
                    height,
                });
            }
            let template = self.url_template_by_level.get(level).ok_or_else(|| {
                ConfigError::MissingTemplate { panorama: name.to_string(), level: level.clone() }
            })?;
            if grid.len() > 1 && !(template.contains("{x}") && template.contains("{y}")) {
                return Err(ConfigError::BadTemplate {
                    panorama: name.to_string(),
                    level: level.clone(),
                });
            }
        }
        Ok(())
    }
}
