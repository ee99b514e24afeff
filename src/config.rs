// config.rs - tour file loading and viewer settings
//
// Tour lookup order:
// - CLI: --tour <path>
// - Env: PANORAMA_TOUR
// - assets/tour.json next to the executable, then in the working directory
//
// --start <key> overrides the tour's start panorama.

use crate::error::ConfigError;
use crate::panorama::PanoramaDescriptor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub initial_fov: f32,
    pub min_fov: f32,
    pub max_fov: f32,
    pub scroll_zoom_factor: f32,
    pub animation_duration_ms: u64,
    pub hotspot_target_fov: f32,
    pub spinner_delay_ms: u64,
    pub fetch_workers: usize,
    pub drag_sensitivity: f32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            initial_fov: 75.0,
            min_fov: 20.0,
            max_fov: 90.0,
            scroll_zoom_factor: 0.05,
            animation_duration_ms: 800,
            hotspot_target_fov: 30.0,
            spinner_delay_ms: 1000,
            fetch_workers: 6,
            drag_sensitivity: 1.0,
        }
    }
}

impl ViewerSettings {
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn spinner_delay(&self) -> Duration {
        Duration::from_millis(self.spinner_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TourConfig {
    pub start: String,
    #[serde(default)]
    pub viewer: ViewerSettings,
    pub panoramas: BTreeMap<String, PanoramaDescriptor>,
}

impl TourConfig {
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let tour: TourConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tour.validate()?;
        Ok(tour)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    /// Validate every panorama and every hotspot link up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.panoramas.is_empty() {
            return Err(ConfigError::EmptyTour);
        }
        if !self.panoramas.contains_key(&self.start) {
            return Err(ConfigError::UnknownStart(self.start.clone()));
        }
        for (name, panorama) in &self.panoramas {
            panorama.validate(name)?;
            for button in &panorama.buttons {
                if !self.panoramas.contains_key(&button.next_panorama_key) {
                    return Err(ConfigError::DanglingHotspot {
                        panorama: name.clone(),
                        target: button.next_panorama_key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn panorama(&self, key: &str) -> Result<&PanoramaDescriptor, ConfigError> {
        self.panoramas
            .get(key)
            .ok_or_else(|| ConfigError::UnknownPanorama(key.to_string()))
    }

    pub fn set_start(&mut self, key: String) -> Result<(), ConfigError> {
        if !self.panoramas.contains_key(&key) {
            return Err(ConfigError::UnknownStart(key));
        }
        self.start = key;
        Ok(())
    }
}

/// Command-line options understood by the viewer binary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    pub tour: Option<PathBuf>,
    pub start: Option<String>,
}

impl LaunchOptions {
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Self {
        let mut opts = LaunchOptions::default();
        let mut it = args.into_iter();
        while let Some(a) = it.next() {
            match a.as_str() {
                "--tour" => opts.tour = it.next().map(PathBuf::from),
                "--start" => opts.start = it.next(),
                _ => {}
            }
        }
        opts
    }

    /// Resolve the tour file path from CLI, environment, then default locations.
    pub fn resolve_tour_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(p) = &self.tour {
            return Ok(p.clone());
        }

        if let Ok(v) = std::env::var("PANORAMA_TOUR") {
            if !v.trim().is_empty() {
                return Ok(PathBuf::from(v));
            }
        }

        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let p = dir.join("assets").join("tour.json");
                if p.exists() {
                    return Ok(p);
                }
            }
        }

        let p = PathBuf::from("assets").join("tour.json");
        if p.exists() {
            return Ok(p);
        }

        Err(ConfigError::NotFound)
    }

    pub fn load_tour(&self) -> Result<TourConfig, ConfigError> {
        let path = self.resolve_tour_path()?;
        let mut tour = TourConfig::load(&path)?;
        if let Some(start) = &self.start {
            tour.set_start(start.clone())?;
        }
        log::info!(
            "loaded tour {} ({} panoramas, start `{}`)",
            path.display(),
            tour.panoramas.len(),
            tour.start
        );
        Ok(tour)
    }
}
