// error.rs - error types shared by the viewer components

use std::fmt;
use std::path::PathBuf;

/// Tour configuration problems. Always fatal: they are reported when the tour
/// is loaded, never as a blank sphere later.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    NotFound,
    EmptyTour,
    UnknownStart(String),
    UnknownPanorama(String),
    NoZoomLevels { panorama: String },
    UnknownLevel { panorama: String, table: &'static str, level: String },
    MissingGrid { panorama: String, level: String },
    MissingTemplate { panorama: String, level: String },
    EmptyGrid { panorama: String, level: String },
    BadTemplate { panorama: String, level: String },
    GridTooLarge { panorama: String, level: String, width: u64, height: u64 },
    DanglingHotspot { panorama: String, target: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read tour file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid tour file {}: {source}", path.display())
            }
            ConfigError::NotFound => write!(
                f,
                "no tour file found (use --tour <path> or PANORAMA_TOUR, or place assets/tour.json)"
            ),
            ConfigError::EmptyTour => write!(f, "tour has no panoramas"),
            ConfigError::UnknownStart(key) => write!(f, "start panorama `{key}` is not defined"),
            ConfigError::UnknownPanorama(key) => write!(f, "panorama `{key}` is not defined"),
            ConfigError::NoZoomLevels { panorama } => {
                write!(f, "panorama `{panorama}`: zoom_levels_by_fov is empty")
            }
            ConfigError::UnknownLevel { panorama, table, level } => write!(
                f,
                "panorama `{panorama}`: {table} references level `{level}` not present in zoom_levels_by_fov"
            ),
            ConfigError::MissingGrid { panorama, level } => {
                write!(f, "panorama `{panorama}`: level `{level}` has no tile grid")
            }
            ConfigError::MissingTemplate { panorama, level } => {
                write!(f, "panorama `{panorama}`: level `{level}` has no url template")
            }
            ConfigError::EmptyGrid { panorama, level } => {
                write!(f, "panorama `{panorama}`: level `{level}` has an empty tile grid")
            }
            ConfigError::BadTemplate { panorama, level } => write!(
                f,
                "panorama `{panorama}`: url template of level `{level}` must contain {{x}} and {{y}}"
            ),
            ConfigError::GridTooLarge { panorama, level, width, height } => write!(
                f,
                "panorama `{panorama}`: level `{level}` composites to {width}x{height}, above the surface limit"
            ),
            ConfigError::DanglingHotspot { panorama, target } => write!(
                f,
                "panorama `{panorama}`: hotspot targets unknown panorama `{target}`"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A single tile could not be fetched or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    Fetch { url: String, reason: String },
    Decode { url: String, reason: String },
    WorkersGone { url: String },
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileError::Fetch { url, reason } => write!(f, "fetch {url} failed: {reason}"),
            TileError::Decode { url, reason } => write!(f, "decode {url} failed: {reason}"),
            TileError::WorkersGone { url } => {
                write!(f, "cannot fetch {url}: tile workers have shut down")
            }
        }
    }
}

impl std::error::Error for TileError {}

/// The off-screen composite surface could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    SurfaceUnavailable { width: u64, height: u64 },
    LengthMismatch { textures: usize, coords: usize },
    TileOutOfGrid { x: u32, y: u32, columns: u32, rows: u32 },
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeError::SurfaceUnavailable { width, height } => {
                write!(f, "cannot create a {width}x{height} composite surface")
            }
            CompositeError::LengthMismatch { textures, coords } => write!(
                f,
                "{textures} tile images but {coords} tile coordinates"
            ),
            CompositeError::TileOutOfGrid { x, y, columns, rows } => {
                write!(f, "tile ({x}, {y}) outside {columns}x{rows} grid")
            }
        }
    }
}

impl std::error::Error for CompositeError {}

#[derive(Debug)]
pub enum ViewerError {
    Config(ConfigError),
    Composite(CompositeError),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::Config(e) => write!(f, "configuration error: {e}"),
            ViewerError::Composite(e) => write!(f, "compositing failed: {e}"),
        }
    }
}

impl std::error::Error for ViewerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewerError::Config(e) => Some(e),
            ViewerError::Composite(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ViewerError {
    fn from(e: ConfigError) -> Self {
        ViewerError::Config(e)
    }
}

impl From<CompositeError> for ViewerError {
    fn from(e: CompositeError) -> Self {
        ViewerError::Composite(e)
    }
}
