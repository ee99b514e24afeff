// lib.rs - tiled panorama viewer core
//
// Tile streaming (visibility, cache, compositing, load cycles), camera state
// and animation, navigation hotspots and loading progress. The binary in
// main.rs hosts these on a winit window with a wgpu renderer.

pub mod animator;
pub mod cache;
pub mod camera;
pub mod compositor;
pub mod config;
pub mod error;
pub mod hotspots;
pub mod panorama;
pub mod progress;
pub mod scene;
pub mod streaming;
pub mod tiles;

pub use animator::CameraAnimator;
pub use cache::{DefaultTileSource, TileCache, TileSource, TileWorkers};
pub use camera::CameraRig;
pub use compositor::{TileCompositor, TILE_SIZE};
pub use config::{LaunchOptions, TourConfig, ViewerSettings};
pub use error::{CompositeError, ConfigError, TileError, ViewerError};
pub use hotspots::NavigationHotspotManager;
pub use panorama::PanoramaDescriptor;
pub use progress::LoadingProgressTracker;
pub use scene::{Scene, Sphere};
pub use streaming::{LoadEvent, TileStreamingController};
