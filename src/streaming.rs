// streaming.rs - load cycles: level selection, visibility filtering, fetch,
// composite, apply
//
// A cycle is started by `load` (foreground) or `preload_background` and
// completes inside `poll` once every tile it asked for has arrived or failed.
// Only the newest foreground cycle of the active panorama may touch the
// sphere; older ones still report `LoadEnded` but their composite is dropped.

use crate::cache::{FetchCompletion, TileCache, TileLookup};
use crate::camera::CameraRig;
use crate::compositor::TileCompositor;
use crate::error::{ConfigError, ViewerError};
use crate::panorama::{DetailLevel, PanoramaDescriptor};
use crate::scene::Sphere;
use crate::tiles::{is_tile_visible, resolve_tile_url, tiles_by_condition, TileCoord, TileGrid};
use image::RgbaImage;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Progress notifications published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent {
    LoadStarted { count: usize },
    TileLoaded,
    LoadEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Foreground,
    Background,
}

#[derive(Debug)]
struct PendingTile {
    coord: TileCoord,
    url: String,
    image: Option<Arc<RgbaImage>>,
    settled: bool,
}

#[derive(Debug)]
struct LoadCycle {
    id: CycleId,
    kind: CycleKind,
    epoch: u64,
    grid: TileGrid,
    tiles: Vec<PendingTile>,
    outstanding: usize,
}

impl LoadCycle {
    /// Returns whether this cycle was waiting for the completed URL.
    fn settle(&mut self, completion: &FetchCompletion) -> bool {
        let mut matched = false;
        for tile in self.tiles.iter_mut().filter(|t| !t.settled && t.url == completion.url) {
            tile.image = completion.result.as_ref().ok().cloned();
            tile.settled = true;
            self.outstanding -= 1;
            matched = true;
        }
        matched
    }

    fn loaded(&self) -> (Vec<Arc<RgbaImage>>, Vec<TileCoord>) {
        self.tiles
            .iter()
            .filter_map(|t| t.image.as_ref().map(|img| (Arc::clone(img), t.coord)))
            .unzip()
    }
}

/// Foreground composite currently on the sphere, kept so it can be rebuilt
/// when the background arrives late.
#[derive(Debug)]
struct AppliedComposite {
    epoch: u64,
    grid: TileGrid,
    textures: Vec<Arc<RgbaImage>>,
    coords: Vec<TileCoord>,
}

#[derive(Debug, Clone, PartialEq)]
struct RequestKey {
    epoch: u64,
    level: String,
    coords: Vec<TileCoord>,
}

#[derive(Debug, Clone)]
struct ActivePanorama {
    key: String,
    descriptor: PanoramaDescriptor,
}

pub struct TileStreamingController {
    cache: TileCache,
    compositor: TileCompositor,
    active: Option<ActivePanorama>,
    epoch: u64,
    next_cycle: u64,
    cycles: Vec<LoadCycle>,
    latest_foreground: Option<CycleId>,
    last_request: Option<RequestKey>,
    applied: Option<AppliedComposite>,
    listeners: Vec<Sender<LoadEvent>>,
}

impl TileStreamingController {
    pub fn new(cache: TileCache) -> Self {
        Self {
            cache,
            compositor: TileCompositor::new(),
            active: None,
            epoch: 0,
            next_cycle: 0,
            cycles: Vec::new(),
            latest_foreground: None,
            last_request: None,
            applied: None,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<LoadEvent> {
        let (tx, rx) = channel();
        self.listeners.push(tx);
        rx
    }

    fn emit(&mut self, event: LoadEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn compositor(&self) -> &TileCompositor {
        &self.compositor
    }

    pub fn active_panorama(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.key.as_str())
    }

    pub fn pending_cycles(&self) -> usize {
        self.cycles.len()
    }

    /// Switch to a panorama without loading anything yet. The previous
    /// panorama's background is unbound and its in-flight cycles are ended
    /// now; their late fetches still fill the cache but report nothing.
    pub fn select_panorama(&mut self, key: &str, descriptor: &PanoramaDescriptor) {
        for cycle in std::mem::take(&mut self.cycles) {
            log::debug!("abandoning cycle {} of the previous panorama", cycle.id.0);
            self.emit(LoadEvent::LoadEnded);
        }
        self.epoch += 1;
        self.compositor.bind_background_image(None);
        self.applied = None;
        self.last_request = None;
        self.latest_foreground = None;
        self.active = Some(ActivePanorama { key: key.to_string(), descriptor: descriptor.clone() });
    }

    /// Select a panorama, then start its background preload and the first
    /// foreground load.
    pub fn activate_panorama(
        &mut self,
        key: &str,
        descriptor: &PanoramaDescriptor,
        camera: &CameraRig,
    ) -> Result<(), ViewerError> {
        log::info!("activating panorama `{key}`");
        self.select_panorama(key, descriptor);
        self.preload_background()?;
        self.load(camera)?;
        Ok(())
    }

    fn active(&self) -> Option<&ActivePanorama> {
        self.active.as_ref()
    }

    fn level_for_fov(&self, fov: f32) -> Result<Option<DetailLevel>, ConfigError> {
        let Some(active) = self.active() else {
            return Ok(None);
        };
        let key = active
            .descriptor
            .level_key_for_fov(fov)
            .ok_or_else(|| ConfigError::NoZoomLevels { panorama: active.key.clone() })?;
        active.descriptor.require_level(&active.key, key).map(Some)
    }

    /// Fetch every tile of the coarsest level and bind the result as the
    /// compositor background once it arrives.
    pub fn preload_background(&mut self) -> Result<Option<CycleId>, ViewerError> {
        let Some(level) = self.level_for_fov(f32::MAX)? else {
            return Ok(None);
        };
        let coords = tiles_by_condition(level.grid, |_| true);
        log::debug!("background preload at level `{}` ({} tiles)", level.key, coords.len());
        Ok(Some(self.start_cycle(CycleKind::Background, &level, coords)))
    }

    /// Start a foreground cycle for the camera's current view. Returns `None`
    /// when no panorama is active or the same tile set is already requested.
    pub fn load(&mut self, camera: &CameraRig) -> Result<Option<CycleId>, ViewerError> {
        let Some(level) = self.level_for_fov(camera.fov())? else {
            log::debug!("load requested with no active panorama");
            return Ok(None);
        };

        let orientation = camera.orientation();
        let grid = level.grid;
        let coords = tiles_by_condition(grid, |coord| {
            level.prerender || is_tile_visible(orientation, coord, grid)
        });

        let request = RequestKey { epoch: self.epoch, level: level.key.clone(), coords };
        if self.last_request.as_ref() == Some(&request) {
            return Ok(None);
        }
        log::debug!(
            "level `{}` selected for fov {:.1}, {} tiles",
            level.key,
            camera.fov(),
            request.coords.len()
        );
        let coords = request.coords.clone();
        self.last_request = Some(request);

        let id = self.start_cycle(CycleKind::Foreground, &level, coords);
        self.latest_foreground = Some(id);
        Ok(Some(id))
    }

    fn start_cycle(&mut self, kind: CycleKind, level: &DetailLevel, coords: Vec<TileCoord>) -> CycleId {
        let id = CycleId(self.next_cycle);
        self.next_cycle += 1;

        self.emit(LoadEvent::LoadStarted { count: coords.len() });

        let mut outstanding = 0;
        let tiles = coords
            .into_iter()
            .map(|coord| {
                let url = resolve_tile_url(&level.url_template, coord);
                let (image, settled) = match self.cache.load_tile(&url) {
                    TileLookup::Ready(img) => (Some(img), true),
                    TileLookup::Pending => {
                        outstanding += 1;
                        (None, false)
                    }
                };
                PendingTile { coord, url, image, settled }
            })
            .collect::<Vec<_>>();

        log::info!(
            "{:?} cycle {} started: level `{}`, {} tiles, {} to fetch",
            kind,
            id.0,
            level.key,
            tiles.len(),
            outstanding
        );

        self.cycles.push(LoadCycle {
            id,
            kind,
            epoch: self.epoch,
            grid: level.grid,
            tiles,
            outstanding,
        });
        id
    }

    /// Absorb finished fetches and complete every cycle that has nothing left
    /// to wait for. Returns the number of composites applied to the sphere.
    /// A compositing failure does not stop the other finished cycles; the
    /// first error is returned after all of them have ended.
    pub fn poll(&mut self, sphere: &mut Sphere) -> Result<usize, ViewerError> {
        let completions = self.cache.poll();
        self.absorb(completions, sphere)
    }

    /// Like `poll`, but blocks up to `timeout` for the next fetch.
    pub fn wait(&mut self, timeout: Duration, sphere: &mut Sphere) -> Result<usize, ViewerError> {
        let completions = self.cache.wait(timeout);
        self.absorb(completions, sphere)
    }

    fn absorb(
        &mut self,
        completions: Vec<FetchCompletion>,
        sphere: &mut Sphere,
    ) -> Result<usize, ViewerError> {
        for completion in &completions {
            let mut wanted = false;
            for cycle in self.cycles.iter_mut() {
                wanted |= cycle.settle(completion);
            }
            if wanted {
                self.emit(LoadEvent::TileLoaded);
            }
        }

        let (finished, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.cycles).into_iter().partition(|c| c.outstanding == 0);
        self.cycles = pending;

        let mut applied = 0;
        let mut first_error = None;
        for cycle in finished {
            self.emit(LoadEvent::LoadEnded);
            match self.finish_cycle(cycle, sphere) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => log::error!("{e}"),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    fn finish_cycle(&mut self, cycle: LoadCycle, sphere: &mut Sphere) -> Result<bool, ViewerError> {
        if cycle.epoch != self.epoch {
            log::warn!("dropping cycle {} from a previous panorama", cycle.id.0);
            return Ok(false);
        }
        let (textures, coords) = cycle.loaded();
        let failed = cycle.tiles.len() - textures.len();
        if failed > 0 {
            log::warn!("cycle {}: {failed} tiles failed and were skipped", cycle.id.0);
        }

        match cycle.kind {
            CycleKind::Background => {
                let background = TileCompositor::new().merge_tiles(&textures, &coords, cycle.grid)?;
                self.compositor.bind_background_image(Some(Arc::new(background)));
                log::info!("background bound from cycle {}", cycle.id.0);

                // Re-layer the foreground that is already showing.
                let Some(applied) = self.applied.as_ref().filter(|a| a.epoch == self.epoch) else {
                    return Ok(false);
                };
                let composite =
                    self.compositor.merge_tiles(&applied.textures, &applied.coords, applied.grid)?;
                sphere.material.set_map(Arc::new(composite));
                Ok(true)
            }
            CycleKind::Foreground => {
                if self.latest_foreground != Some(cycle.id) {
                    log::warn!("dropping stale cycle {}, a newer load has started", cycle.id.0);
                    return Ok(false);
                }
                if failed > 0 {
                    // Let the next load for this view fetch the holes again.
                    self.last_request = None;
                }
                let composite = self.compositor.merge_tiles(&textures, &coords, cycle.grid)?;
                log::info!(
                    "cycle {} applied: {}x{} composite",
                    cycle.id.0,
                    composite.width(),
                    composite.height()
                );
                sphere.material.set_map(Arc::new(composite));
                self.applied = Some(AppliedComposite {
                    epoch: cycle.epoch,
                    grid: cycle.grid,
                    textures,
                    coords,
                });
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{TileSource, TileWorkers};
    use crate::config::ViewerSettings;
    use crate::error::{CompositeError, TileError};
    use glam::{Quat, Vec3};
    use image::Rgba;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Serves fixed colours; URLs it does not know fail.
    struct MapSource(HashMap<String, Rgba<u8>>);

    impl TileSource for MapSource {
        fn fetch(&self, url: &str) -> Result<RgbaImage, TileError> {
            self.0
                .get(url)
                .map(|px| RgbaImage::from_pixel(256, 256, *px))
                .ok_or_else(|| TileError::Fetch { url: url.into(), reason: "404".into() })
        }
    }

    /// Fails the first request for every URL, then serves red.
    #[derive(Default)]
    struct FlakySource {
        seen: Mutex<HashSet<String>>,
        calls: Mutex<usize>,
    }

    impl TileSource for FlakySource {
        fn fetch(&self, url: &str) -> Result<RgbaImage, TileError> {
            *self.calls.lock().unwrap() += 1;
            if self.seen.lock().unwrap().insert(url.to_string()) {
                return Err(TileError::Fetch { url: url.into(), reason: "timed out".into() });
            }
            Ok(RgbaImage::from_pixel(256, 256, RED))
        }
    }

    fn panorama() -> PanoramaDescriptor {
        serde_json::from_str(
            r#"{
                "tiles_path": "p/",
                "zoom_levels_by_fov": { "10": "high", "80": "low" },
                "tile_grid_by_level": { "high": [2, 2], "low": [2, 1] },
                "url_template_by_level": { "high": "h/{x}_{y}", "low": "l/{x}_{y}" },
                "prerender_by_level": { "low": true }
            }"#,
        )
        .unwrap()
    }

    fn source() -> MapSource {
        let mut tiles = HashMap::new();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            tiles.insert(format!("p/h/{x}_{y}"), if x == 1 { RED } else { GREEN });
        }
        tiles.insert("p/l/0_0".into(), BLUE);
        tiles.insert("p/l/1_0".into(), BLUE);
        MapSource(tiles)
    }

    /// Background pixels go through a resize, so allow rounding.
    fn close(px: &Rgba<u8>, expected: Rgba<u8>) -> bool {
        px.0.iter().zip(expected.0).all(|(a, b)| a.abs_diff(b) <= 2)
    }

    fn controller_with(source: MapSource) -> TileStreamingController {
        TileStreamingController::new(TileCache::new(TileWorkers::inline(Arc::new(source))))
    }

    fn camera_facing(dir: Vec3) -> CameraRig {
        let mut camera = CameraRig::new(&ViewerSettings::default(), 1.0);
        camera.set_orientation(Quat::from_rotation_arc(Vec3::NEG_Z, dir.normalize()));
        camera
    }

    #[test]
    fn newer_cycle_wins_over_stale_one() {
        let mut ctl = controller_with(source());
        let mut sphere = Sphere::default();
        ctl.select_panorama("hall", &panorama());

        let first = ctl.load(&camera_facing(Vec3::new(1.0, 0.1, 0.0))).unwrap();
        let second = ctl.load(&camera_facing(Vec3::new(-1.0, 0.1, 0.0))).unwrap();
        assert!(first.is_some() && second.is_some());

        assert_eq!(ctl.poll(&mut sphere).unwrap(), 1);
        let map = sphere.material.map.clone().unwrap();
        // Facing -X shows tile (0, 0) only.
        assert_eq!(map.get_pixel(10, 10), &GREEN);
        assert_eq!(map.get_pixel(300, 10), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn identical_request_is_not_restarted() {
        let mut ctl = controller_with(source());
        ctl.select_panorama("hall", &panorama());
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));
        assert!(ctl.load(&camera).unwrap().is_some());
        assert!(ctl.load(&camera).unwrap().is_none());
        assert_eq!(ctl.pending_cycles(), 1);
    }

    #[test]
    fn failed_tile_does_not_stall_cycle() {
        let mut src = source();
        src.0.remove("p/h/1_0");
        let mut ctl = controller_with(src);
        let events = ctl.subscribe();
        let mut sphere = Sphere::default();
        ctl.select_panorama("hall", &panorama());

        let mut camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));
        camera.on_scroll(1_000.0);
        // fov 90 selects the prerendered "low" level: both tiles load.
        ctl.load(&camera).unwrap();
        ctl.poll(&mut sphere).unwrap();
        sphere.material.take_update();

        camera.on_scroll(-1_000.0);
        ctl.load(&camera).unwrap();
        assert_eq!(ctl.poll(&mut sphere).unwrap(), 1);

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got.iter().filter(|e| **e == LoadEvent::LoadEnded).count(), 2);
        assert!(sphere.material.needs_update);
        assert!(!ctl.cache().is_cached("p/h/1_0"));
    }

    #[test]
    fn background_is_rebound_per_panorama() {
        let mut ctl = controller_with(source());
        let mut sphere = Sphere::default();
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));

        ctl.activate_panorama("hall", &panorama(), &camera).unwrap();
        ctl.poll(&mut sphere).unwrap();
        assert!(ctl.compositor().background().is_some());

        let map = sphere.material.map.clone().unwrap();
        assert_eq!(map.get_pixel(300, 10), &RED);
        assert!(close(map.get_pixel(10, 10), BLUE));
        assert!(close(map.get_pixel(10, 300), BLUE));

        ctl.select_panorama("yard", &panorama());
        assert!(ctl.compositor().background().is_none());
        assert_eq!(ctl.active_panorama(), Some("yard"));
    }

    #[test]
    fn late_background_relayers_applied_foreground() {
        let mut ctl = controller_with(source());
        let mut sphere = Sphere::default();
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));
        ctl.select_panorama("hall", &panorama());

        ctl.load(&camera).unwrap();
        ctl.poll(&mut sphere).unwrap();
        let before = sphere.material.take_update().unwrap();
        assert_eq!(before.get_pixel(10, 10), &Rgba([0, 0, 0, 0]));

        ctl.preload_background().unwrap();
        assert_eq!(ctl.poll(&mut sphere).unwrap(), 1);
        let after = sphere.material.take_update().unwrap();
        assert!(close(after.get_pixel(10, 10), BLUE));
        assert_eq!(after.get_pixel(300, 10), &RED);
    }

    #[test]
    fn cycles_of_previous_panorama_are_dropped() {
        let mut ctl = controller_with(source());
        let mut sphere = Sphere::default();
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));
        ctl.activate_panorama("hall", &panorama(), &camera).unwrap();
        ctl.select_panorama("yard", &panorama());

        assert_eq!(ctl.poll(&mut sphere).unwrap(), 0);
        assert!(sphere.material.map.is_none());
        assert!(ctl.compositor().background().is_none());
    }

    #[test]
    fn failed_tiles_are_requested_again_for_same_view() {
        let source = Arc::new(FlakySource::default());
        let mut ctl =
            TileStreamingController::new(TileCache::new(TileWorkers::inline(source.clone())));
        let mut sphere = Sphere::default();
        ctl.select_panorama("hall", &panorama());
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));

        assert!(ctl.load(&camera).unwrap().is_some());
        ctl.poll(&mut sphere).unwrap();
        let holed = sphere.material.take_update().unwrap();
        assert_eq!(holed.get_pixel(300, 10), &Rgba([0, 0, 0, 0]));

        assert!(ctl.load(&camera).unwrap().is_some());
        assert_eq!(*source.calls.lock().unwrap(), 2);
        ctl.poll(&mut sphere).unwrap();
        let filled = sphere.material.take_update().unwrap();
        assert_eq!(filled.get_pixel(300, 10), &RED);

        // Nothing failed this time, so the same view is not requested again.
        assert!(ctl.load(&camera).unwrap().is_none());
    }

    #[test]
    fn composite_failure_does_not_lose_other_cycles() {
        let mut huge = panorama();
        huge.tile_grid_by_level.insert("high".into(), TileGrid::new(65, 1));
        huge.prerender_by_level.insert("high".into(), true);

        let mut ctl = controller_with(source());
        let events = ctl.subscribe();
        let mut sphere = Sphere::default();
        ctl.select_panorama("hall", &huge);

        ctl.load(&camera_facing(Vec3::X)).unwrap();
        ctl.preload_background().unwrap();
        let err = ctl.poll(&mut sphere).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::Composite(CompositeError::SurfaceUnavailable { width: 16640, .. })
        ));

        assert_eq!(ctl.pending_cycles(), 0);
        assert!(ctl.compositor().background().is_some());
        let got: Vec<_> = events.try_iter().collect();
        let started = got.iter().filter(|e| matches!(e, LoadEvent::LoadStarted { .. })).count();
        let ended = got.iter().filter(|e| **e == LoadEvent::LoadEnded).count();
        assert_eq!((started, ended), (2, 2));
    }

    #[test]
    fn switching_panorama_ends_old_cycles_and_ignores_their_tiles() {
        let mut ctl = controller_with(source());
        let events = ctl.subscribe();
        let mut sphere = Sphere::default();
        let camera = camera_facing(Vec3::new(1.0, 0.1, 0.0));
        ctl.activate_panorama("hall", &panorama(), &camera).unwrap();
        assert_eq!(events.try_iter().count(), 2);

        ctl.select_panorama("yard", &panorama());
        ctl.poll(&mut sphere).unwrap();

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got, vec![LoadEvent::LoadEnded, LoadEvent::LoadEnded]);
        assert!(sphere.material.map.is_none());
    }

    #[test]
    fn load_without_panorama_is_a_no_op() {
        let mut ctl = controller_with(source());
        let camera = camera_facing(Vec3::X);
        assert!(ctl.load(&camera).unwrap().is_none());
        assert!(ctl.preload_background().unwrap().is_none());
    }
}
