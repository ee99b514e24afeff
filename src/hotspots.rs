// hotspots.rs - navigation markers linking panoramas

use crate::camera::{screen_to_ndc, CameraRig};
use crate::panorama::HotspotDescriptor;
use crate::scene::{MarkerMesh, ObjectId, Scene, MARKER_RADIUS};
use glam::{Vec2, Vec3};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub mesh: ObjectId,
    pub target_panorama: String,
    pub position: Vec3,
}

/// Markers of the active panorama, keyed by generated id. Ids increase
/// monotonically, so map order is registration order.
#[derive(Debug, Default)]
pub struct NavigationHotspotManager {
    hotspots: BTreeMap<u64, Hotspot>,
    next_id: u64,
}

impl NavigationHotspotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one marker per descriptor, turned toward the camera's current
    /// position, and add it to the scene.
    pub fn create_hotspots(
        &mut self,
        buttons: &[HotspotDescriptor],
        camera: &CameraRig,
        scene: &mut Scene,
    ) {
        for button in buttons {
            let position = Vec3::from(button.position);
            let mesh = scene.add(MarkerMesh::facing(position, camera.position(), MARKER_RADIUS));
            let id = self.next_id;
            self.next_id += 1;
            self.hotspots.insert(
                id,
                Hotspot {
                    mesh,
                    target_panorama: button.next_panorama_key.clone(),
                    position,
                },
            );
        }
        log::debug!("created {} hotspots", buttons.len());
    }

    /// Remove every registered marker from the scene and forget it.
    pub fn delete_all_hotspots(&mut self, scene: &mut Scene) {
        for (_, hotspot) in std::mem::take(&mut self.hotspots) {
            scene.remove(hotspot.mesh);
        }
    }

    pub fn len(&self) -> usize {
        self.hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotspots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hotspot> {
        self.hotspots.values()
    }

    /// Resolve a click at pixel `pos`. Markers are tested in registration
    /// order and the first one the ray crosses wins, even if another marker is
    /// nearer along the ray.
    pub fn resolve_click(
        &self,
        pos: Vec2,
        viewport: (u32, u32),
        camera: &CameraRig,
        scene: &Scene,
    ) -> Option<&Hotspot> {
        let ray = camera.ray_from_ndc(screen_to_ndc(pos, viewport));
        self.hotspots.values().find(|hotspot| {
            scene
                .get(hotspot.mesh)
                .and_then(|mesh| ray.intersect_disc(mesh))
                .is_some()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerSettings;
    use crate::panorama::Position;

    fn button(x: f32, y: f32, z: f32, target: &str) -> HotspotDescriptor {
        HotspotDescriptor { position: Position { x, y, z }, next_panorama_key: target.into() }
    }

    fn camera() -> CameraRig {
        CameraRig::new(&ViewerSettings::default(), 1.0)
    }

    #[test]
    fn create_and_delete_keep_scene_in_sync() {
        let cam = camera();
        let mut scene = Scene::new();
        let mut manager = NavigationHotspotManager::new();
        manager.create_hotspots(
            &[button(0.0, 0.0, -20.0, "a"), button(10.0, 0.0, 0.0, "b")],
            &cam,
            &mut scene,
        );
        assert_eq!(manager.len(), 2);
        assert_eq!(scene.len(), 2);

        manager.delete_all_hotspots(&mut scene);
        assert!(manager.is_empty());
        assert!(scene.is_empty());
    }

    #[test]
    fn markers_face_the_camera() {
        let cam = camera();
        let mut scene = Scene::new();
        let mut manager = NavigationHotspotManager::new();
        manager.create_hotspots(&[button(0.0, 0.0, -20.0, "a")], &cam, &mut scene);
        let hotspot = manager.iter().next().unwrap();
        let mesh = scene.get(hotspot.mesh).unwrap();
        assert!(mesh.normal.distance(Vec3::Z) < 1e-5);
    }

    #[test]
    fn click_at_center_hits_marker_ahead() {
        let cam = camera();
        let mut scene = Scene::new();
        let mut manager = NavigationHotspotManager::new();
        manager.create_hotspots(
            &[button(30.0, 0.0, 0.0, "side"), button(0.0, 0.0, -20.0, "ahead")],
            &cam,
            &mut scene,
        );
        let hit = manager.resolve_click(Vec2::new(400.0, 300.0), (800, 600), &cam, &scene);
        assert_eq!(hit.map(|h| h.target_panorama.as_str()), Some("ahead"));

        let miss = manager.resolve_click(Vec2::new(5.0, 5.0), (800, 600), &cam, &scene);
        assert!(miss.is_none());
    }

    #[test]
    fn first_registered_marker_wins_over_nearer_one() {
        let cam = camera();
        let mut scene = Scene::new();
        let mut manager = NavigationHotspotManager::new();
        manager.create_hotspots(
            &[button(0.0, 0.0, -40.0, "far"), button(0.0, 0.0, -10.0, "near")],
            &cam,
            &mut scene,
        );
        let hit = manager.resolve_click(Vec2::new(400.0, 300.0), (800, 600), &cam, &scene);
        assert_eq!(hit.map(|h| h.target_panorama.as_str()), Some("far"));
    }
}
