// scene.rs - the small scene graph the viewer draws: one textured sphere plus
// clickable marker discs

use glam::Vec3;
use image::RgbaImage;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Radius of the panorama sphere, in world units.
pub const SPHERE_RADIUS: f32 = 500.0;

/// Radius of a hotspot marker disc.
pub const MARKER_RADIUS: f32 = 1.0;

#[derive(Debug, Default, Clone)]
pub struct Material {
    pub map: Option<Arc<RgbaImage>>,
    /// Set whenever `map` changes; cleared by the renderer after upload.
    pub needs_update: bool,
}

impl Material {
    pub fn set_map(&mut self, map: Arc<RgbaImage>) {
        self.map = Some(map);
        self.needs_update = true;
    }

    /// Hand the map to the uploader if it changed since the last call.
    pub fn take_update(&mut self) -> Option<Arc<RgbaImage>> {
        if !self.needs_update {
            return None;
        }
        self.needs_update = false;
        self.map.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Sphere {
    pub radius: f32,
    pub material: Material,
}

impl Default for Sphere {
    fn default() -> Self {
        Self { radius: SPHERE_RADIUS, material: Material::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

/// Flat disc facing along `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerMesh {
    pub center: Vec3,
    pub normal: Vec3,
    pub radius: f32,
}

impl MarkerMesh {
    /// Disc at `center` turned toward `eye`.
    pub fn facing(center: Vec3, eye: Vec3, radius: f32) -> Self {
        let normal = (eye - center).try_normalize().unwrap_or(Vec3::Z);
        Self { center, normal, radius }
    }

    /// Axes spanning the disc: `right` stays horizontal and `up` leans
    /// toward world +Y. The navigation arrow is drawn along `up`.
    pub fn axes(&self) -> (Vec3, Vec3) {
        let right = Vec3::Y.cross(self.normal).try_normalize().unwrap_or(Vec3::X);
        let up = self.normal.cross(right);
        (right, up)
    }
}

/// Scene container. Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct Scene {
    objects: BTreeMap<ObjectId, MarkerMesh>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mesh: MarkerMesh) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, mesh);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<MarkerMesh> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&MarkerMesh> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &MarkerMesh)> {
        self.objects.iter().map(|(id, m)| (*id, m))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction: direction.normalize_or_zero() }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to the disc, if it is hit in front of the origin.
    pub fn intersect_disc(&self, disc: &MarkerMesh) -> Option<f32> {
        let denom = self.direction.dot(disc.normal);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = (disc.center - self.origin).dot(disc.normal) / denom;
        if t < 0.0 {
            return None;
        }
        (self.at(t).distance(disc.center) <= disc.radius).then_some(t)
    }
}
