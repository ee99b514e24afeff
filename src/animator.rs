// animator.rs - hotspot transition: rotate toward the target, then zoom in
//
// Driven by `tick(now, camera)` from the render loop. Progress is measured in
// wall-clock time, so frame rate does not change the duration.

use crate::camera::CameraRig;
use glam::{Quat, Vec3};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Rotate { from: Quat, to: Quat },
    Zoom { from_fov: f32 },
}

#[derive(Debug, Clone)]
struct Transition<T> {
    phase: Phase,
    started: Instant,
    progress: f32,
    on_complete: T,
}

/// Two-phase camera animation carrying a completion token `T` that is handed
/// back from `tick` once the zoom phase finishes.
#[derive(Debug)]
pub struct CameraAnimator<T> {
    duration: Duration,
    target_fov: f32,
    active: Option<Transition<T>>,
}

impl<T> CameraAnimator<T> {
    pub fn new(duration: Duration, target_fov: f32) -> Self {
        Self { duration, target_fov, active: None }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.active.as_ref().map(|t| t.phase)
    }

    pub fn progress(&self) -> Option<f32> {
        self.active.as_ref().map(|t| t.progress)
    }

    /// Start turning toward `target`. Replaces any transition in progress;
    /// the replaced one never completes.
    pub fn start(&mut self, camera: &CameraRig, target: Vec3, now: Instant, on_complete: T) {
        let phase = Phase::Rotate {
            from: camera.orientation(),
            to: camera.look_at_rotation(target),
        };
        self.active = Some(Transition { phase, started: now, progress: 0.0, on_complete });
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.active.take().map(|t| t.on_complete)
    }

    fn progress_at(&self, started: Instant, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(started).as_secs_f32();
        (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Advance the animation to `now`. Returns the completion token on the
    /// frame the zoom phase reaches its end.
    pub fn tick(&mut self, now: Instant, camera: &mut CameraRig) -> Option<T> {
        let (phase, started) = {
            let t = self.active.as_ref()?;
            (t.phase, t.started)
        };
        let progress = self.progress_at(started, now);

        match phase {
            Phase::Rotate { from, to } => {
                camera.set_orientation(from.slerp(to, progress));
                let t = self.active.as_mut()?;
                if progress >= 1.0 {
                    t.phase = Phase::Zoom { from_fov: camera.fov() };
                    t.started = now;
                    t.progress = 0.0;
                } else {
                    t.progress = progress;
                }
                None
            }
            Phase::Zoom { from_fov } => {
                camera.set_fov(from_fov + (self.target_fov - from_fov) * progress);
                if progress >= 1.0 {
                    return self.active.take().map(|t| t.on_complete);
                }
                if let Some(t) = self.active.as_mut() {
                    t.progress = progress;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerSettings;

    fn setup() -> (CameraRig, CameraAnimator<&'static str>, Instant) {
        let camera = CameraRig::new(&ViewerSettings::default(), 1.5);
        let animator = CameraAnimator::new(Duration::from_millis(800), 30.0);
        (camera, animator, Instant::now())
    }

    fn ms(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn rotates_then_zooms_then_completes() {
        let (mut camera, mut animator, t0) = setup();
        let target = Vec3::new(20.0, 0.0, 2.0);
        animator.start(&camera, target, t0, "yard");

        assert_eq!(animator.tick(ms(t0, 400), &mut camera), None);
        assert!(matches!(animator.phase(), Some(Phase::Rotate { .. })));
        assert!((animator.progress().unwrap() - 0.5).abs() < 1e-3);
        assert_eq!(camera.fov(), 75.0);

        // Rotation ends; the zoom timer starts at this frame.
        assert_eq!(animator.tick(ms(t0, 900), &mut camera), None);
        assert!(matches!(animator.phase(), Some(Phase::Zoom { .. })));
        assert!(camera.forward().distance(Vec3::X) < 1e-3);

        assert_eq!(animator.tick(ms(t0, 1300), &mut camera), None);
        assert!((camera.fov() - 52.5).abs() < 1e-2);

        assert_eq!(animator.tick(ms(t0, 1700), &mut camera), Some("yard"));
        assert_eq!(camera.fov(), 30.0);
        assert!(!animator.is_running());
        assert_eq!(animator.tick(ms(t0, 1800), &mut camera), None);
    }

    #[test]
    fn progress_depends_on_time_not_frames() {
        let (mut a_cam, mut a, t0) = setup();
        let (mut b_cam, mut b, _) = setup();
        let target = Vec3::new(0.0, 10.0, -10.0);
        a.start(&a_cam, target, t0, "x");
        b.start(&b_cam, target, t0, "x");

        for step in 1..=30 {
            a.tick(ms(t0, step * 10), &mut a_cam);
        }
        b.tick(ms(t0, 300), &mut b_cam);
        assert!(a_cam.orientation().angle_between(b_cam.orientation()) < 1e-4);
    }

    #[test]
    fn new_animation_overrides_previous() {
        let (mut camera, mut animator, t0) = setup();
        animator.start(&camera, Vec3::X * 10.0, t0, "first");
        animator.tick(ms(t0, 200), &mut camera);
        animator.start(&camera, Vec3::NEG_X * 10.0, ms(t0, 200), "second");

        let mut finished = Vec::new();
        for step in 0..40 {
            if let Some(done) = animator.tick(ms(t0, 200 + step * 50), &mut camera) {
                finished.push(done);
            }
        }
        assert_eq!(finished, vec!["second"]);
    }

    #[test]
    fn zero_duration_finishes_in_two_frames() {
        let mut camera = CameraRig::new(&ViewerSettings::default(), 1.0);
        let mut animator = CameraAnimator::new(Duration::ZERO, 40.0);
        let t0 = Instant::now();
        animator.start(&camera, Vec3::new(0.0, 0.0, -5.0), t0, 7);
        assert_eq!(animator.tick(t0, &mut camera), None);
        assert_eq!(animator.tick(t0, &mut camera), Some(7));
        assert_eq!(camera.fov(), 40.0);
    }
}
