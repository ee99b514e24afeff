// main.rs - tour viewer window: input, animation, tile streaming and status bar

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod renderer;

use renderer::Renderer;

use glam::Vec2;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;
use tiled_panorama::{
    CameraAnimator, CameraRig, DefaultTileSource, LaunchOptions, LoadEvent,
    LoadingProgressTracker, NavigationHotspotManager, Scene, Sphere, TileCache,
    TileStreamingController, TileWorkers, TourConfig, ViewerError,
};
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};

/// Pointer travel (pixels) below which a press-release counts as a click.
const CLICK_SLOP: f64 = 4.0;

struct Viewer {
    tour: TourConfig,
    camera: CameraRig,
    scene: Scene,
    sphere: Sphere,
    hotspots: NavigationHotspotManager,
    animator: CameraAnimator<String>,
    progress: LoadingProgressTracker,
    controller: TileStreamingController,
    events: Receiver<LoadEvent>,
}

impl Viewer {
    fn new(tour: TourConfig, aspect: f32) -> Result<Self, ViewerError> {
        let settings = tour.viewer.clone();
        let workers = TileWorkers::spawn(Arc::new(DefaultTileSource), settings.fetch_workers);
        let mut controller = TileStreamingController::new(TileCache::new(workers));
        let events = controller.subscribe();

        let mut viewer = Self {
            camera: CameraRig::new(&settings, aspect),
            scene: Scene::new(),
            sphere: Sphere::default(),
            hotspots: NavigationHotspotManager::new(),
            animator: CameraAnimator::new(settings.animation_duration(), settings.hotspot_target_fov),
            progress: LoadingProgressTracker::new(settings.spinner_delay()),
            controller,
            events,
            tour,
        };
        let start = viewer.tour.start.clone();
        viewer.enter_panorama(&start)?;
        Ok(viewer)
    }

    fn enter_panorama(&mut self, key: &str) -> Result<(), ViewerError> {
        let descriptor = self.tour.panorama(key)?;
        self.controller.activate_panorama(key, descriptor, &self.camera)?;
        self.hotspots.create_hotspots(&descriptor.buttons, &self.camera, &mut self.scene);
        Ok(())
    }

    /// Hotspot animation finished: tear down markers, reset the view and
    /// move to the target panorama.
    fn navigate(&mut self, target: &str) {
        self.hotspots.delete_all_hotspots(&mut self.scene);
        self.camera.reset_to_default();
        if let Err(e) = self.enter_panorama(target) {
            log::error!("cannot enter panorama `{target}`: {e}");
        }
    }

    fn reload(&mut self) {
        if let Err(e) = self.controller.load(&self.camera) {
            log::error!("tile load failed: {e}");
        }
    }

    fn click(&mut self, pos: Vec2, viewport: (u32, u32)) {
        if self.animator.is_running() {
            return;
        }
        let hit = self
            .hotspots
            .resolve_click(pos, viewport, &self.camera, &self.scene)
            .map(|h| (h.position, h.target_panorama.clone()));
        if let Some((position, target)) = hit {
            log::info!("hotspot clicked, heading to `{target}`");
            self.animator.start(&self.camera, position, Instant::now(), target);
        }
    }

    /// Per-frame work: animation, finished tiles and the spinner timer.
    fn update(&mut self, now: Instant) {
        let was_animating = self.animator.is_running();
        if let Some(target) = self.animator.tick(now, &mut self.camera) {
            self.navigate(&target);
        } else if was_animating {
            self.reload();
        }

        if let Err(e) = self.controller.poll(&mut self.sphere) {
            log::error!("compositing failed: {e}");
        }
        while let Ok(event) = self.events.try_recv() {
            self.progress.handle(&event, now);
        }
        self.progress.update(now);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = LaunchOptions::from_args(std::env::args().skip(1));
    let tour = match options.load_tour() {
        Ok(tour) => tour,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title("Tiled Panorama")
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(window) => Arc::new(window),
        Err(e) => {
            log::error!("cannot open window: {e}");
            std::process::exit(1);
        }
    };

    let mut renderer = match pollster::block_on(Renderer::new(window.clone())) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let size = renderer.size;
    let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
    let mut viewer = match Viewer::new(tour, aspect) {
        Ok(viewer) => viewer,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut is_fullscreen = false;
    let mut mouse_pressed = false;
    let mut press_pos: Option<PhysicalPosition<f64>> = None;
    let mut last_mouse_pos: Option<PhysicalPosition<f64>> = None;
    let mut cursor = PhysicalPosition::new(0.0, 0.0);
    let mut dragged = false;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        viewer.camera.set_viewport(new_size.width, new_size.height);
                    }

                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::F11) => {
                                    is_fullscreen = !is_fullscreen;
                                    if is_fullscreen {
                                        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                                    } else {
                                        window.set_fullscreen(None);
                                    }
                                }
                                Some(VirtualKeyCode::R) => {
                                    viewer.animator.cancel();
                                    viewer.camera.reset_to_default();
                                    viewer.reload();
                                }
                                _ => {}
                            }
                        }
                    }

                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        mouse_pressed = state == ElementState::Pressed;
                        if mouse_pressed {
                            press_pos = Some(cursor);
                            dragged = false;
                        } else {
                            if !dragged && press_pos.is_some() {
                                let viewport = (renderer.size.width, renderer.size.height);
                                viewer.click(Vec2::new(cursor.x as f32, cursor.y as f32), viewport);
                            }
                            press_pos = None;
                            last_mouse_pos = None;
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        if mouse_pressed && !viewer.animator.is_running() {
                            if let Some(start) = press_pos {
                                let travel = ((position.x - start.x).powi(2)
                                    + (position.y - start.y).powi(2))
                                .sqrt();
                                dragged |= travel > CLICK_SLOP;
                            }
                            if let Some(last_pos) = last_mouse_pos {
                                let dx = (position.x - last_pos.x) as f32;
                                let dy = (position.y - last_pos.y) as f32;
                                let viewport = (renderer.size.width, renderer.size.height);
                                viewer.camera.on_drag(dx, dy, viewport);
                                viewer.reload();
                            }
                            last_mouse_pos = Some(position);
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        // Browser convention: positive delta zooms out.
                        let delta_y = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -y * 100.0,
                            MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
                        };
                        if !viewer.animator.is_running() && viewer.camera.on_scroll(delta_y) {
                            viewer.reload();
                        }
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                viewer.update(Instant::now());

                if let Some(map) = viewer.sphere.material.take_update() {
                    renderer.upload_composite(&map);
                }
                renderer.update_camera(&viewer.camera, &viewer.hotspots, &viewer.scene);

                let render_result = renderer.render_with_ui(&window, |ctx| draw_ui(ctx, &viewer));

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {e:?}"),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn draw_ui(ctx: &egui::Context, viewer: &Viewer) {
    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            let key = viewer.controller.active_panorama().unwrap_or("-");
            ui.label(format!("Panorama: {key}"));
            ui.separator();
            ui.label(format!("FOV: {:.1}°", viewer.camera.fov()));
            ui.separator();
            ui.label(format!("Tiles cached: {}", viewer.controller.cache().len()));

            if viewer.progress.is_loading() {
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("{:.0}%", viewer.progress.progress()));
                    ui.spinner();
                });
            }
        });
    });
}
