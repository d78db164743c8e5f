//! Interactive 3D group-affinity particle viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns a [`Simulation`] plus the
//! settings being edited, and implements [`eframe::App`] to render and
//! control it through an egui UI.

use eframe::App;
use glam::{Quat, Vec2, Vec3};
use sim_core::{
    config::{EnvironmentSettings, MAX_GRID_RESOLUTION},
    error::SimError,
    simulation::{ResetRequest, Simulation},
    types::GroupId,
};

/// Yaw speed of the auto-orbiting camera, radians per second.
const ORBIT_SPEED: f32 = 0.2;

/// Fixed step used by the "Step" button.
const MANUAL_STEP_DT: f32 = 1.0 / 60.0;

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The simulation core: [`Simulation`] and the [`EnvironmentSettings`],
///   population size and seed it is (re)built from.
/// - Camera state (pan/zoom plus an orbiting yaw/pitch).
/// - eframe/egui callbacks for drawing and user interaction.
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true`, call [`Viewer::step_once`] with the frame time.
/// 3. Render the particles back to front, colored by group.
///
/// Edited settings only reach the simulation through a reset. While the
/// simulation runs, the reset is queued and takes effect after the next tick.
pub struct Viewer {
    sim: Simulation,

    settings: EnvironmentSettings,
    count: usize,
    group_count: usize,
    seed: u64,
    use_seed: bool,
    last_error: Option<String>,

    running: bool,
    time_scale: f32,
    zoom: f32,
    pan: egui::Vec2,
    yaw: f32,
    pitch: f32,
    orbit: bool,
    show_orientation: bool,

    last_step_dt: f32,
}

impl Viewer {
    /// Creates a viewer around a fresh unseeded population of 4096
    /// particles in 8 groups with default settings.
    pub fn new() -> Result<Self, SimError> {
        let settings = EnvironmentSettings::default();
        let count = 4096;
        let group_count = 8;
        let sim = Simulation::new(None, count, group_count, settings)?;
        log::info!("spawned {count} particles in {group_count} groups");

        Ok(Self {
            sim,
            settings,
            count,
            group_count,
            seed: 0,
            use_seed: false,
            last_error: None,
            running: false,
            time_scale: 1.0,
            zoom: 12.0,
            pan: egui::vec2(0.0, 0.0),
            yaw: 0.0,
            pitch: 0.35,
            orbit: true,
            show_orientation: false,
            last_step_dt: 0.0,
        })
    }

    fn reset_request(&self) -> ResetRequest {
        ResetRequest {
            seed: self.use_seed.then_some(self.seed),
            count: self.count,
            group_count: self.group_count,
            settings: self.settings,
        }
    }

    /// Rebuilds the simulation from the edited settings.
    ///
    /// While running, the reset is queued behind the current tick;
    /// otherwise it happens immediately. Invalid settings are reported in
    /// the status bar and leave the running simulation untouched.
    fn reset(&mut self) {
        let request = self.reset_request();
        let result = if self.running {
            self.sim.request_reset(request)
        } else {
            self.sim.reset(
                request.seed,
                request.count,
                request.group_count,
                request.settings,
            )
        };

        match result {
            Ok(()) => self.last_error = None,
            Err(e) => {
                log::warn!("rejected reset: {e}");
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Advances the simulation by `dt` seconds of simulated time.
    ///
    /// A failing tick stops auto-running and surfaces the error.
    fn step_once(&mut self, dt: f32) {
        match self.sim.tick(dt) {
            Ok(()) => self.last_step_dt = dt,
            Err(e) => {
                log::error!("tick failed: {e}");
                self.last_error = Some(e.to_string());
                self.running = false;
            }
        }
    }

    /// Camera rotation: yaw about the vertical axis, then pitch.
    fn camera_rotation(&self) -> Quat {
        Quat::from_rotation_x(self.pitch) * Quat::from_rotation_y(self.yaw)
    }

    /// Rotates a world position into view space. `z` grows toward the viewer.
    fn to_view(&self, p: Vec3) -> Vec3 {
        self.camera_rotation() * p
    }

    /// Converts a view-plane position to screen-space.
    ///
    /// View coordinates are scaled by `zoom`, offset by `pan`, and then
    /// centered inside the given `rect`. The y-axis is flipped so that
    /// positive y goes up.
    fn view_to_screen(&self, p: Vec2, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x * self.zoom + self.pan.x,
            center.y - p.y * self.zoom + self.pan.y,
        )
    }

    /// Converts a screen-space position back to the view plane.
    ///
    /// This is the inverse of [`Viewer::view_to_screen`] (up to floating
    /// point rounding).
    fn screen_to_view(&self, p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        Vec2::new(x, y)
    }

    /// Display color of a group: hue = group / group count.
    fn group_color(group: GroupId, group_count: usize) -> egui::Color32 {
        let hue = group as f32 / group_count.max(1) as f32;
        egui::ecolor::Hsva::new(hue, 1.0, 1.0, 1.0).into()
    }

    /// Mean particle speed, shown in the status bar.
    fn mean_speed(&self) -> f32 {
        if self.sim.is_empty() {
            return 0.0;
        }
        let total: f32 = self.sim.velocities().iter().map(|v| v.length()).sum();
        total / self.sim.len() as f32
    }

    /// Helper to draw a labeled `f32` [`egui::DragValue`].
    fn labeled_drag_f32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f32,
        range: std::ops::RangeInclusive<f32>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Helper to draw a labeled `usize` [`egui::DragValue`].
    fn labeled_drag_usize(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut usize,
        range: std::ops::RangeInclusive<usize>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, camera).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(if self.running { "⏸ Pause" } else { "▶ Run" })
                    .clicked()
                {
                    self.running = !self.running;
                }

                if ui.button("Step").clicked() {
                    self.step_once(MANUAL_STEP_DT);
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.time_scale, 0.0..=4.0).text("Speed"));
                ui.add(egui::Slider::new(&mut self.zoom, 1.0..=60.0).text("Zoom"));
                ui.checkbox(&mut self.orbit, "Orbit");
                ui.checkbox(&mut self.show_orientation, "Headings");
            });
        });
    }

    /// Builds the bottom status bar (tick, population, speed, errors).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt last = {:.4} s", self.last_step_dt));
                ui.label(format!("tick = {}", self.sim.tick_count()));
                ui.separator();
                ui.label(format!("mean speed = {:.3}", self.mean_speed()));
                ui.label(format!(
                    "particles = {} in {} groups",
                    self.sim.len(),
                    self.sim.group_count()
                ));
                if self.sim.pending_reset().is_some() {
                    ui.label("reset pending");
                }
                if let Some(err) = &self.last_error {
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                }
            });
        });
    }

    /// Builds the right-hand panel for population and environment settings.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Population");
                    Self::labeled_drag_usize(ui, "particles:", &mut self.count, 0..=50_000, 16.0);
                    Self::labeled_drag_usize(ui, "groups:", &mut self.group_count, 1..=32, 0.1);
                    ui.horizontal(|ui| {
                        ui.checkbox(&mut self.use_seed, "seed:");
                        ui.add_enabled(self.use_seed, egui::DragValue::new(&mut self.seed));
                    });

                    ui.separator();
                    ui.label("Environment");
                    let s = &mut self.settings;
                    Self::labeled_drag_f32(ui, "mass:", &mut s.mass, 0.01..=100.0, 0.01);
                    Self::labeled_drag_f32(ui, "drag:", &mut s.drag, 0.0..=10.0, 0.01);
                    Self::labeled_drag_f32(ui, "max_radius:", &mut s.max_radius, 0.5..=500.0, 0.1);
                    ui.horizontal(|ui| {
                        ui.label("grid_resolution:");
                        ui.add(
                            egui::DragValue::new(&mut s.grid_resolution)
                                .range(1..=MAX_GRID_RESOLUTION)
                                .speed(0.1),
                        );
                    });
                    Self::labeled_drag_f32(
                        ui,
                        "max_time_step:",
                        &mut s.max_time_step,
                        0.001..=1.0,
                        0.001,
                    );

                    ui.separator();
                    ui.label("Kernel");
                    let k = &mut s.kernel;
                    Self::labeled_drag_f32(
                        ui,
                        "repulsion_decay:",
                        &mut k.repulsion_decay,
                        0.0..=50.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "repulsion_gain:",
                        &mut k.repulsion_gain,
                        0.0..=50.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "attraction_decay:",
                        &mut k.attraction_decay,
                        0.0..=50.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "attraction_gain:",
                        &mut k.attraction_gain,
                        0.0..=50.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(ui, "edge_decay:", &mut k.edge_decay, 0.0..=50.0, 0.05);
                    Self::labeled_drag_f32(ui, "edge_gain:", &mut k.edge_gain, 0.0..=100.0, 0.05);
                    Self::labeled_drag_f32(
                        ui,
                        "swirl_gain:",
                        &mut k.swirl_gain,
                        -10.0..=10.0,
                        0.01,
                    );

                    ui.separator();
                    ui.label("Affinity range");
                    Self::labeled_drag_f32(ui, "min:", &mut s.affinity_range.0, -10.0..=10.0, 0.01);
                    Self::labeled_drag_f32(ui, "max:", &mut s.affinity_range.1, -10.0..=10.0, 0.01);

                    ui.separator();
                    ui.label("Spawn");
                    Self::labeled_drag_f32(
                        ui,
                        "half_extent:",
                        &mut s.spawn.half_extent,
                        0.0..=500.0,
                        0.1,
                    );

                    ui.separator();
                    let cutoff = s.effective_cutoff(sim_core::config::CUTOFF_THRESHOLD);
                    ui.label(format!("kernel cutoff = {cutoff:.2}, cell = {:.2}", s.cell_width()));

                    ui.horizontal(|ui| {
                        if ui.button("Apply").clicked() {
                            self.reset();
                        }
                        if ui.button("Defaults").clicked() {
                            self.settings = EnvironmentSettings::default();
                        }
                    });

                    ui.separator();
                    ui.label("Affinity (row → column)");
                    self.ui_affinity_matrix(ui);
                });
            });
    }

    /// Draws the current affinity matrix as a heat map, green attracts and
    /// red repels.
    fn ui_affinity_matrix(&self, ui: &mut egui::Ui) {
        let g = self.sim.group_count();
        let cell = (200.0 / g as f32).clamp(4.0, 24.0);
        let size = egui::vec2(cell * (g + 1) as f32, cell * (g + 1) as f32);
        let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
        let painter = ui.painter_at(rect);

        for a in 0..g {
            let origin = rect.min + egui::vec2(0.0, cell * (a + 1) as f32);
            let swatch = egui::Rect::from_min_size(origin, egui::vec2(cell, cell)).shrink(1.0);
            painter.rect_filled(swatch, 0.0, Self::group_color(a, g));
            let origin = rect.min + egui::vec2(cell * (a + 1) as f32, 0.0);
            let swatch = egui::Rect::from_min_size(origin, egui::vec2(cell, cell)).shrink(1.0);
            painter.rect_filled(swatch, 0.0, Self::group_color(a, g));

            for b in 0..g {
                let v = self.sim.affinity(a, b).clamp(-1.0, 1.0);
                let strength = (v.abs() * 255.0) as u8;
                let color = if v >= 0.0 {
                    egui::Color32::from_rgb(0, strength, 0)
                } else {
                    egui::Color32::from_rgb(strength, 0, 0)
                };
                let origin = rect.min + egui::vec2(cell * (b + 1) as f32, cell * (a + 1) as f32);
                painter.rect_filled(
                    egui::Rect::from_min_size(origin, egui::vec2(cell, cell)).shrink(0.5),
                    0.0,
                    color,
                );
            }
        }
    }

    /// Builds the central panel where particles are drawn.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);
            painter.rect_filled(rect, 0.0, egui::Color32::from_gray(12));

            // Left drag pans, right drag turns the camera.
            if response.dragged_by(egui::PointerButton::Primary) {
                self.pan += response.drag_delta();
            }
            if response.dragged_by(egui::PointerButton::Secondary) {
                let d = response.drag_delta();
                self.yaw += d.x * 0.01;
                self.pitch = (self.pitch + d.y * 0.01).clamp(-1.5, 1.5);
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let view_before = self.screen_to_view(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(1.0, 60.0);

                let screen_after = self.view_to_screen(view_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            // Confinement boundary outline.
            let center = self.view_to_screen(Vec2::ZERO, rect);
            painter.circle_stroke(
                center,
                self.sim.settings().max_radius * self.zoom,
                egui::Stroke::new(1.0, egui::Color32::from_gray(60)),
            );

            // Back to front so nearer particles cover farther ones.
            let mut order: Vec<(usize, Vec3)> = self
                .sim
                .positions()
                .iter()
                .enumerate()
                .map(|(i, &p)| (i, self.to_view(p)))
                .collect();
            order.sort_unstable_by(|a, b| a.1.z.total_cmp(&b.1.z));

            let max_radius = self.sim.settings().max_radius;
            let group_count = self.sim.group_count();
            for (i, v) in order {
                let p = self.view_to_screen(v.truncate(), rect);
                if !rect.contains(p) {
                    continue;
                }
                let depth = (v.z / max_radius).clamp(-1.0, 1.0);
                let r = (0.12 * self.zoom * (1.0 + 0.3 * depth)).max(1.0);
                let color = Self::group_color(self.sim.group(i), group_count);
                painter.circle_filled(p, r, color);

                if self.show_orientation {
                    let heading = self.to_view(self.sim.orientation(i)).truncate();
                    let tip = self.view_to_screen(v.truncate() + heading * 0.4, rect);
                    painter.line_segment([p, tip], egui::Stroke::new(1.0, color));
                }
            }

            let frame_dt = ctx.input(|i| i.stable_dt);
            if self.orbit {
                self.yaw += ORBIT_SPEED * frame_dt;
            }

            // Auto-run simulation if requested.
            if self.running {
                self.step_once(frame_dt * self.time_scale);
            }
            if self.running || self.orbit {
                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rect() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::new(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    fn small_viewer() -> Viewer {
        let mut viewer = Viewer::new().unwrap();
        viewer.count = 64;
        viewer.group_count = 3;
        viewer.use_seed = true;
        viewer.seed = 11;
        viewer.reset();
        viewer
    }

    #[test]
    fn view_to_screen_and_back_is_roundtrip() {
        let mut viewer = small_viewer();
        viewer.zoom = 2.0;
        viewer.pan = egui::vec2(15.0, -7.0);
        let rect = test_rect();

        let eps = 1e-4;
        for p in [Vec2::new(0.0, 0.0), Vec2::new(10.0, -5.0), Vec2::new(-3.5, 8.25)] {
            let back = viewer.screen_to_view(viewer.view_to_screen(p, rect), rect);
            assert!(
                (back - p).length() < eps,
                "roundtrip mismatch: p={:?}, back={:?}",
                p,
                back
            );
        }
    }

    #[test]
    fn to_view_is_a_rotation() {
        let mut viewer = small_viewer();
        viewer.yaw = 1.1;
        viewer.pitch = -0.4;

        let p = Vec3::new(3.0, -2.0, 7.5);
        let v = viewer.to_view(p);
        assert!((v.length() - p.length()).abs() < 1e-4);

        viewer.yaw = 0.0;
        viewer.pitch = 0.0;
        assert!((viewer.to_view(p) - p).length() < 1e-6);
    }

    #[test]
    fn group_colors_are_distinct_hues() {
        let a = Viewer::group_color(0, 4);
        let b = Viewer::group_color(1, 4);
        let c = Viewer::group_color(2, 4);
        assert_ne!(a, b);
        assert_ne!(b, c);
        // Hue 0 is pure red.
        assert_eq!(a, egui::Color32::from_rgb(255, 0, 0));
    }

    #[test]
    fn reset_rebuilds_from_edited_settings() {
        let mut viewer = small_viewer();
        assert_eq!(viewer.sim.len(), 64);
        assert_eq!(viewer.sim.group_count(), 3);
        assert_eq!(viewer.sim.seed(), Some(11));

        viewer.count = 10;
        viewer.settings.drag = 0.25;
        viewer.reset();

        assert_eq!(viewer.sim.len(), 10);
        assert_eq!(viewer.sim.settings().drag, 0.25);
        assert!(viewer.last_error.is_none());
    }

    #[test]
    fn invalid_settings_keep_current_simulation() {
        let mut viewer = small_viewer();
        viewer.settings.mass = 0.0;
        viewer.count = 5;

        viewer.reset();

        assert_eq!(viewer.sim.len(), 64);
        assert!(viewer.last_error.is_some());
    }

    #[test]
    fn reset_while_running_is_deferred_to_next_tick() {
        let mut viewer = small_viewer();
        viewer.running = true;
        viewer.count = 20;

        viewer.reset();
        assert_eq!(viewer.sim.len(), 64);
        assert!(viewer.sim.pending_reset().is_some());

        viewer.step_once(0.01);
        assert_eq!(viewer.sim.len(), 20);
    }

    #[test]
    fn invalid_settings_while_running_are_not_queued() {
        let mut viewer = small_viewer();
        viewer.running = true;
        viewer.settings.max_radius = -1.0;

        viewer.reset();
        assert!(viewer.last_error.is_some());
        assert!(viewer.sim.pending_reset().is_none());

        viewer.step_once(0.01);
        assert!(viewer.running);
        assert_eq!(viewer.sim.len(), 64);
        assert_eq!(viewer.sim.tick_count(), 1);
    }

    #[test]
    fn step_once_advances_the_simulation() {
        let mut viewer = small_viewer();
        let before = viewer.sim.positions().to_vec();

        viewer.step_once(MANUAL_STEP_DT);

        assert_eq!(viewer.sim.tick_count(), 1);
        assert_eq!(viewer.last_step_dt, MANUAL_STEP_DT);
        assert_ne!(viewer.sim.positions(), before.as_slice());
    }

    #[test]
    fn failing_step_stops_auto_run() {
        let mut viewer = small_viewer();
        viewer.running = true;

        viewer.step_once(f32::NAN);

        assert!(!viewer.running);
        assert!(viewer.last_error.is_some());
        assert_eq!(viewer.sim.tick_count(), 0);
    }
}
