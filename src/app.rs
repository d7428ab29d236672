use crate::geometry::{Point, Segment};
use crate::raster::DisplayRaster;
use crate::session::{Flow, Key, MouseButton, SessionController, Surface, SESSION_PALETTE};
use crate::view::{Extent, ScreenFit};
use eframe::egui::{self, Color32};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Colours for segments loaded from an earlier run.
pub const PRIOR_PALETTE: [Color32; 7] = [
    Color32::from_rgb(255, 192, 203), // pink
    Color32::from_rgb(255, 0, 0),     // red
    Color32::from_rgb(0, 128, 0),     // green
    Color32::from_rgb(255, 165, 0),   // orange
    Color32::from_rgb(0, 255, 255),   // cyan
    Color32::from_rgb(255, 0, 255),   // magenta
    Color32::from_rgb(255, 255, 0),   // yellow
];

const WINDOW_SIZE: [f32; 2] = [1100.0, 900.0];
const MARKER_HALF_SIZE: f32 = 5.5;
const MARKER_STROKE: f32 = 1.5;
const PRIOR_POINT_RADIUS: f32 = 2.0;
const PRIOR_OPACITY: f32 = 0.8;

// ── Marker Canvas ───────────────────────────────────────────────────────────

/// Handle for one "+" glyph on the canvas.
#[derive(Debug, PartialEq, Eq)]
pub struct MarkerId(u64);

struct PlacedMarker {
    at: Point,
    color: Color32,
}

/// Retained marker layer; painted on top of the raster every frame.
pub struct MarkerCanvas {
    ctx: egui::Context,
    markers: BTreeMap<u64, PlacedMarker>,
    next_id: u64,
}

impl MarkerCanvas {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            markers: BTreeMap::new(),
            next_id: 0,
        }
    }

    fn paint(&self, painter: &egui::Painter, fit: &ScreenFit) {
        for marker in self.markers.values() {
            let c = fit.to_screen(marker.at.x, marker.at.y);
            let stroke = egui::Stroke::new(MARKER_STROKE, marker.color);
            let h = egui::vec2(MARKER_HALF_SIZE, 0.0);
            let v = egui::vec2(0.0, MARKER_HALF_SIZE);
            painter.line_segment([c - h, c + h], stroke);
            painter.line_segment([c - v, c + v], stroke);
        }
    }
}

impl Surface for MarkerCanvas {
    type Marker = MarkerId;

    fn place_marker(&mut self, at: Point, color: Color32) -> MarkerId {
        let id = self.next_id;
        self.next_id += 1;
        self.markers.insert(id, PlacedMarker { at, color });
        MarkerId(id)
    }

    fn erase_marker(&mut self, marker: MarkerId) {
        self.markers.remove(&marker.0);
    }

    fn redraw(&mut self) {
        self.ctx.request_repaint();
    }
}

// ── Input Translation ───────────────────────────────────────────────────────

fn pointer_press(event: &egui::Event) -> Option<(MouseButton, egui::Pos2)> {
    let egui::Event::PointerButton {
        pos,
        button,
        pressed: true,
        ..
    } = event
    else {
        return None;
    };
    let button = match button {
        egui::PointerButton::Primary => MouseButton::Left,
        egui::PointerButton::Secondary => MouseButton::Right,
        _ => MouseButton::Other,
    };
    Some((button, *pos))
}

/// Enter and Space come through as keys; everything else as typed text, so
/// `+` and `Z` arrive exactly as the keyboard layout produced them.
fn session_keys(event: &egui::Event) -> Vec<Key> {
    match event {
        egui::Event::Key {
            key: egui::Key::Enter,
            pressed: true,
            ..
        } => vec![Key::Enter],
        egui::Event::Key {
            key: egui::Key::Space,
            pressed: true,
            ..
        } => vec![Key::Space],
        egui::Event::Text(text) => text.chars().filter(|c| *c != ' ').map(Key::Char).collect(),
        _ => Vec::new(),
    }
}

// ── App ─────────────────────────────────────────────────────────────────────

struct TraceApp {
    raster: DisplayRaster,
    texture: Option<egui::TextureHandle>,
    prior: Vec<Segment>,
    controller: Option<SessionController<MarkerCanvas>>,
    outcome: Rc<RefCell<Option<Vec<Segment>>>>,
}

impl TraceApp {
    fn new(
        ctx: egui::Context,
        raster: DisplayRaster,
        prior: Vec<Segment>,
        outcome: Rc<RefCell<Option<Vec<Segment>>>>,
    ) -> Self {
        // keep colours running on from the previous session
        let color_index = prior.len() % SESSION_PALETTE.len();
        let controller = SessionController::new(
            MarkerCanvas::new(ctx),
            raster.extent,
            Some(raster.meters_per_pixel),
            color_index,
        );
        Self {
            raster,
            texture: None,
            prior,
            controller: Some(controller),
            outcome,
        }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        let max_side = ctx.input(|i| i.max_texture_side);
        let rgb = self.raster.display_pixels(max_side);
        let size = [rgb.width() as usize, rgb.height() as usize];
        let color_image = egui::ColorImage::from_rgb(size, rgb.as_raw());
        self.texture = Some(ctx.load_texture("raster", color_image, egui::TextureOptions::LINEAR));
    }

    fn finish(&mut self) {
        if let Some(controller) = self.controller.take() {
            let segments = controller.end_session().into_segments();
            *self.outcome.borrow_mut() = Some(segments);
        }
    }
}

fn draw_raster(
    painter: &egui::Painter,
    fit: &ScreenFit,
    texture: &egui::TextureHandle,
    extent: Extent,
) {
    let rect = egui::Rect::from_two_pos(
        fit.to_screen(extent.left, extent.top),
        fit.to_screen(extent.right, extent.bottom),
    );
    painter.image(
        texture.id(),
        rect,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        Color32::WHITE,
    );
}

fn draw_prior_segments(painter: &egui::Painter, fit: &ScreenFit, segments: &[Segment]) {
    for (idx, segment) in segments.iter().enumerate() {
        let color = PRIOR_PALETTE[idx % PRIOR_PALETTE.len()].gamma_multiply(PRIOR_OPACITY);
        let points: Vec<egui::Pos2> = segment.iter().map(|p| fit.to_screen(p.x, p.y)).collect();
        for p in &points {
            painter.circle_filled(*p, PRIOR_POINT_RADIUS, color);
        }
        if points.len() > 1 {
            painter.add(egui::Shape::line(points, egui::Stroke::new(MARKER_STROKE, color)));
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for TraceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ensure_texture(ctx);
        let Some(controller) = self.controller.as_mut() else {
            return;
        };

        // closing the window keeps the work, same as Enter
        if ctx.input(|i| i.viewport().close_requested()) {
            log::info!("Window closed, completing the segment in progress");
            controller.complete_segment();
            self.finish();
            return;
        }

        egui::TopBottomPanel::top("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(controller.current_color(), "+");
                ui.label(controller.status());
                ui.separator();
                ui.label(format!(
                    "{} segments, {} points in progress",
                    controller.completed_segments().len(),
                    controller.current_segment().len()
                ));
            });
        });

        let mut flow = Flow::Continue;
        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::click());
            let canvas = response.rect;
            painter.rect_filled(canvas, 0.0, Color32::from_gray(40));

            let fit = ScreenFit::new(controller.view().current(), canvas);
            let events = ctx.input(|i| i.events.clone());
            for event in &events {
                if let Some((button, pos)) = pointer_press(event) {
                    controller.pointer_press(button, fit.to_world(pos));
                }
                for key in session_keys(event) {
                    if controller.key_press(key) == Flow::Finish {
                        flow = Flow::Finish;
                    }
                }
                if flow == Flow::Finish {
                    break;
                }
            }

            // view may have moved while handling input
            let fit = ScreenFit::new(controller.view().current(), canvas);
            let painter = painter.with_clip_rect(fit.rect().intersect(canvas));
            painter.rect_filled(fit.rect(), 0.0, Color32::WHITE);
            if let Some(texture) = &self.texture {
                draw_raster(&painter, &fit, texture, self.raster.extent);
            }
            draw_prior_segments(&painter, &fit, &self.prior);
            controller.surface().paint(&painter, &fit);
        });

        if flow == Flow::Finish {
            self.finish();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

/// Show the raster and trace until Enter or the window closes. Returns the
/// segments completed in this session only.
pub fn run_session(
    raster: DisplayRaster,
    prior: Vec<Segment>,
    title: &str,
) -> anyhow::Result<Vec<Segment>> {
    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(WINDOW_SIZE)
            .with_title(title),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(move |cc| Ok(Box::new(TraceApp::new(cc.egui_ctx.clone(), raster, prior, sink)))),
    )
    .map_err(|err| anyhow::anyhow!("display failed: {err}"))?;

    let segments = outcome.borrow_mut().take().unwrap_or_default();
    Ok(segments)
}
