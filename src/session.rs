//! The tracing session: input events in, segments out.
//!
//! Rendering goes through [`Surface`], so the controller owns the marker
//! handles it places and hands each one back when its point is undone.

use crate::geometry::{Point, Segment, TraceFeature};
use crate::view::{self, Extent, ViewState, PAN_STEP, ZOOM_IN_STEP, ZOOM_OUT_STEP};
use eframe::egui::Color32;

/// Colours for points placed in this session, one per segment in turn.
pub const SESSION_PALETTE: [Color32; 8] = [
    Color32::from_rgb(128, 0, 128), // purple
    Color32::from_rgb(255, 0, 0),   // red
    Color32::from_rgb(0, 0, 255),   // blue
    Color32::from_rgb(0, 128, 0),   // green
    Color32::from_rgb(255, 165, 0), // orange
    Color32::from_rgb(0, 255, 255), // cyan
    Color32::from_rgb(255, 0, 255), // magenta
    Color32::from_rgb(255, 255, 0), // yellow
];

/// Where markers get drawn. `Marker` is whatever the surface needs to take
/// one back off the screen.
pub trait Surface {
    type Marker;

    fn place_marker(&mut self, at: Point, color: Color32) -> Self::Marker;
    fn erase_marker(&mut self, marker: Self::Marker);
    fn redraw(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// Enter or Return.
    Enter,
    Space,
    Char(char),
}

/// What the host should do after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finish,
}

pub struct SessionController<S: Surface> {
    surface: S,
    completed: Vec<Segment>,
    current: Vec<Point>,
    markers: Vec<S::Marker>,
    color_index: usize,
    view: ViewState,
    home: Extent,
    meters_per_pixel: Option<f64>,
    status: String,
}

impl<S: Surface> SessionController<S> {
    /// `home` is the full-image extent that `h` returns to.
    pub fn new(
        surface: S,
        home: Extent,
        meters_per_pixel: Option<f64>,
        color_index: usize,
    ) -> Self {
        let view = ViewState::new(home);
        let status = view::status_text(meters_per_pixel, view.zoom_level());
        Self {
            surface,
            completed: Vec::new(),
            current: Vec::new(),
            markers: Vec::new(),
            color_index: color_index % SESSION_PALETTE.len(),
            view,
            home,
            meters_per_pixel,
            status,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    #[cfg(test)]
    pub fn color_index(&self) -> usize {
        self.color_index
    }

    pub fn current_color(&self) -> Color32 {
        SESSION_PALETTE[self.color_index]
    }

    pub fn current_segment(&self) -> &[Point] {
        &self.current
    }

    pub fn completed_segments(&self) -> &[Segment] {
        &self.completed
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// `position` is `None` when the press landed outside the map.
    pub fn pointer_press(&mut self, button: MouseButton, position: Option<(f64, f64)>) {
        let Some((x, y)) = position else {
            return;
        };
        match button {
            MouseButton::Left => self.add_point(x, y),
            MouseButton::Right => self.remove_last_point(),
            MouseButton::Other => {}
        }
    }

    pub fn key_press(&mut self, key: Key) -> Flow {
        match key {
            Key::Enter => {
                self.complete_segment();
                return Flow::Finish;
            }
            Key::Space => self.complete_segment(),
            Key::Char('z' | 'Z') => self.remove_last_point(),
            Key::Char('+' | '=') => self.zoom(ZOOM_IN_STEP),
            Key::Char('-') => self.zoom(ZOOM_OUT_STEP),
            Key::Char('w') => self.pan(0.0, PAN_STEP),
            Key::Char('s') => self.pan(0.0, -PAN_STEP),
            Key::Char('a') => self.pan(-PAN_STEP, 0.0),
            Key::Char('d') => self.pan(PAN_STEP, 0.0),
            Key::Char('h') => self.reset_view(),
            Key::Char(_) => {}
        }
        Flow::Continue
    }

    // ── Operations ──────────────────────────────────────────────────────

    pub fn add_point(&mut self, x: f64, y: f64) {
        let point = Point::captured(x, y);
        let marker = self.surface.place_marker(point, self.current_color());
        self.current.push(point);
        self.markers.push(marker);
        log::debug!("point {}, {} ({} in segment)", point.x, point.y, self.current.len());
        self.surface.redraw();
    }

    pub fn remove_last_point(&mut self) {
        let (Some(point), Some(marker)) = (self.current.pop(), self.markers.pop()) else {
            return;
        };
        self.surface.erase_marker(marker);
        log::debug!("removed point {}, {}", point.x, point.y);
        self.surface.redraw();
    }

    /// Freeze the points in progress as a segment. Their markers stay drawn.
    pub fn complete_segment(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let segment = std::mem::take(&mut self.current);
        self.markers.clear();
        log::info!(
            "Completed segment {} with {} points",
            self.completed.len() + 1,
            segment.len()
        );
        self.completed.push(segment);
        self.color_index = (self.color_index + 1) % SESSION_PALETTE.len();
    }

    pub fn zoom(&mut self, factor: f64) {
        self.view.zoom(factor);
        self.refresh_status();
        self.surface.redraw();
    }

    pub fn pan(&mut self, dx_frac: f64, dy_frac: f64) {
        self.view.pan(dx_frac, dy_frac);
        self.surface.redraw();
    }

    pub fn reset_view(&mut self) {
        self.view.reset(self.home);
        self.refresh_status();
        self.surface.redraw();
    }

    fn refresh_status(&mut self) {
        self.status = view::status_text(self.meters_per_pixel, self.view.zoom_level());
    }

    /// Everything completed so far. Points never completed are not included.
    pub fn end_session(self) -> TraceFeature {
        TraceFeature::new(self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    /// Keeps every live marker so tests can see what is on screen.
    #[derive(Default)]
    struct RecordingSurface {
        live: BTreeMap<usize, (Point, Color32)>,
        next: usize,
        redraws: usize,
    }

    impl Surface for RecordingSurface {
        type Marker = usize;

        fn place_marker(&mut self, at: Point, color: Color32) -> usize {
            let id = self.next;
            self.next += 1;
            self.live.insert(id, (at, color));
            id
        }

        fn erase_marker(&mut self, marker: usize) {
            assert!(self.live.remove(&marker).is_some(), "marker {marker} erased twice");
        }

        fn redraw(&mut self) {
            self.redraws += 1;
        }
    }

    fn home() -> Extent {
        Extent::new(0.0, 100.0, 0.0, 100.0)
    }

    fn controller() -> SessionController<RecordingSurface> {
        SessionController::new(RecordingSurface::default(), home(), Some(0.5), 0)
    }

    fn click(c: &mut SessionController<RecordingSurface>, x: f64, y: f64) {
        c.pointer_press(MouseButton::Left, Some((x, y)));
    }

    fn pts(coords: &[(f64, f64)]) -> Segment {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn clicks_then_complete_yield_rounded_segment() {
        let mut c = controller();
        click(&mut c, 10.4, 9.6);
        click(&mut c, 20.2, 10.0);
        click(&mut c, 19.5, 20.5);
        c.complete_segment();

        assert_eq!(
            c.completed_segments(),
            &[pts(&[(10.0, 10.0), (20.0, 10.0), (20.0, 20.0)])]
        );
        assert!(c.current_segment().is_empty());
        assert!(c.markers.is_empty());
        // markers of the finished segment are still on screen
        assert_eq!(c.surface().live.len(), 3);
    }

    #[test]
    fn remove_undoes_the_latest_add() {
        let mut c = controller();
        click(&mut c, 1.0, 1.0);
        let before_points = c.current_segment().to_vec();
        let before_markers = c.markers.clone();

        click(&mut c, 5.0, 5.0);
        c.pointer_press(MouseButton::Right, Some((80.0, 80.0)));

        assert_eq!(c.current_segment(), before_points.as_slice());
        assert_eq!(c.markers, before_markers);
        assert_eq!(c.surface().live.len(), 1);
    }

    #[test]
    fn undo_repeats_until_empty_then_noops() {
        let mut c = controller();
        click(&mut c, 1.0, 1.0);
        click(&mut c, 2.0, 2.0);
        for _ in 0..4 {
            c.key_press(Key::Char('z'));
        }
        c.key_press(Key::Char('Z'));
        assert!(c.current_segment().is_empty());
        assert!(c.markers.is_empty());
        assert!(c.surface().live.is_empty());
        // two adds and two real removals
        assert_eq!(c.surface().redraws, 4);
    }

    #[test]
    fn undo_does_not_reach_into_completed_segments() {
        let mut c = controller();
        click(&mut c, 3.0, 3.0);
        c.key_press(Key::Space);
        c.remove_last_point();
        assert_eq!(c.completed_segments(), &[pts(&[(3.0, 3.0)])]);
        assert_eq!(c.surface().live.len(), 1);
    }

    #[test]
    fn completing_empty_segment_changes_nothing() {
        let mut c = controller();
        c.complete_segment();
        c.key_press(Key::Space);
        assert!(c.completed_segments().is_empty());
        assert_eq!(c.color_index(), 0);
        assert_eq!(c.surface().redraws, 0);
    }

    #[test]
    fn color_index_wraps_after_full_palette() {
        let mut c = SessionController::new(RecordingSurface::default(), home(), None, 3);
        for i in 0..SESSION_PALETTE.len() {
            click(&mut c, i as f64, 0.0);
            c.complete_segment();
        }
        assert_eq!(c.color_index(), 3);
        assert_eq!(c.completed_segments().len(), SESSION_PALETTE.len());
    }

    #[test]
    fn markers_use_the_segment_color() {
        let mut c = controller();
        click(&mut c, 0.0, 0.0);
        c.complete_segment();
        click(&mut c, 1.0, 1.0);
        let colors: Vec<Color32> = c.surface().live.values().map(|(_, col)| *col).collect();
        assert_eq!(colors, vec![SESSION_PALETTE[0], SESSION_PALETTE[1]]);
    }

    #[test]
    fn seed_index_is_taken_modulo_palette() {
        let c = SessionController::new(RecordingSurface::default(), home(), None, 11);
        assert_eq!(c.color_index(), 3);
    }

    #[test]
    fn presses_outside_the_map_are_ignored() {
        let mut c = controller();
        c.pointer_press(MouseButton::Left, None);
        click(&mut c, 4.0, 4.0);
        c.pointer_press(MouseButton::Right, None);
        c.pointer_press(MouseButton::Other, Some((9.0, 9.0)));
        assert_eq!(c.current_segment(), pts(&[(4.0, 4.0)]).as_slice());
    }

    #[test]
    fn zoom_keys_scale_view_and_update_status() {
        let mut c = controller();
        assert!(c.status().contains("Zoom: 1.0x"));
        c.key_press(Key::Char('+'));
        c.key_press(Key::Char('='));
        assert_relative_eq!(c.view().zoom_level(), 1.44, epsilon = 1e-9);
        assert!(c.status().starts_with("0.50m/px | Zoom: 1.4x"));
        c.key_press(Key::Char('-'));
        assert_relative_eq!(c.view().current().width(), 100.0 / 1.44 / 0.8, epsilon = 1e-9);
    }

    #[test]
    fn wasd_pans_by_a_tenth_of_the_view() {
        let mut c = controller();
        c.key_press(Key::Char('d'));
        c.key_press(Key::Char('w'));
        assert_eq!(c.view().current(), Extent::new(10.0, 110.0, 10.0, 110.0));
        c.key_press(Key::Char('a'));
        c.key_press(Key::Char('s'));
        assert_eq!(c.view().current(), home());
        // panning leaves the zoom readout alone
        assert!(c.status().contains("Zoom: 1.0x"));
    }

    #[test]
    fn home_key_resets_view_and_zoom() {
        let mut c = controller();
        c.zoom(2.0);
        c.pan(0.5, 0.5);
        c.key_press(Key::Char('h'));
        assert_eq!(c.view().current(), home());
        assert_eq!(c.view().initial(), home());
        assert_eq!(c.view().zoom_level(), 1.0);
        assert!(c.status().contains("Zoom: 1.0x"));
    }

    #[test]
    fn unbound_keys_do_nothing() {
        let mut c = controller();
        click(&mut c, 1.0, 1.0);
        for ch in ['q', 'W', 'H', '1', 'x'] {
            assert_eq!(c.key_press(Key::Char(ch)), Flow::Continue);
        }
        assert_eq!(c.view().current(), home());
        assert_eq!(c.current_segment().len(), 1);
    }

    #[test]
    fn enter_completes_and_finishes() {
        let mut c = controller();
        click(&mut c, 10.0, 10.0);
        click(&mut c, 20.0, 10.0);
        click(&mut c, 20.0, 20.0);
        assert_eq!(c.key_press(Key::Space), Flow::Continue);
        click(&mut c, 0.0, 0.0);
        assert_eq!(c.key_press(Key::Enter), Flow::Finish);

        let feature = c.end_session();
        assert_eq!(
            feature.segments(),
            &[
                pts(&[(10.0, 10.0), (20.0, 10.0), (20.0, 20.0)]),
                pts(&[(0.0, 0.0)]),
            ]
        );
    }

    #[test]
    fn end_session_drops_uncompleted_points() {
        let mut c = controller();
        click(&mut c, 1.0, 1.0);
        c.complete_segment();
        click(&mut c, 2.0, 2.0);
        assert_eq!(c.end_session().segments(), &[pts(&[(1.0, 1.0)])]);
    }
}
