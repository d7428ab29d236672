//! Visible world rectangle, its zoom/pan arithmetic, and how it lands on screen.

use eframe::egui;

/// Zoom factor for `+`/`=`.
pub const ZOOM_IN_STEP: f64 = 1.2;
/// Zoom factor for `-`.
pub const ZOOM_OUT_STEP: f64 = 0.8;
/// Fraction of the visible span moved per `w`/`a`/`s`/`d` press.
pub const PAN_STEP: f64 = 0.1;

const KEY_LEGEND: &str = "Click: add | z: undo | +/-: zoom | wasd: pan | \
                          space: complete segment | h: reset | Enter: finish";

/// World-coordinate rectangle. `bottom`/`top` keep the raster's orientation,
/// so `top < bottom` for images whose y axis grows downward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl Extent {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Scale both spans by `1 / factor` around the current midpoint.
    pub fn zoomed(&self, factor: f64) -> Self {
        let x_mid = (self.left + self.right) / 2.0;
        let y_mid = (self.bottom + self.top) / 2.0;
        let half_w = self.width() / factor / 2.0;
        let half_h = self.height() / factor / 2.0;
        Self::new(x_mid - half_w, x_mid + half_w, y_mid - half_h, y_mid + half_h)
    }

    /// Shift each axis by a fraction of its own span. Not clamped to the image.
    pub fn panned(&self, dx_frac: f64, dy_frac: f64) -> Self {
        let dx = dx_frac * self.width();
        let dy = dy_frac * self.height();
        Self::new(
            self.left + dx,
            self.right + dx,
            self.bottom + dy,
            self.top + dy,
        )
    }
}

// ── View State ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ViewState {
    initial: Extent,
    current: Extent,
    zoom_level: f64,
}

impl ViewState {
    pub fn new(home: Extent) -> Self {
        Self {
            initial: home,
            current: home,
            zoom_level: 1.0,
        }
    }

    #[cfg(test)]
    pub fn initial(&self) -> Extent {
        self.initial
    }

    pub fn current(&self) -> Extent {
        self.current
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn zoom(&mut self, factor: f64) {
        self.current = self.current.zoomed(factor);
        // average of the per-axis ratios
        self.zoom_level = (self.initial.width() / self.current.width()
            + self.initial.height() / self.current.height())
            / 2.0;
        log::debug!("zoom level {:.3}", self.zoom_level);
    }

    pub fn pan(&mut self, dx_frac: f64, dy_frac: f64) {
        self.current = self.current.panned(dx_frac, dy_frac);
    }

    /// Back to the full image; that view becomes the new zoom baseline.
    pub fn reset(&mut self, home: Extent) {
        self.initial = home;
        self.current = home;
        self.zoom_level = 1.0;
    }
}

pub fn status_text(meters_per_pixel: Option<f64>, zoom_level: f64) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(mpp) = meters_per_pixel {
        parts.push(format!("{mpp:.2}m/px"));
    }
    parts.push(format!("Zoom: {zoom_level:.1}x"));
    parts.push(KEY_LEGEND.to_owned());
    parts.join(" | ")
}

// ── Screen Mapping ──────────────────────────────────────────────────────────

/// An extent fitted into a canvas with equal aspect, centred.
#[derive(Clone, Copy, Debug)]
pub struct ScreenFit {
    rect: egui::Rect,
    extent: Extent,
}

impl ScreenFit {
    pub fn new(extent: Extent, canvas: egui::Rect) -> Self {
        let w = extent.width().abs();
        let h = extent.height().abs();
        let scale = (canvas.width() as f64 / w).min(canvas.height() as f64 / h);
        let rect = if scale.is_finite() && scale > 0.0 {
            egui::Rect::from_center_size(
                canvas.center(),
                egui::vec2((w * scale) as f32, (h * scale) as f32),
            )
        } else {
            canvas
        };
        Self { rect, extent }
    }

    /// The on-screen area the extent occupies; presses outside it are ignored.
    pub fn rect(&self) -> egui::Rect {
        self.rect
    }

    pub fn to_screen(&self, x: f64, y: f64) -> egui::Pos2 {
        let fx = (x - self.extent.left) / self.extent.width();
        let fy = (self.extent.top - y) / self.extent.height();
        egui::pos2(
            self.rect.left() + (fx * self.rect.width() as f64) as f32,
            self.rect.top() + (fy * self.rect.height() as f64) as f32,
        )
    }

    pub fn to_world(&self, pos: egui::Pos2) -> Option<(f64, f64)> {
        if !self.rect.contains(pos) {
            return None;
        }
        let fx = (pos.x - self.rect.left()) as f64 / self.rect.width() as f64;
        let fy = (pos.y - self.rect.top()) as f64 / self.rect.height() as f64;
        Some((
            self.extent.left + fx * self.extent.width(),
            self.extent.top - fy * self.extent.height(),
        ))
    }
}
