//! Maps the fixed logical canvas onto the width available on screen.

use egui::{Pos2, Rect, Vec2};

/// Fixed-aspect canvas scaled to a container.
///
/// `origin` is where the logical canvas's top-left lands on screen. Every
/// conversion is a pure scaling by [`Viewport::scale_factor`] plus that offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    logical_size: Vec2,
    min_width: f32,
    max_width: f32,
    padding: f32,
    screen_width: f32,
    origin: Pos2,
}

impl Viewport {
    pub fn new(logical_size: Vec2, min_width: f32, max_width: f32, padding: f32) -> Self {
        Self {
            logical_size,
            min_width,
            max_width,
            padding,
            screen_width: logical_size.x.clamp(min_width, max_width),
            origin: Pos2::ZERO,
        }
    }

    /// Recomputes the on-screen width for a container of `container_width` pixels.
    pub fn fit_container(&mut self, container_width: f32) {
        let available = container_width - self.padding;
        let width = if available.is_finite() { available } else { self.min_width };
        self.screen_width = width.clamp(self.min_width, self.max_width);
    }

    pub fn set_origin(&mut self, origin: Pos2) {
        self.origin = origin;
    }

    pub fn logical_size(&self) -> Vec2 {
        self.logical_size
    }

    pub fn screen_width(&self) -> f32 {
        self.screen_width
    }

    pub fn screen_size(&self) -> Vec2 {
        self.logical_size * self.scale_factor()
    }

    /// Screen rectangle covered by the canvas.
    pub fn screen_rect(&self) -> Rect {
        Rect::from_min_size(self.origin, self.screen_size())
    }

    pub fn scale_factor(&self) -> f32 {
        self.screen_width / self.logical_size.x
    }

    pub fn screen_to_logical(&self, point: Pos2) -> Pos2 {
        ((point - self.origin) / self.scale_factor()).to_pos2()
    }

    pub fn logical_to_screen(&self, point: Pos2) -> Pos2 {
        self.origin + point.to_vec2() * self.scale_factor()
    }

    /// Converts a screen-space movement into logical units.
    pub fn delta_to_logical(&self, delta: Vec2) -> Vec2 {
        delta / self.scale_factor()
    }

    pub fn rect_to_screen(&self, rect: Rect) -> Rect {
        Rect::from_min_max(
            self.logical_to_screen(rect.min),
            self.logical_to_screen(rect.max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    fn viewport() -> Viewport {
        Viewport::new(vec2(360.0, 640.0), 280.0, 640.0, 16.0)
    }

    #[test]
    fn width_is_clamped_to_bounds() {
        let mut v = viewport();
        v.fit_container(200.0);
        assert_eq!(v.screen_width(), 280.0);
        v.fit_container(2000.0);
        assert_eq!(v.screen_width(), 640.0);
        v.fit_container(466.0);
        assert_eq!(v.screen_width(), 450.0);
        assert_eq!(v.scale_factor(), 1.25);
        assert_eq!(v.screen_size(), vec2(450.0, 800.0));
    }

    #[test]
    fn mapping_round_trips_with_origin() {
        let mut v = viewport();
        v.fit_container(736.0);
        v.set_origin(pos2(30.0, 12.0));
        let logical = pos2(90.0, 160.0);
        let screen = v.logical_to_screen(logical);
        assert_eq!(screen, pos2(30.0 + 90.0 * 2.0, 12.0 + 160.0 * 2.0));
        assert_eq!(v.screen_to_logical(screen), logical);
    }

    #[test]
    fn converting_points_matches_dividing_deltas() {
        let mut v = viewport();
        v.set_origin(pos2(8.0, 40.0));
        for width in [296.0, 376.0, 420.0, 656.0] {
            v.fit_container(width);
            let start = pos2(120.0, 300.0);
            for delta in [vec2(25.0, -10.0), vec2(-3.5, 41.0), vec2(0.0, 0.0)] {
                let end = start + delta;
                let via_points = v.screen_to_logical(end) - v.screen_to_logical(start);
                let via_delta = v.delta_to_logical(delta);
                assert!((via_points - via_delta).length() < 1e-3, "{width} {delta:?}");
            }
        }
    }
}
