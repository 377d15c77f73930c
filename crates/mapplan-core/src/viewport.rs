//! Viewport transform: wheel pan, ctrl-wheel zoom and middle-button drag.

use crate::input::{Modifiers, MouseButton};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Scale change per ctrl-wheel notch.
pub const DEFAULT_ZOOM_FACTOR: f64 = 1.1;

/// Maps world coordinates to screen coordinates.
///
/// `screen = world * scale + offset`. Holds no undo-relevant state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Translation in screen pixels.
    pub offset: Vec2,
    pub scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Multiplier applied per zoom-in wheel event.
    pub zoom_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
            min_scale: 0.1,
            max_scale: 10.0,
            zoom_factor: DEFAULT_ZOOM_FACTOR,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// World-to-screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Screen-to-world transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Pan by a delta in screen pixels.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Rescale by `factor`, keeping the world point under `screen_point` fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return;
        }

        let world_point = self.screen_to_world(screen_point);
        self.scale = new_scale;

        let new_screen = self.world_to_screen(world_point);
        self.offset += screen_point - new_screen;
    }

    /// Wheel without ctrl scrolls the map; with ctrl it zooms around the pointer.
    ///
    /// Scrolling down (`delta.y > 0`) with ctrl zooms out.
    pub fn handle_wheel(&mut self, pointer: Point, delta: Vec2, modifiers: Modifiers) {
        if modifiers.ctrl {
            if delta.y == 0.0 {
                return;
            }
            let factor = if delta.y < 0.0 {
                self.zoom_factor
            } else {
                1.0 / self.zoom_factor
            };
            self.zoom_at(pointer, factor);
        } else {
            self.pan(-delta);
        }
    }

    /// Only the middle button drags the canvas; other buttons manipulate objects.
    pub fn drag_allowed(&self, button: MouseButton) -> bool {
        button == MouseButton::Middle
    }

    /// Part of the world visible in a screen of `size`.
    pub fn visible_world_rect(&self, size: Size) -> Rect {
        let top_left = self.screen_to_world(Point::ZERO);
        let bottom_right = self.screen_to_world(Point::new(size.width, size.height));
        Rect::from_points(top_left, bottom_right)
    }

    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.scale = 1.0;
    }

    /// Show `bounds` centered in a screen of `size`, leaving `padding` pixels.
    pub fn fit_to_bounds(&mut self, bounds: Rect, size: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let padded = Size::new(
            (size.width - padding * 2.0).max(1.0),
            (size.height - padding * 2.0).max(1.0),
        );
        let scale_x = padded.width / bounds.width();
        let scale_y = padded.height / bounds.height();
        self.scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);

        let bounds_center = bounds.center();
        let screen_center = Point::new(size.width / 2.0, size.height / 2.0);
        self.offset = Vec2::new(
            screen_center.x - bounds_center.x * self.scale,
            screen_center.y - bounds_center.y * self.scale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl() -> Modifiers {
        Modifiers {
            ctrl: true,
            ..Modifiers::default()
        }
    }

    #[test]
    fn test_wheel_pans_without_ctrl() {
        let mut viewport = Viewport::new();
        viewport.handle_wheel(Point::ZERO, Vec2::new(10.0, 30.0), Modifiers::default());
        assert_eq!(viewport.offset, Vec2::new(-10.0, -30.0));
        assert!((viewport.scale - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ctrl_wheel_up_zooms_in() {
        let mut viewport = Viewport::new();
        viewport.handle_wheel(Point::new(200.0, 100.0), Vec2::new(0.0, -1.0), ctrl());
        assert!((viewport.scale - DEFAULT_ZOOM_FACTOR).abs() < 1e-12);

        viewport.handle_wheel(Point::new(200.0, 100.0), Vec2::new(0.0, 1.0), ctrl());
        assert!((viewport.scale - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zoom_keeps_point_under_cursor() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(30.0, -20.0);
        let pointer = Point::new(250.0, 150.0);
        let before = viewport.screen_to_world(pointer);

        viewport.handle_wheel(pointer, Vec2::new(0.0, -3.0), ctrl());
        let after = viewport.screen_to_world(pointer);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut viewport = Viewport::new();
        viewport.zoom_at(Point::ZERO, 0.001);
        assert!((viewport.scale - viewport.min_scale).abs() < f64::EPSILON);
        viewport.zoom_at(Point::ZERO, 1e6);
        assert!((viewport.scale - viewport.max_scale).abs() < f64::EPSILON);
    }

    #[test]
    fn test_only_middle_button_drags() {
        let viewport = Viewport::new();
        assert!(viewport.drag_allowed(MouseButton::Middle));
        assert!(!viewport.drag_allowed(MouseButton::Left));
        assert!(!viewport.drag_allowed(MouseButton::Right));
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut viewport = Viewport::new();
        viewport.offset = Vec2::new(30.0, -20.0);
        viewport.scale = 1.5;

        let original = Point::new(123.0, 456.0);
        let back = viewport.world_to_screen(viewport.screen_to_world(original));
        assert!((back.x - original.x).abs() < 1e-10);
        assert!((back.y - original.y).abs() < 1e-10);
    }

    #[test]
    fn test_visible_world_rect() {
        let mut viewport = Viewport::new();
        viewport.scale = 2.0;
        viewport.offset = Vec2::new(-100.0, 0.0);
        let rect = viewport.visible_world_rect(Size::new(800.0, 600.0));
        assert!((rect.x0 - 50.0).abs() < 1e-9);
        assert!((rect.width() - 400.0).abs() < 1e-9);
        assert!((rect.height() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_to_bounds_centers() {
        let mut viewport = Viewport::new();
        let bounds = Rect::new(0.0, 0.0, 100.0, 50.0);
        let size = Size::new(400.0, 400.0);
        viewport.fit_to_bounds(bounds, size, 0.0);

        assert!((viewport.scale - 4.0).abs() < 1e-9);
        let center = viewport.world_to_screen(bounds.center());
        assert!((center.x - 200.0).abs() < 1e-9);
        assert!((center.y - 200.0).abs() < 1e-9);
    }
}
