use crate::error::{ComposeError, Result};
use egui::{pos2, Pos2, Rect, Vec2};

/// Placement of one image on the logical canvas.
///
/// `position` is the top-left of the layer box and `size` its extent, both in
/// logical units. `rotation` (degrees) and `scale` are applied to the content
/// about the box center; the box itself stays axis-aligned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Pos2,
    pub size: Vec2,
    pub rotation: f32,
    pub scale: f32,
}

/// Partial update merged into a [`Transform`]. `None` fields are left alone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformPatch {
    pub position: Option<Pos2>,
    pub size: Option<Vec2>,
    pub rotation: Option<f32>,
    pub scale: Option<f32>,
}

impl TransformPatch {
    pub fn position(position: Pos2) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn rect(rect: Rect) -> Self {
        Self {
            position: Some(rect.min),
            size: Some(rect.size()),
            ..Default::default()
        }
    }

    pub fn rotation(degrees: f32) -> Self {
        Self {
            rotation: Some(degrees),
            ..Default::default()
        }
    }

    pub fn scale(scale: f32) -> Self {
        Self {
            scale: Some(scale),
            ..Default::default()
        }
    }
}

impl Transform {
    pub fn new(position: Pos2, size: Vec2) -> Result<Self> {
        let transform = Self {
            position,
            size,
            rotation: 0.0,
            scale: 1.0,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.position, self.size)
    }

    pub fn center(&self) -> Pos2 {
        self.rect().center()
    }

    /// Rotation folded into `[0, 360)` for rendering.
    pub fn normalized_rotation(&self) -> f32 {
        normalize_degrees(self.rotation)
    }

    /// Box of the drawn content: `size * scale` around the box center.
    pub fn content_size(&self) -> Vec2 {
        self.size * self.scale
    }

    /// Screen-visible box: the content size centered on the layer box.
    pub fn content_rect(&self) -> Rect {
        Rect::from_center_size(self.center(), self.content_size())
    }

    /// Layer box whose scaled content fills `content`.
    pub fn rect_for_content(&self, content: Rect) -> Rect {
        Rect::from_center_size(content.center(), content.size() / self.scale)
    }

    /// Returns the merged transform, or `InvalidTransform` when the result would be
    /// degenerate. `self` is never modified.
    pub fn merged(&self, patch: &TransformPatch) -> Result<Self> {
        let next = Self {
            position: patch.position.unwrap_or(self.position),
            size: patch.size.unwrap_or(self.size),
            rotation: patch.rotation.unwrap_or(self.rotation),
            scale: patch.scale.unwrap_or(self.scale),
        };
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.position.x.is_finite() && self.position.y.is_finite()) {
            return Err(ComposeError::InvalidTransform(format!(
                "position {:?} is not finite",
                self.position
            )));
        }
        if !(self.size.x.is_finite() && self.size.y.is_finite())
            || self.size.x <= 0.0
            || self.size.y <= 0.0
        {
            return Err(ComposeError::InvalidTransform(format!(
                "size {}x{} must be positive",
                self.size.x, self.size.y
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ComposeError::InvalidTransform(format!(
                "scale {} must be positive",
                self.scale
            )));
        }
        if !self.rotation.is_finite() {
            return Err(ComposeError::InvalidTransform(
                "rotation is not finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Corner of a layer box, used to pick a resize handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn opposite(self) -> Self {
        match self {
            Corner::TopLeft => Corner::BottomRight,
            Corner::TopRight => Corner::BottomLeft,
            Corner::BottomLeft => Corner::TopRight,
            Corner::BottomRight => Corner::TopLeft,
        }
    }

    pub fn of(self, rect: Rect) -> Pos2 {
        match self {
            Corner::TopLeft => rect.left_top(),
            Corner::TopRight => rect.right_top(),
            Corner::BottomLeft => rect.left_bottom(),
            Corner::BottomRight => rect.right_bottom(),
        }
    }

    /// Direction the corner moves away from the box when it grows.
    pub fn outward(self) -> Vec2 {
        match self {
            Corner::TopLeft => Vec2::new(-1.0, -1.0),
            Corner::TopRight => Vec2::new(1.0, -1.0),
            Corner::BottomLeft => Vec2::new(-1.0, 1.0),
            Corner::BottomRight => Vec2::new(1.0, 1.0),
        }
    }

    /// Resizes `start` by dragging this corner by `delta`, keeping the opposite
    /// corner fixed. The result may be degenerate; callers validate it.
    pub fn drag(self, start: Rect, delta: Vec2) -> Rect {
        let anchor = self.opposite().of(start);
        let outward = self.outward();
        let width = start.width() + outward.x * delta.x;
        let height = start.height() + outward.y * delta.y;
        let min_x = if outward.x < 0.0 { anchor.x - width } else { anchor.x };
        let min_y = if outward.y < 0.0 { anchor.y - height } else { anchor.y };
        Rect::from_min_size(pos2(min_x, min_y), Vec2::new(width, height))
    }
}

pub fn normalize_degrees(degrees: f32) -> f32 {
    degrees.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::vec2;

    #[test]
    fn rejects_degenerate_values() {
        assert!(Transform::new(pos2(0.0, 0.0), vec2(0.0, 10.0)).is_err());
        assert!(Transform::new(pos2(0.0, 0.0), vec2(10.0, -1.0)).is_err());

        let t = Transform::new(pos2(0.0, 0.0), vec2(10.0, 10.0)).unwrap();
        assert!(matches!(
            t.merged(&TransformPatch::scale(0.0)),
            Err(ComposeError::InvalidTransform(_))
        ));
        assert!(t.merged(&TransformPatch::scale(f32::NAN)).is_err());
        assert_eq!(t.scale, 1.0);
    }

    #[test]
    fn rotation_is_treated_modulo_360() {
        let mut t = Transform::new(pos2(0.0, 0.0), vec2(10.0, 10.0)).unwrap();
        t.rotation = -90.0;
        assert_eq!(t.normalized_rotation(), 270.0);
        t.rotation = 720.0 + 45.0;
        assert_eq!(t.normalized_rotation(), 45.0);
    }

    #[test]
    fn corner_drag_keeps_opposite_corner() {
        let start = Rect::from_min_size(pos2(50.0, 40.0), vec2(100.0, 80.0));
        for corner in Corner::ALL {
            for delta in [vec2(10.0, -5.0), vec2(-30.0, 25.0), vec2(0.0, 0.0)] {
                let next = corner.drag(start, delta);
                let anchor = corner.opposite();
                assert_eq!(anchor.of(next), anchor.of(start), "{corner:?} {delta:?}");
            }
        }
    }

    #[test]
    fn corner_drag_grows_outward() {
        let start = Rect::from_min_size(pos2(50.0, 40.0), vec2(100.0, 80.0));
        let next = Corner::TopLeft.drag(start, vec2(-10.0, -20.0));
        assert_eq!(next.size(), vec2(110.0, 100.0));
        assert_eq!(next.min, pos2(40.0, 20.0));
    }
}
