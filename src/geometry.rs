//! Rotation-aware coordinate mapping
//!
//! The OCR engine reports geometry in the upright (display) orientation, while
//! frame bytes are laid out in sensor orientation. Every coordinate belongs to
//! exactly one of those two spaces; crossing between them goes through
//! [`Rotation::to_buffer`] or [`Rotation::to_upright`].
//!
//! Origin is top-left, x grows right, y grows down. Rotation is the clockwise
//! rotation that brings the sensor buffer upright.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Supported sensor rotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether the upright canvas has width and height swapped
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Dimensions of the upright canvas for a sensor buffer of the given size
    pub fn rotated_dimensions(self, buffer_width: u32, buffer_height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (buffer_height, buffer_width)
        } else {
            (buffer_width, buffer_height)
        }
    }

    /// Map an upright-space point into sensor buffer space
    pub fn to_buffer(self, x: i32, y: i32, buffer_width: u32, buffer_height: u32) -> (i32, i32) {
        let w = last_index(buffer_width);
        let h = last_index(buffer_height);
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (y, h.saturating_sub(x)),
            Rotation::Deg180 => (w.saturating_sub(x), h.saturating_sub(y)),
            Rotation::Deg270 => (w.saturating_sub(y), x),
        }
    }

    /// Map a sensor buffer point back into upright space (inverse of [`Rotation::to_buffer`])
    pub fn to_upright(self, x: i32, y: i32, buffer_width: u32, buffer_height: u32) -> (i32, i32) {
        let w = last_index(buffer_width);
        let h = last_index(buffer_height);
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (h.saturating_sub(y), x),
            Rotation::Deg180 => (w.saturating_sub(x), h.saturating_sub(y)),
            Rotation::Deg270 => (y, w.saturating_sub(x)),
        }
    }
}

/// Largest pixel index along an axis of `len` pixels
///
/// Points far outside the buffer saturate instead of overflowing.
fn last_index(len: u32) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX).saturating_sub(1)
}

impl TryFrom<i32> for Rotation {
    type Error = GeometryError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(GeometryError::InvalidRotation(other)),
        }
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Map an upright-space point into buffer space for a raw rotation in degrees
pub fn to_buffer_coords(
    x: i32,
    y: i32,
    buffer_width: u32,
    buffer_height: u32,
    rotation: i32,
) -> Result<(i32, i32), GeometryError> {
    let rotation = Rotation::try_from(rotation)?;
    Ok(rotation.to_buffer(x, y, buffer_width, buffer_height))
}

/// Map a buffer-space point into upright space for a raw rotation in degrees
pub fn to_upright_coords(
    x: i32,
    y: i32,
    buffer_width: u32,
    buffer_height: u32,
    rotation: i32,
) -> Result<(i32, i32), GeometryError> {
    let rotation = Rotation::try_from(rotation)?;
    Ok(rotation.to_upright(x, y, buffer_width, buffer_height))
}

/// Upright canvas dimensions for a raw rotation in degrees
///
/// Unsupported rotations leave the dimensions untouched.
pub fn rotated_dimensions(buffer_width: u32, buffer_height: u32, rotation: i32) -> (u32, u32) {
    match Rotation::try_from(rotation) {
        Ok(r) => r.rotated_dimensions(buffer_width, buffer_height),
        Err(_) => (buffer_width, buffer_height),
    }
}

/// Axis-aligned box, half-open: `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Build from origin and size; the far edges saturate at `i32::MAX`
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Width in pixels, widened so spans wider than `i32::MAX` stay exact
    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    /// True when the box covers no pixel
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Part of the box inside a `width x height` canvas anchored at the origin
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let clamped = BoundingBox::new(
            self.left.max(0),
            self.top.max(0),
            (self.right as i64).min(width as i64) as i32,
            (self.bottom as i64).min(height as i64) as i32,
        );
        if clamped.is_empty() {
            BoundingBox::default()
        } else {
            clamped
        }
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Map an upright-space box into buffer space
    ///
    /// The box is first clipped to the upright canvas. Its first and last
    /// covered pixels are then mapped and the result re-normalised, so the
    /// returned box covers exactly the same sensor pixels.
    pub fn to_buffer(&self, rotation: Rotation, buffer_width: u32, buffer_height: u32) -> BoundingBox {
        let (upright_w, upright_h) = rotation.rotated_dimensions(buffer_width, buffer_height);
        let visible = self.clamp_to(upright_w, upright_h);
        if visible.is_empty() {
            return BoundingBox::default();
        }
        let (x0, y0) = rotation.to_buffer(visible.left, visible.top, buffer_width, buffer_height);
        let (x1, y1) = rotation.to_buffer(visible.right - 1, visible.bottom - 1, buffer_width, buffer_height);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1) + 1, y0.max(y1) + 1)
    }
}
