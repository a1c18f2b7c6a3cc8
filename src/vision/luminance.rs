//! Background brightness estimation over a byte plane
//!
//! Samples a fixed grid of points instead of decoding the frame, so the cost of
//! a call does not depend on region size. Regions are given in upright space and
//! every point is mapped to the sensor buffer before it is read.

use tracing::debug;

use crate::capture::PlaneView;
use crate::config::LuminanceSettings;
use crate::geometry::{BoundingBox, Rotation};

/// Grid-based luminance sampler
#[derive(Debug, Clone)]
pub struct LuminanceSampler {
    /// Points per axis
    grid_size: u32,
    /// Fraction of the upright frame covered by the global center region
    center_fraction: f32,
}

impl Default for LuminanceSampler {
    fn default() -> Self {
        Self::new(5, 0.2)
    }
}

impl LuminanceSampler {
    pub fn new(grid_size: u32, center_fraction: f32) -> Self {
        Self {
            grid_size: grid_size.max(1),
            center_fraction: center_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn from_settings(settings: &LuminanceSettings) -> Self {
        Self::new(settings.grid_size, settings.center_fraction)
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Average brightness (0..=255) over `region`, given in upright space
    ///
    /// Returns `None` when no grid point could be read: empty region, bad
    /// strides, unsupported rotation or a region entirely off-frame. A partly
    /// visible region is sampled over its on-frame part only.
    pub fn sample_region(&self, plane: &PlaneView<'_>, region: &BoundingBox, rotation: i32) -> Option<u8> {
        if plane.row_stride <= 0 || plane.pixel_stride <= 0 || region.is_empty() {
            return None;
        }
        let rotation = Rotation::try_from(rotation).ok()?;
        let (upright_w, upright_h) = rotation.rotated_dimensions(plane.width, plane.height);

        let visible = region.clamp_to(upright_w, upright_h);
        if visible.is_empty() {
            debug!("Luminance region {:?} is outside the frame", region);
            return None;
        }

        let grid = self.grid_size as i64;
        let region_w = visible.width();
        let region_h = visible.height();

        let mut sum: u64 = 0;
        let mut count: u64 = 0;

        for gy in 0..grid {
            // Cell-centred grid points
            let uy = visible.top as i64 + (2 * gy + 1) * region_h / (2 * grid);
            for gx in 0..grid {
                let ux = visible.left as i64 + (2 * gx + 1) * region_w / (2 * grid);

                if ux < 0 || uy < 0 || ux >= upright_w as i64 || uy >= upright_h as i64 {
                    continue;
                }

                let (bx, by) = rotation.to_buffer(ux as i32, uy as i32, plane.width, plane.height);
                if let Some(value) = read_byte(plane, bx, by) {
                    sum += value as u64;
                    count += 1;
                }
            }
        }

        if count == 0 {
            debug!("Luminance sample found no readable points in {:?}", region);
            return None;
        }

        Some((sum / count) as u8)
    }

    /// Average brightness of the centered region of the upright frame
    pub fn sample_global_center(&self, plane: &PlaneView<'_>, rotation: i32) -> Option<u8> {
        let rotation_checked = Rotation::try_from(rotation).ok()?;
        let (upright_w, upright_h) = rotation_checked.rotated_dimensions(plane.width, plane.height);
        if upright_w == 0 || upright_h == 0 {
            return None;
        }

        let region_w = ((upright_w as f32 * self.center_fraction).round() as i32).max(1);
        let region_h = ((upright_h as f32 * self.center_fraction).round() as i32).max(1);
        let left = (upright_w as i32 - region_w) / 2;
        let top = (upright_h as i32 - region_h) / 2;

        self.sample_region(plane, &BoundingBox::from_xywh(left, top, region_w, region_h), rotation)
    }
}

/// Read one byte at a buffer-space point, bounds-checked against the plane
fn read_byte(plane: &PlaneView<'_>, x: i32, y: i32) -> Option<u8> {
    if x < 0 || y < 0 || x >= plane.width as i32 || y >= plane.height as i32 {
        return None;
    }
    let offset = (y as i64)
        .checked_mul(plane.row_stride as i64)?
        .checked_add((x as i64).checked_mul(plane.pixel_stride as i64)?)?;
    if offset < 0 || offset >= plane.data.len() as i64 {
        return None;
    }
    plane.data.get(offset as usize).copied()
}
