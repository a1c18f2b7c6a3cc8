//! Frame data structures for camera sensor buffers

use std::time::Instant;

use crate::geometry::{rotated_dimensions, Rotation};

/// One byte plane of a sensor buffer (e.g. the luma plane of YUV_420_888)
#[derive(Debug, Clone)]
pub struct Plane {
    /// Raw plane bytes in sensor orientation
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows
    pub row_stride: i32,
    /// Bytes between consecutive pixels within a row
    pub pixel_stride: i32,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: i32, pixel_stride: i32) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// Borrowed view of a plane together with the buffer dimensions
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    /// Sensor buffer width in pixels
    pub width: u32,
    /// Sensor buffer height in pixels
    pub height: u32,
    pub row_stride: i32,
    pub pixel_stride: i32,
}

/// Callback returning the underlying buffer to the camera's pool
pub struct ReleaseHook(Box<dyn FnOnce() + Send + Sync>);

impl std::fmt::Debug for ReleaseHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReleaseHook")
    }
}

/// A captured camera frame
///
/// Dropping the frame runs its release hook, if any.
#[derive(Debug)]
pub struct Frame {
    /// Monotonic capture sequence number
    pub seq: u64,
    /// Buffer width in pixels (sensor orientation)
    pub width: u32,
    /// Buffer height in pixels (sensor orientation)
    pub height: u32,
    /// Clockwise rotation in degrees that makes the buffer upright
    ///
    /// Kept raw: an unsupported value is contained by the consumers rather
    /// than rejected at capture time.
    pub rotation: i32,
    /// Byte planes, luma first
    pub planes: Vec<Plane>,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
    release: Option<ReleaseHook>,
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(ReleaseHook(hook)) = self.release.take() {
            hook();
        }
    }
}

impl Frame {
    /// Create a new frame from its planes
    pub fn new(seq: u64, width: u32, height: u32, rotation: i32, planes: Vec<Plane>) -> Self {
        Self {
            seq,
            width,
            height,
            rotation,
            planes,
            timestamp: Instant::now(),
            release: None,
        }
    }

    /// Run `hook` when the frame is dropped
    pub fn with_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(ReleaseHook(Box::new(hook)));
        self
    }

    /// Create a single-plane frame with tightly packed 8-bit luma
    pub fn from_luma(seq: u64, width: u32, height: u32, rotation: i32, data: Vec<u8>) -> Self {
        let plane = Plane::new(data, width as i32, 1);
        Self::new(seq, width, height, rotation, vec![plane])
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Dimensions of the upright canvas the OCR engine sees
    pub fn upright_dimensions(&self) -> (u32, u32) {
        rotated_dimensions(self.width, self.height, self.rotation)
    }

    /// Validated rotation, if supported
    pub fn rotation(&self) -> Option<Rotation> {
        Rotation::try_from(self.rotation).ok()
    }

    /// Borrow the luma plane
    pub fn luma(&self) -> Option<PlaneView<'_>> {
        self.plane(0)
    }

    /// Borrow plane `index`
    pub fn plane(&self, index: usize) -> Option<PlaneView<'_>> {
        self.planes.get(index).map(|p| PlaneView {
            data: &p.data,
            width: self.width,
            height: self.height,
            row_stride: p.row_stride,
            pixel_stride: p.pixel_stride,
        })
    }
}
