//! Camera frame input
//!
//! Frames are produced by the camera subsystem and borrowed read-only for a
//! single processing pass. Nothing in this crate mutates frame bytes.

pub mod frame;

pub use frame::{Frame, Plane, PlaneView, ReleaseHook};
