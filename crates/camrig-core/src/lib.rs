//! Core math and camera-model primitives for `camrig-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - rigid-transform helpers for axis-angle extrinsics,
//! - the pinhole + Brown–Conrady camera model used by every solver,
//! - synthetic planar-target helpers for tests and simulation.

/// Linear algebra type aliases and rigid-transform helpers.
pub mod math;
/// Pinhole camera model with Brown–Conrady distortion.
pub mod camera;
/// Synthetic planar target generators.
pub mod synthetic;

pub use camera::*;
pub use math::*;
