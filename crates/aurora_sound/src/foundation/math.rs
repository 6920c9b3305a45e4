//! Math utilities and types
//!
//! Provides the vector types used for listener and source positioning.

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// The origin, where sources and the listener start out
#[must_use]
pub fn origin() -> Vec3 {
    Vec3::zeros()
}
