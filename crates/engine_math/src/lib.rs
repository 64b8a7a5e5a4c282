//! # engine_math
//!
//! Math types for the collection runtime. Re-exports [`glam`] for linear
//! algebra and defines [`Transform`], the position/rotation/scale triple used
//! when instances are spawned from a template.

pub mod transform;

pub use glam::{EulerRot, Mat4, Quat, Vec3};

pub use transform::Transform;
