//! Point and vector types

use nalgebra::{Point3, Vector3};

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A 3D point with single precision coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with single precision components
pub type Vector3f = Vector3<f32>;
