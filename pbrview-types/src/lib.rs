//! Type declarations for the pbrview scene runtime.
//!
//! Everything in this crate is plain data: vertex layouts, bounding volumes,
//! material parameter tables and the descriptors used to talk to a GPU
//! backend. Nothing here owns a GPU resource.

pub use glam;

use glam::{Mat4, Vec3, Vec4};

pub mod gpu;
mod material;

pub use material::*;

/// Interleaved vertex as stored in the consolidated vertex buffer of a model.
///
/// Fields are stored as float arrays so the layout matches the shader input
/// exactly, without SIMD alignment padding.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub joint0: [f32; 4],
    pub weight0: [f32; 4],
    pub color: [f32; 4],
}

impl Vertex {
    /// Size of a single vertex in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Vertex at the given position with every other attribute at its loader default.
    pub fn from_position(pos: Vec3) -> Self {
        Self {
            pos: pos.to_array(),
            normal: [0.0; 3],
            uv0: [0.0; 2],
            uv1: [0.0; 2],
            joint0: [0.0; 4],
            weight0: [1.0, 0.0, 0.0, 0.0],
            color: [1.0; 4],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.pos)
    }

    pub fn joint_weights(&self) -> Vec4 {
        Vec4::from_array(self.weight0)
    }
}

/// Axis aligned box with a validity flag.
///
/// A box is only `valid` once it has been derived from real geometry; default
/// boxes are degenerate at the origin and should be ignored when merging.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
    pub valid: bool,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            valid: false,
        }
    }
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max, valid: true }
    }

    /// Transforms this box by `m` and returns the axis aligned box enclosing the result.
    ///
    /// Uses the extent-transform identity: the translation column seeds both
    /// corners and every basis column contributes the smaller and larger of its
    /// products with the box bounds along that axis.
    pub fn get_aabb(&self, m: Mat4) -> BoundingBox {
        let mut min = m.w_axis.truncate();
        let mut max = min;

        let columns = [m.x_axis.truncate(), m.y_axis.truncate(), m.z_axis.truncate()];
        for (axis, column) in columns.into_iter().enumerate() {
            let v0 = column * self.min[axis];
            let v1 = column * self.max[axis];
            min += v0.min(v1);
            max += v0.max(v1);
        }

        BoundingBox {
            min,
            max,
            valid: self.valid,
        }
    }

    /// Smallest box containing both boxes. Invalid boxes do not contribute.
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        match (self.valid, other.valid) {
            (true, true) => BoundingBox::new(self.min.min(other.min), self.max.max(other.max)),
            (true, false) => *self,
            (false, _) => *other,
        }
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box enclosing a set of points, invalid if the set is empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> BoundingBox {
        points
            .into_iter()
            .fold(BoundingBox::default(), |bb, p| bb.union(&BoundingBox::new(p, p)))
    }
}
