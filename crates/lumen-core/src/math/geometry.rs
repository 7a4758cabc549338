// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Geometric primitives used for culling, light volumes and portal bounds.

use super::{Mat4, Transform, Vec2, Vec3, Vec4, EPSILON};

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// An AABB is a rectangular prism aligned with the coordinate axes, defined by its
/// minimum and maximum corner points.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An invalid `Aabb`, neutral for merging.
    pub const INVALID: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    /// Creates a new `Aabb` from two corner points given in any order.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a new `Aabb` from a center point and its half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let h = Vec3::new(
            half_extents.x.abs(),
            half_extents.y.abs(),
            half_extents.z.abs(),
        );
        Self {
            min: center - h,
            max: center + h,
        }
    }

    /// Creates an `Aabb` that tightly encloses a set of points, or `None` for
    /// an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| Self {
                min: acc.min.min(*p),
                max: acc.max.max(*p),
            },
        ))
    }

    /// Calculates the center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Calculates the half-extents.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Checks whether a point lies inside or on the boundary.
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Returns the box enclosing this box after applying `transform`.
    pub fn transformed(&self, transform: &Transform) -> Self {
        let center = transform.transform_point(self.center());
        let h = self.half_extents();
        let m = transform.linear();
        let abs = |v: Vec3| Vec3::new(v.x.abs(), v.y.abs(), v.z.abs());
        let extents = abs(m.cols[0]) * h.x + abs(m.cols[1]) * h.y + abs(m.cols[2]) * h.z;
        Self::from_center_half_extents(center, extents)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::INVALID
    }
}

/// A 2D axis-aligned box, used for screen-space portal bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2 {
    /// The smallest corner.
    pub min: Vec2,
    /// The largest corner.
    pub max: Vec2,
}

impl Box2 {
    /// Creates a box enclosing the given points, or `None` for an empty slice.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| Self {
                min: acc.min.min(*p),
                max: acc.max.max(*p),
            },
        ))
    }

    /// Width of the box.
    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Height of the box.
    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// A plane in the form `normal · p + d = 0`. Points with a non-negative
/// distance are on the "inside".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// The plane normal (not necessarily unit length).
    pub normal: Vec3,
    /// The plane offset.
    pub d: f32,
}

impl Plane {
    /// Creates a plane from a `Vec4` holding `(a, b, c, d)`, normalizing it.
    pub fn from_vec4(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > EPSILON {
            Self {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            Self { normal, d: v.w }
        }
    }

    /// Signed distance of a point from the plane.
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// The result of classifying a box against a [`Frustum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    /// Completely outside at least one plane.
    Outside,
    /// Inside or straddling. The mask holds the planes the box still
    /// intersects; a zero mask means fully inside.
    Visible(u32),
}

/// A convex set of up to 32 planes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frustum {
    planes: Vec<Plane>,
}

impl Frustum {
    /// Creates a frustum from explicit planes.
    ///
    /// # Panics
    ///
    /// Panics if more than 32 planes are given, since plane masks are `u32`.
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        assert!(planes.len() <= 32, "a frustum holds at most 32 planes");
        Self { planes }
    }

    /// Extracts the six clip planes of a view-projection matrix with a `[0, 1]`
    /// depth range.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let r0 = m.get_row(0);
        let r1 = m.get_row(1);
        let r2 = m.get_row(2);
        let r3 = m.get_row(3);
        let sub = |a: Vec4, b: Vec4| a + b * -1.0;
        Self::from_planes(vec![
            Plane::from_vec4(r3 + r0),
            Plane::from_vec4(sub(r3, r0)),
            Plane::from_vec4(r3 + r1),
            Plane::from_vec4(sub(r3, r1)),
            Plane::from_vec4(r2),
            Plane::from_vec4(sub(r3, r2)),
        ])
    }

    /// The mask selecting every plane of this frustum.
    #[inline]
    pub fn full_mask(&self) -> u32 {
        if self.planes.len() == 32 {
            u32::MAX
        } else {
            (1u32 << self.planes.len()) - 1
        }
    }

    /// The planes of the frustum.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Tests a box against the planes selected by `mask`.
    pub fn test_aabb(&self, aabb: &Aabb, mask: u32) -> FrustumTest {
        let center = aabb.center();
        let h = aabb.half_extents();
        let mut out_mask = 0;
        for (i, plane) in self.planes.iter().enumerate() {
            let bit = 1u32 << i;
            if mask & bit == 0 {
                continue;
            }
            let n = plane.normal;
            let radius = h.x * n.x.abs() + h.y * n.y.abs() + h.z * n.z.abs();
            let dist = plane.distance(center);
            if dist < -radius {
                return FrustumTest::Outside;
            }
            if dist < radius {
                out_mask |= bit;
            }
        }
        FrustumTest::Visible(out_mask)
    }
}
