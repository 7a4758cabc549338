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

//! Reversible affine transforms.

use super::{Mat3, Mat4, Vec3, Vec4};
use std::ops::Mul;

/// An affine transform that keeps its inverse linear part alongside the forward
/// one, so that mapping in both directions is equally cheap.
///
/// The forward direction maps from the transform's local space ("object" or
/// "camera" space) into its parent space (usually world space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    linear: Mat3,
    inverse_linear: Mat3,
    translation: Vec3,
}

impl Transform {
    /// The identity transform, which results in no change.
    pub const IDENTITY: Self = Self {
        linear: Mat3::IDENTITY,
        inverse_linear: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Creates a transform from a linear part and a translation.
    ///
    /// Returns `None` when `linear` is not invertible.
    pub fn try_new(linear: Mat3, translation: Vec3) -> Option<Self> {
        linear.inverse().map(|inverse_linear| Self {
            linear,
            inverse_linear,
            translation,
        })
    }

    /// Creates a pure translation.
    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform from an orthonormal rotation and a translation.
    /// The inverse rotation is the transpose.
    #[inline]
    pub fn from_rotation_translation(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            linear: rotation,
            inverse_linear: rotation.transpose(),
            translation,
        }
    }

    /// Creates a non-uniform scale. Zero components are clamped to a tiny
    /// value to keep the transform reversible.
    pub fn from_scale(scale: Vec3) -> Self {
        let fix = |v: f32| {
            if v.abs() < f32::EPSILON {
                f32::EPSILON
            } else {
                v
            }
        };
        let scale = Vec3::new(fix(scale.x), fix(scale.y), fix(scale.z));
        Self {
            linear: Mat3::from_scale(scale),
            inverse_linear: Mat3::from_scale(Vec3::new(1.0 / scale.x, 1.0 / scale.y, 1.0 / scale.z)),
            translation: Vec3::ZERO,
        }
    }

    /// The linear (rotation/scale) part of the forward mapping.
    #[inline]
    pub fn linear(&self) -> Mat3 {
        self.linear
    }

    /// The linear part of the inverse mapping.
    #[inline]
    pub fn inverse_linear(&self) -> Mat3 {
        self.inverse_linear
    }

    /// The translation, i.e. the local origin expressed in parent space.
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Maps a point from local space into parent space.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.linear * p + self.translation
    }

    /// Maps a point from parent space into local space.
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.inverse_linear * (p - self.translation)
    }

    /// Maps a direction from local space into parent space (no translation).
    #[inline]
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        self.linear * d
    }

    /// Returns the inverse transform.
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            linear: self.inverse_linear,
            inverse_linear: self.linear,
            translation: -(self.inverse_linear * self.translation),
        }
    }

    /// Expands the forward mapping into a 4x4 matrix.
    pub fn to_mat4(&self) -> Mat4 {
        let mut m = self.linear.to_mat4();
        m.cols[3] = Vec4::from_vec3(self.translation, 1.0);
        m
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Transform> for Transform {
    type Output = Transform;

    /// Composes two transforms: `(a * b)` applies `b` first, then `a`.
    #[inline]
    fn mul(self, rhs: Transform) -> Transform {
        Transform {
            linear: self.linear * rhs.linear,
            inverse_linear: rhs.inverse_linear * self.inverse_linear,
            translation: self.linear * rhs.translation + self.translation,
        }
    }
}
