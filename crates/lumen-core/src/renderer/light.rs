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

//! Defines light types for the rendering system.
//!
//! Lights live in sectors and are consumed by the deferred light renderer,
//! which draws one bounding volume per light.

use crate::math::{LinearRgba, Transform, Vec3};

/// The shape of a light's area of influence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// An omni-directional light; its volume is a sphere of radius
    /// `cutoff_distance`.
    Point,
    /// A cone-shaped light.
    Spot {
        /// Cosine of the angle where the falloff starts.
        inner: f32,
        /// Cosine of the angle where the light is fully attenuated.
        outer: f32,
    },
    /// A light with parallel rays; its volume is a box extending
    /// `cutoff_distance` along the light direction.
    Directional {
        /// Half-width of the lit box perpendicular to the light direction.
        cutoff_radius: f32,
    },
}

/// A light source.
///
/// The light shines along the positive Z axis of its transform.
///
/// # Examples
///
/// ```
/// use lumen_core::renderer::light::{Light, LightKind};
/// use lumen_core::math::{LinearRgba, Transform, Vec3};
///
/// let lamp = Light::point(Vec3::new(0.0, 3.0, 0.0), 10.0, LinearRgba::WHITE);
/// assert_eq!(lamp.kind, LightKind::Point);
/// assert_eq!(lamp.position(), Vec3::new(0.0, 3.0, 0.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// The light shape.
    pub kind: LightKind,
    /// Light-to-world transform.
    pub transform: Transform,
    /// The color of the light in linear RGB space.
    pub color: LinearRgba,
    /// The distance beyond which the light has no effect.
    pub cutoff_distance: f32,
}

impl Light {
    /// Creates a point light at `position`.
    pub fn point(position: Vec3, cutoff_distance: f32, color: LinearRgba) -> Self {
        Self {
            kind: LightKind::Point,
            transform: Transform::from_translation(position),
            color,
            cutoff_distance,
        }
    }

    /// The world-space position of the light.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.transform.translation()
    }

    /// The normalized world-space direction of the light.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.transform.transform_direction(Vec3::Z).normalize()
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::point(Vec3::ZERO, 10.0, LinearRgba::WHITE)
    }
}
