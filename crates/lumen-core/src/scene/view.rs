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

//! Cameras and render views.

use super::sector::Sector;
use crate::math::{Box2, Frustum, Mat4, Transform, Vec2, Vec3, Vec4, EPSILON};
use std::rc::Rc;

/// A camera: a camera-to-world transform and a projection.
///
/// The camera looks down its negative Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Camera-to-world transform.
    pub transform: Transform,
    /// The projection matrix (depth range `[0, 1]`).
    pub projection: Mat4,
    /// Whether the view is mirrored, which flips face culling.
    pub mirrored: bool,
}

impl Camera {
    /// Creates an unmirrored camera.
    pub fn new(transform: Transform, projection: Mat4) -> Self {
        Self {
            transform,
            projection,
            mirrored: false,
        }
    }

    /// The world-space position of the camera.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.transform.translation()
    }

    /// The world-to-camera transform.
    #[inline]
    pub fn world_to_camera(&self) -> Transform {
        self.transform.inverse()
    }

    /// Projection times world-to-camera.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.world_to_camera().to_mat4()
    }

    /// The world-space view frustum.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Projects a world-space point to pixel coordinates (origin bottom-left).
    /// Returns `None` for points behind the camera.
    pub fn project_to_screen(&self, p: Vec3, width: u32, height: u32) -> Option<Vec2> {
        let clip = self.view_projection() * Vec4::from_vec3(p, 1.0);
        if clip.w <= EPSILON {
            return None;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        Some(Vec2::new(
            (ndc_x + 1.0) * 0.5 * width as f32,
            (ndc_y + 1.0) * 0.5 * height as f32,
        ))
    }
}

/// Everything needed to render one view of the world: camera, starting
/// sector and output size.
#[derive(Debug, Clone)]
pub struct RenderView {
    /// The camera.
    pub camera: Camera,
    /// The sector the camera is in.
    pub sector: Rc<Sector>,
    /// The output width in pixels.
    pub width: u32,
    /// The output height in pixels.
    pub height: u32,
    /// Screen-space clip rectangle, set for views seen through a portal.
    pub clip_rect: Option<Box2>,
    /// The sector this view was entered from, for views seen through a portal.
    pub previous_sector: Option<Rc<Sector>>,
}

impl RenderView {
    /// Creates a top-level view.
    pub fn new(camera: Camera, sector: Rc<Sector>, width: u32, height: u32) -> Self {
        Self {
            camera,
            sector,
            width,
            height,
            clip_rect: None,
            previous_sector: None,
        }
    }

    /// Creates the view seen through a portal of this view.
    pub fn through_portal(&self, camera: Camera, target: Rc<Sector>, clip_rect: Box2) -> Self {
        Self {
            camera,
            sector: target,
            width: self.width,
            height: self.height,
            clip_rect: Some(clip_rect),
            previous_sector: Some(self.sector.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_in_front_project_to_the_screen_center() {
        let camera = Camera::new(
            Transform::IDENTITY,
            Mat4::perspective_rh_zo(1.0, 1.0, 0.1, 100.0),
        );
        let p = camera
            .project_to_screen(Vec3::new(0.0, 0.0, -5.0), 800, 600)
            .expect("in front of the camera");
        assert!((p.x - 400.0).abs() < 1e-3);
        assert!((p.y - 300.0).abs() < 1e-3);
        assert!(camera
            .project_to_screen(Vec3::new(0.0, 0.0, 5.0), 800, 600)
            .is_none());
    }
}
