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
//! Portals connecting sectors.

use super::sector::Sector;
use super::view::Camera;
use crate::lumen_bitflags;
use crate::math::{Box2, Transform, Vec2, Vec3};
use std::rc::Rc;

lumen_bitflags! {
    /// Per-portal behavior flags.
    pub struct PortalFlags: u32 {
        /// Clip geometry behind the portal plane in the target sector.
        const CLIP_DEST = 1 << 0;
        /// Clip objects straddling the portal.
        const CLIP_STRADDLING = 1 << 1;
        /// Fill the depth buffer with the portal polygon after rendering it.
        const ZFILL = 1 << 2;
        /// The portal is a mirror.
        const MIRROR = 1 << 3;
        /// The portal floats in space rather than lying on a sector boundary.
        const FLOAT = 1 << 4;
        /// The portal warps space (has a warp transform).
        const WARP = 1 << 5;
    }
}

impl PortalFlags {
    /// Flags that need an off-screen render of the target sector.
    pub const HEAVY: Self = Self::CLIP_DEST
        .with(Self::CLIP_STRADDLING)
        .with(Self::ZFILL)
        .with(Self::MIRROR)
        .with(Self::FLOAT);
}

/// A polygon through which another sector is visible.
#[derive(Debug, Clone)]
pub struct Portal {
    /// A human-readable name.
    pub name: String,
    /// Behavior flags.
    pub flags: PortalFlags,
    /// The sector seen through the portal. `None` for unconnected portals.
    pub target_sector: Option<Rc<Sector>>,
    /// World-space polygon vertices.
    pub vertices: Vec<Vec3>,
    /// How many times the target may be entered recursively.
    pub max_sector_visit: u32,
    /// Space warp applied to the camera when looking through.
    pub warp: Option<Transform>,
}

impl Portal {
    /// Creates an unflagged portal.
    pub fn new(name: impl Into<String>, target_sector: Option<Rc<Sector>>, vertices: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            flags: PortalFlags::EMPTY,
            target_sector,
            vertices,
            max_sector_visit: 5,
            warp: None,
        }
    }

    /// Returns `true` when the target can be rendered into the same context.
    /// Warping portals can still be simple.
    pub fn is_simple(&self) -> bool {
        !self.flags.intersects(PortalFlags::HEAVY)
    }

    /// The camera seen through the portal: warped when the portal carries
    /// [`PortalFlags::WARP`] and a warp transform, mirrored when it carries
    /// [`PortalFlags::MIRROR`].
    pub fn camera_through(&self, camera: &Camera) -> Camera {
        let mut through = *camera;
        if self.flags.contains(PortalFlags::WARP) {
            if let Some(warp) = self.warp {
                through.transform = warp * camera.transform;
            }
        }
        if self.flags.contains(PortalFlags::MIRROR) {
            through.mirrored = !camera.mirrored;
        }
        through
    }

    /// Screen-space bounds of the portal polygon, clamped to the viewport.
    ///
    /// A polygon crossing the camera plane covers the whole viewport.
    /// Returns `None` when the polygon is empty or entirely off-screen.
    pub fn screen_box(&self, camera: &Camera, width: u32, height: u32) -> Option<Box2> {
        if self.vertices.is_empty() {
            return None;
        }
        let viewport = Box2 {
            min: Vec2::ZERO,
            max: Vec2::new(width as f32, height as f32),
        };
        let projected: Option<Vec<Vec2>> = self
            .vertices
            .iter()
            .map(|v| camera.project_to_screen(*v, width, height))
            .collect();
        let Some(points) = projected else {
            return Some(viewport);
        };
        let b = Box2::from_points(&points)?;
        let min = b.min.max(viewport.min);
        let max = b.max.min(viewport.max);
        if min.x >= max.x || min.y >= max.y {
            return None;
        }
        Some(Box2 { min, max })
    }
}

/// The portals of a portal object.
#[derive(Debug, Clone, Default)]
pub struct PortalContainer {
    /// The portals.
    pub portals: Vec<Portal>,
}

impl PortalContainer {
    /// Wraps a set of portals.
    pub fn new(portals: Vec<Portal>) -> Self {
        Self { portals }
    }
}
