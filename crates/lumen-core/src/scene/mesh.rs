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
//! Mesh wrappers: the scene objects a visibility culler reports.

use super::portal::PortalContainer;
use super::priority::RenderPriority;
use crate::math::{Aabb, Transform};
use crate::renderer::{RenderMesh, ZBufMode};
use std::rc::Rc;

/// Identifies a mesh wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshWrapperId(pub u32);

/// A placed object: a transform, bounds and the render meshes it draws.
///
/// A mesh wrapper that holds a [`PortalContainer`] is a portal object.
#[derive(Debug, Clone)]
pub struct MeshWrapper {
    /// The wrapper id.
    pub id: MeshWrapperId,
    /// A human-readable name.
    pub name: String,
    /// The priority bucket the meshes are drawn in.
    pub render_priority: RenderPriority,
    /// Object-to-world transform.
    pub transform: Transform,
    /// Object-space bounds.
    pub bbox: Aabb,
    /// The meshes to draw.
    pub render_meshes: Vec<Rc<RenderMesh>>,
    /// The portals, for portal objects.
    pub portals: Option<Rc<PortalContainer>>,
    /// Depth-buffer mode used when a render mesh does not set one.
    pub z_mode: ZBufMode,
    /// Invisible wrappers are never reported by cullers.
    pub invisible: bool,
}

impl MeshWrapper {
    /// Creates a visible wrapper at the identity transform.
    pub fn new(id: MeshWrapperId, name: impl Into<String>, render_priority: RenderPriority) -> Self {
        Self {
            id,
            name: name.into(),
            render_priority,
            transform: Transform::IDENTITY,
            bbox: Aabb::INVALID,
            render_meshes: Vec::new(),
            portals: None,
            z_mode: ZBufMode::default(),
            invisible: false,
        }
    }

    /// World-space bounds.
    pub fn world_bbox(&self) -> Aabb {
        self.bbox.transformed(&self.transform)
    }

    /// Returns `true` for portal objects.
    #[inline]
    pub fn is_portal(&self) -> bool {
        self.portals.is_some()
    }
}
