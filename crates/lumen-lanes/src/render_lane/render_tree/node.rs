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
//! Context nodes, mesh nodes and the meshes they hold.

use super::traits::{MeshNodeKey, TreeTraits};
use crate::render_lane::svarray::SvArrayHolder;
use lumen_core::lumen_bitflags;
use lumen_core::math::Transform;
use lumen_core::renderer::{
    PreCopy, RenderMesh, RenderTargets, ShaderId, ShaderTicket, ShaderVarRef, ZBufMode,
};
use lumen_core::scene::{MeshWrapper, PortalContainer, RenderView};
use lumen_data::allocators::ArenaHandle;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Handle to a context node of a render tree.
pub type ContextHandle<T> = ArenaHandle<ContextNode<T>>;
/// Handle to a mesh node of a render tree.
pub type MeshNodeHandle<T> = ArenaHandle<MeshNode<T>>;

lumen_bitflags! {
    /// How a context's targets are prepared before drawing.
    pub struct DrawFlags: u32 {
        /// Clear the depth buffer.
        const CLEAR_ZBUFFER = 1 << 0;
        /// Clear the color buffers.
        const CLEAR_SCREEN = 1 << 1;
        /// Draw 3D geometry.
        const DRAW_3D = 1 << 2;
    }
}

/// A portal object met during visibility collection.
#[derive(Debug, Clone)]
pub struct PortalHolder {
    /// The portals.
    pub container: Rc<PortalContainer>,
    /// The object holding them.
    pub mesh_wrapper: Rc<MeshWrapper>,
}

/// What a visibility collector knows about a mesh wrapper when adding its
/// render meshes.
#[derive(Debug, Clone)]
pub struct MeshTemplate {
    /// The object the meshes belong to.
    pub mesh_wrapper: Rc<MeshWrapper>,
    /// Object-to-world transform.
    pub object_to_world: Transform,
    /// Depth-buffer mode, unless a render mesh overrides it.
    pub z_mode: ZBufMode,
    /// Render-target snapshots taken before drawing.
    pub pre_copies: Vec<PreCopy>,
}

impl MeshTemplate {
    /// A template for `mesh_wrapper` at its own transform and z-mode.
    pub fn for_wrapper(mesh_wrapper: Rc<MeshWrapper>) -> Self {
        Self {
            object_to_world: mesh_wrapper.transform,
            z_mode: mesh_wrapper.z_mode,
            pre_copies: Vec::new(),
            mesh_wrapper,
        }
    }
}

/// One drawable instance.
#[derive(Debug)]
pub struct SingleMesh<T: TreeTraits> {
    /// The object the mesh belongs to.
    pub mesh_wrapper: Rc<MeshWrapper>,
    /// The geometry and material.
    pub render_mesh: Rc<RenderMesh>,
    /// The object-to-world transform variable.
    pub object_to_world: ShaderVarRef,
    /// Index of the mesh in the context's flat arrays.
    pub context_local_id: usize,
    /// Effective depth-buffer mode.
    pub z_mode: ZBufMode,
    /// Render-target snapshots taken before drawing.
    pub pre_copies: Vec<PreCopy>,
    /// Extra data.
    pub extra: T::MeshExtra,
}

/// A bucket of meshes sharing a key.
#[derive(Debug)]
pub struct MeshNode<T: TreeTraits> {
    /// The owning context.
    pub context: ContextHandle<T>,
    /// The key shared by all meshes.
    pub key: MeshNodeKey,
    /// Meshes in insertion order (or sorted, see `RenderTree::sort_meshes`).
    pub meshes: Vec<SingleMesh<T>>,
    /// Extra data.
    pub extra: T::MeshNodeExtra,
}

/// One (view, render target) combination drawn this frame.
#[derive(Debug)]
pub struct ContextNode<T: TreeTraits> {
    /// The view rendered.
    pub view: Rc<RenderView>,
    /// Where the context renders to.
    pub render_targets: RenderTargets,
    /// Camera-to-world transform.
    pub camera_transform: Transform,
    /// Target preparation flags.
    pub draw_flags: DrawFlags,
    /// Portal objects met while collecting.
    pub portals: Vec<PortalHolder>,
    /// The per-mesh variable stacks.
    pub sv_array: SvArrayHolder,
    /// One shader per (layer, mesh), at `layer * total_render_meshes + id`.
    pub shader_array: Vec<Option<ShaderId>>,
    /// The ticket of each entry of `shader_array`.
    pub ticket_array: Vec<ShaderTicket>,
    /// Extra data.
    pub extra: T::ContextExtra,
    pub(super) mesh_nodes: BTreeMap<MeshNodeKey, MeshNodeHandle<T>>,
    pub(super) total_render_meshes: usize,
}

impl<T: TreeTraits> ContextNode<T> {
    pub(super) fn new(view: Rc<RenderView>) -> Self {
        Self {
            camera_transform: view.camera.transform,
            view,
            render_targets: RenderTargets::SCREEN,
            draw_flags: DrawFlags::CLEAR_ZBUFFER | DrawFlags::DRAW_3D,
            portals: Vec::new(),
            sv_array: SvArrayHolder::new(),
            shader_array: Vec::new(),
            ticket_array: Vec::new(),
            extra: T::ContextExtra::default(),
            mesh_nodes: BTreeMap::new(),
            total_render_meshes: 0,
        }
    }

    /// Number of meshes added to the context.
    pub fn total_render_meshes(&self) -> usize {
        self.total_render_meshes
    }

    /// Number of mesh nodes.
    pub fn mesh_node_count(&self) -> usize {
        self.mesh_nodes.len()
    }

    /// The mesh node holding `key`, if any.
    pub fn mesh_node_for(&self, key: &MeshNodeKey) -> Option<MeshNodeHandle<T>> {
        self.mesh_nodes.get(key).copied()
    }

    /// Number of layers `shader_array` is sized for.
    pub fn layer_count(&self) -> usize {
        if self.total_render_meshes == 0 {
            0
        } else {
            self.shader_array.len() / self.total_render_meshes
        }
    }

    /// The shader and ticket of mesh `id` in `layer`.
    pub fn shader_for(&self, layer: usize, id: usize) -> Option<(ShaderId, ShaderTicket)> {
        let index = layer * self.total_render_meshes + id;
        let shader = (*self.shader_array.get(index)?)?;
        Some((shader, self.ticket_array.get(index).copied().unwrap_or_default()))
    }
}
