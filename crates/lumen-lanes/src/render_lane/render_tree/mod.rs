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
//! The render tree: per-frame contexts, each holding key-ordered mesh nodes.
//!
//! A [`RenderTree`] borrows the [`PersistentData`] owning the node arenas
//! for one frame. Contexts are kept in an explicit draw order; mesh nodes are
//! created lazily per (context, key) and visited in ascending key order.
//! Dropping the tree returns every node to the arenas.

mod node;
mod traits;

pub use node::*;
pub use traits::*;

use crate::render_lane::svarray::SvArrayError;
use ahash::{AHashMap, AHashSet};
use lumen_core::renderer::{
    RenderMesh, ShaderTicket, ShaderValue, ShaderVarName, ShaderVarNames, ShaderVariable,
};
use lumen_core::scene::{RenderPriorities, RenderPriority, RenderView, SortMode};
use lumen_data::allocators::FrameArena;
use std::cmp::Ordering;
use std::rc::Rc;
use thiserror::Error;

/// Name of the per-mesh object-to-world shader variable.
pub const OBJECT_TO_WORLD_SV: &str = "object2world transform";

/// Contract violations reported by the render tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The context is not (or no longer) part of the tree.
    #[error("context is not present in the render tree")]
    ContextNotPresent,
    /// The mesh node is not (or no longer) part of the tree.
    #[error("mesh node is not present in the render tree")]
    MeshNodeNotPresent,
    /// A mesh node already exists for the key in the context.
    #[error("a mesh node already exists for {0:?}")]
    DuplicateMeshNode(MeshNodeKey),
    /// A layer index is outside the context's layers.
    #[error("layer {layer} is out of range ({layer_count} layers)")]
    LayerOutOfRange {
        /// The requested layer.
        layer: usize,
        /// The number of layers.
        layer_count: usize,
    },
    /// The SV array rejected an operation.
    #[error(transparent)]
    SvArray(#[from] SvArrayError),
}

#[derive(Debug, Default)]
struct DebugFlags {
    ids: AHashMap<String, u32>,
    enabled: AHashSet<u32>,
}

/// State that outlives a frame: node arenas, key policy, priorities and debug
/// flags.
#[derive(Debug)]
pub struct PersistentData<T: TreeTraits> {
    contexts: FrameArena<ContextNode<T>>,
    mesh_nodes: FrameArena<MeshNode<T>>,
    traits: T,
    priorities: Rc<RenderPriorities>,
    object_to_world: ShaderVarName,
    debug_flags: DebugFlags,
}

impl<T: TreeTraits> PersistentData<T> {
    /// Creates the persistent data, interning the object-to-world variable
    /// name in `names`.
    pub fn new(traits: T, priorities: Rc<RenderPriorities>, names: &mut ShaderVarNames) -> Self {
        Self {
            contexts: FrameArena::new(),
            mesh_nodes: FrameArena::new(),
            traits,
            priorities,
            object_to_world: names.intern(OBJECT_TO_WORLD_SV),
            debug_flags: DebugFlags::default(),
        }
    }

    /// The key policy.
    pub fn traits(&self) -> &T {
        &self.traits
    }

    /// The key policy, mutably. Keys of meshes already added are unaffected.
    pub fn traits_mut(&mut self) -> &mut T {
        &mut self.traits
    }

    /// The priority table.
    pub fn priorities(&self) -> &Rc<RenderPriorities> {
        &self.priorities
    }

    /// The object-to-world variable name.
    pub fn object_to_world_name(&self) -> ShaderVarName {
        self.object_to_world
    }

    /// Releases every node at once.
    pub fn clear(&mut self) {
        self.mesh_nodes.clear();
        self.contexts.clear();
    }

    /// Number of live contexts in the arena.
    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Number of live mesh nodes in the arena.
    pub fn live_mesh_nodes(&self) -> usize {
        self.mesh_nodes.len()
    }

    /// Registers a named debug flag and returns its id.
    pub fn register_debug_flag(&mut self, name: &str) -> u32 {
        let next = self.debug_flags.ids.len() as u32;
        *self
            .debug_flags
            .ids
            .entry(name.to_string())
            .or_insert(next)
    }

    /// Enables or disables a debug flag, registering it if needed.
    pub fn enable_debug_flag(&mut self, name: &str, enable: bool) {
        let id = self.register_debug_flag(name);
        if enable {
            self.debug_flags.enabled.insert(id);
        } else {
            self.debug_flags.enabled.remove(&id);
        }
    }

    /// Returns `true` if the named debug flag is enabled.
    pub fn is_debug_flag_enabled(&self, name: &str) -> bool {
        self.debug_flags
            .ids
            .get(name)
            .is_some_and(|id| self.debug_flags.enabled.contains(id))
    }
}

/// The render tree of one frame.
#[derive(Debug)]
pub struct RenderTree<'p, T: TreeTraits> {
    persistent: &'p mut PersistentData<T>,
    order: Vec<ContextHandle<T>>,
}

impl<'p, T: TreeTraits> RenderTree<'p, T> {
    /// Starts a frame over `persistent`.
    pub fn new(persistent: &'p mut PersistentData<T>) -> Self {
        Self {
            persistent,
            order: Vec::new(),
        }
    }

    /// The persistent data.
    pub fn persistent(&self) -> &PersistentData<T> {
        self.persistent
    }

    /// The persistent data, mutably.
    pub fn persistent_mut(&mut self) -> &mut PersistentData<T> {
        self.persistent
    }

    /// Creates a context for `view`, appended to the draw order or placed
    /// right after `insert_after`.
    pub fn create_context(
        &mut self,
        view: Rc<RenderView>,
        insert_after: Option<ContextHandle<T>>,
    ) -> Result<ContextHandle<T>, TreeError> {
        let position = match insert_after {
            Some(after) => Some(self.position_of(after)? + 1),
            None => None,
        };
        let handle = self.persistent.contexts.alloc(ContextNode::new(view));
        match position {
            Some(p) => self.order.insert(p, handle),
            None => self.order.push(handle),
        }
        log::trace!("RenderTree: created context {handle:?}");
        Ok(handle)
    }

    /// Removes a context and its mesh nodes from the tree.
    pub fn destroy_context(&mut self, ctx: ContextHandle<T>) -> Result<(), TreeError> {
        let position = self.position_of(ctx)?;
        self.order.remove(position);
        let node = self
            .persistent
            .contexts
            .free(ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        for handle in node.mesh_nodes.into_values() {
            self.persistent.mesh_nodes.free(handle);
        }
        Ok(())
    }

    fn position_of(&self, ctx: ContextHandle<T>) -> Result<usize, TreeError> {
        self.order
            .iter()
            .position(|h| *h == ctx)
            .ok_or(TreeError::ContextNotPresent)
    }

    /// Contexts in draw order.
    pub fn contexts(&self) -> impl DoubleEndedIterator<Item = ContextHandle<T>> + '_ {
        self.order.iter().copied()
    }

    /// Contexts in reverse draw order.
    pub fn contexts_rev(&self) -> impl Iterator<Item = ContextHandle<T>> + '_ {
        self.order.iter().rev().copied()
    }

    /// Number of contexts in the tree.
    pub fn context_count(&self) -> usize {
        self.order.len()
    }

    /// Resolves a context.
    pub fn context(&self, ctx: ContextHandle<T>) -> Option<&ContextNode<T>> {
        self.persistent.contexts.get(ctx)
    }

    /// Resolves a context mutably.
    pub fn context_mut(&mut self, ctx: ContextHandle<T>) -> Option<&mut ContextNode<T>> {
        self.persistent.contexts.get_mut(ctx)
    }

    /// Resolves a mesh node.
    pub fn mesh_node(&self, node: MeshNodeHandle<T>) -> Option<&MeshNode<T>> {
        self.persistent.mesh_nodes.get(node)
    }

    /// Resolves a mesh node mutably.
    pub fn mesh_node_mut(&mut self, node: MeshNodeHandle<T>) -> Option<&mut MeshNode<T>> {
        self.persistent.mesh_nodes.get_mut(node)
    }

    /// The mesh nodes of a context in ascending key order.
    pub fn mesh_nodes(
        &self,
        ctx: ContextHandle<T>,
    ) -> impl DoubleEndedIterator<Item = MeshNodeHandle<T>> + '_ {
        self.context(ctx)
            .into_iter()
            .flat_map(|c| c.mesh_nodes.values().copied())
    }

    /// The mesh nodes of a context in descending key order.
    pub fn mesh_nodes_rev(
        &self,
        ctx: ContextHandle<T>,
    ) -> impl Iterator<Item = MeshNodeHandle<T>> + '_ {
        self.mesh_nodes(ctx).rev()
    }

    /// Creates an empty mesh node for `key` in `ctx`.
    pub fn create_mesh_node(
        &mut self,
        ctx: ContextHandle<T>,
        key: MeshNodeKey,
    ) -> Result<MeshNodeHandle<T>, TreeError> {
        let persistent = &mut *self.persistent;
        let context = persistent
            .contexts
            .get_mut(ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        if context.mesh_nodes.contains_key(&key) {
            return Err(TreeError::DuplicateMeshNode(key));
        }
        let handle = persistent.mesh_nodes.alloc(MeshNode {
            context: ctx,
            key,
            meshes: Vec::new(),
            extra: T::MeshNodeExtra::default(),
        });
        context.mesh_nodes.insert(key, handle);
        Ok(handle)
    }

    /// Removes a mesh node from its context and frees it.
    pub fn destroy_mesh_node(&mut self, node: MeshNodeHandle<T>) -> Result<(), TreeError> {
        let persistent = &mut *self.persistent;
        let removed = persistent
            .mesh_nodes
            .free(node)
            .ok_or(TreeError::MeshNodeNotPresent)?;
        if let Some(context) = persistent.contexts.get_mut(removed.context) {
            context.mesh_nodes.remove(&removed.key);
        }
        Ok(())
    }

    /// Adds a render mesh to a context and returns its context-local id.
    ///
    /// Every call appends a new mesh; nothing is de-duplicated.
    pub fn add_render_mesh(
        &mut self,
        ctx: ContextHandle<T>,
        render_mesh: Rc<RenderMesh>,
        priority: RenderPriority,
        template: &MeshTemplate,
    ) -> Result<usize, TreeError> {
        let sort_mode = self.persistent.priorities.sort_mode(priority);
        let key = self.persistent.traits.mesh_node_key(
            priority,
            sort_mode,
            template.mesh_wrapper.is_portal(),
        );
        let existing = self
            .context(ctx)
            .ok_or(TreeError::ContextNotPresent)?
            .mesh_node_for(&key);
        let node = match existing {
            Some(node) => node,
            None => self.create_mesh_node(ctx, key)?,
        };

        let persistent = &mut *self.persistent;
        let context = persistent
            .contexts
            .get_mut(ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        let id = context.total_render_meshes;
        context.total_render_meshes += 1;

        let mesh = SingleMesh {
            object_to_world: ShaderVariable::new(
                persistent.object_to_world,
                ShaderValue::Transform(template.object_to_world),
            ),
            z_mode: render_mesh.z_mode.unwrap_or(template.z_mode),
            mesh_wrapper: template.mesh_wrapper.clone(),
            render_mesh,
            context_local_id: id,
            pre_copies: template.pre_copies.clone(),
            extra: T::MeshExtra::default(),
        };
        persistent
            .mesh_nodes
            .get_mut(node)
            .ok_or(TreeError::MeshNodeNotPresent)?
            .meshes
            .push(mesh);
        Ok(id)
    }

    /// Records a portal object met in `ctx`.
    pub fn add_portal(
        &mut self,
        ctx: ContextHandle<T>,
        holder: PortalHolder,
    ) -> Result<(), TreeError> {
        self.context_mut(ctx)
            .ok_or(TreeError::ContextNotPresent)?
            .portals
            .push(holder);
        Ok(())
    }

    /// Orders the meshes of sorted mesh nodes by distance to the camera.
    pub fn sort_meshes(&mut self, ctx: ContextHandle<T>) -> Result<(), TreeError> {
        let persistent = &mut *self.persistent;
        let context = persistent
            .contexts
            .get(ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        let eye = context.view.camera.position();
        for (key, handle) in &context.mesh_nodes {
            if key.sort_mode == SortMode::None {
                continue;
            }
            let Some(node) = persistent.mesh_nodes.get_mut(*handle) else {
                continue;
            };
            let distance = |m: &SingleMesh<T>| {
                (m.mesh_wrapper.world_bbox().center() - eye).length_squared()
            };
            node.meshes.sort_by(|a, b| {
                let order = distance(a)
                    .partial_cmp(&distance(b))
                    .unwrap_or(Ordering::Equal);
                match key.sort_mode {
                    SortMode::BackToFront => order.reverse(),
                    _ => order,
                }
            });
        }
        Ok(())
    }

    /// Inserts a render layer after `after` in a context, copying shaders and
    /// tickets from layer `copy_from` and mirroring the insertion in the SV
    /// array.
    pub fn insert_layer(
        &mut self,
        ctx: ContextHandle<T>,
        after: usize,
        copy_from: usize,
    ) -> Result<(), TreeError> {
        let context = self.context_mut(ctx).ok_or(TreeError::ContextNotPresent)?;
        let total = context.total_render_meshes;
        let layer_count = context.layer_count();
        for layer in [after, copy_from] {
            if layer >= layer_count {
                return Err(TreeError::LayerOutOfRange { layer, layer_count });
            }
        }
        let src = copy_from * total..(copy_from + 1) * total;
        let shaders: Vec<_> = context.shader_array[src.clone()].to_vec();
        let tickets: Vec<ShaderTicket> = context.ticket_array[src].to_vec();
        let at = (after + 1) * total;
        context.shader_array.splice(at..at, shaders);
        context.ticket_array.splice(at..at, tickets);
        if context.sv_array.is_setup() {
            context.sv_array.insert_layer(after)?;
        }
        Ok(())
    }
}

impl<T: TreeTraits> Drop for RenderTree<'_, T> {
    fn drop(&mut self) {
        self.order.clear();
        self.persistent.clear();
    }
}

#[cfg(test)]
mod tests;
