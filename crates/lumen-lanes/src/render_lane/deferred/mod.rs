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

//! Deferred shading over a render tree.
//!
//! Opaque meshes are drawn once into a G-buffer ([`GBuffer`]), lights are
//! then accumulated from the G-buffer contents ([`light_render`]) and
//! everything that cannot be deferred (transparent, alpha blended and
//! portal meshes) is drawn forward on top ([`DeferredTreeRenderer`]).
//!
//! Which meshes go forward is decided when their mesh node is created: the
//! [`DeferredTreeTraits`] set the `use_forward_rendering` bit of the node
//! key from a [`ForwardPriorityMask`].

mod gbuffer;
pub mod global_illum;
pub mod light_render;
pub mod shadow_pssm;
mod tree_renderer;

pub use self::gbuffer::{GBuffer, GBufferDescription};
pub use self::global_illum::{BufferResolution, GlobalIllumConfig, GlobalIllumRenderer};
pub use self::light_render::{DeferredLightRenderer, LightRenderConfig, LightRenderData};
pub use self::shadow_pssm::{PssmShadows, ShadowConfig};
pub use self::tree_renderer::{DeferredStats, DeferredTreeRenderer, DEBUG_FLAG_LIGHT_VOLUMES};

use super::forward::ForwardError;
use super::layers::{setup_shaders_with, setup_sv_array, ContextShaderSetup, RenderLayers};
use super::render_tree::{ContextHandle, MeshNodeKey, RenderTree, TreeError, TreeTraits};
use lumen_core::renderer::{
    ResourceError, ShaderRegistry, ShaderVarNames, SHADER_TYPE_GBUFFER_FILL,
};
use lumen_core::scene::{RenderPriorities, RenderPriority, SortMode};
use thiserror::Error;

/// The priorities drawn forward unless configured otherwise.
pub const DEFAULT_FORWARD_PRIORITIES: &str = "alpha, transp, portal";

/// Errors raised by the deferred pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeferredError {
    /// A buffer was attached while already attached.
    #[error("{0} is already attached")]
    AlreadyAttached(&'static str),
    /// A buffer was detached without being attached.
    #[error("{0} is not attached")]
    NotAttached(&'static str),
    /// A component was used before its resources were created.
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),
    /// A setting is outside what the stage can allocate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The device rejected a texture, a buffer or a target set.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The tree is not set up for drawing.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl From<ForwardError> for DeferredError {
    fn from(e: ForwardError) -> Self {
        match e {
            ForwardError::Resource(e) => DeferredError::Resource(e),
            ForwardError::Tree(e) => DeferredError::Tree(e),
        }
    }
}

/// The set of render priorities drawn forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ForwardPriorityMask {
    bits: u64,
}

impl ForwardPriorityMask {
    /// The largest priority the mask can hold, plus one.
    pub const CAPACITY: u32 = u64::BITS;

    /// A mask routing every priority to the deferred path.
    pub const EMPTY: Self = Self { bits: 0 };

    /// Resolves a comma separated list of priority names.
    ///
    /// Unknown names are logged and skipped.
    pub fn resolve(names: &str, priorities: &RenderPriorities) -> Self {
        let mut mask = Self::EMPTY;
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match priorities.resolve(name) {
                Some(priority) => mask.insert(priority),
                None => log::warn!("Deferred: unknown forward render priority '{name}'"),
            }
        }
        mask
    }

    /// Adds a priority. Priorities past [`Self::CAPACITY`] are ignored.
    pub fn insert(&mut self, priority: RenderPriority) {
        if priority.0 < Self::CAPACITY {
            self.bits |= 1 << priority.0;
        } else {
            log::warn!("Deferred: render priority {} cannot be drawn forward", priority.0);
        }
    }

    /// Returns `true` when meshes of `priority` are drawn forward.
    pub fn contains(&self, priority: RenderPriority) -> bool {
        priority.0 < Self::CAPACITY && self.bits & (1 << priority.0) != 0
    }

    /// Returns `true` when every priority is deferred.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

/// Tree traits of the deferred pipeline: node keys carry the forward bit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredTreeTraits {
    /// The priorities drawn forward.
    pub forward: ForwardPriorityMask,
}

impl DeferredTreeTraits {
    /// Traits routing `forward` to the forward renderer.
    pub fn new(forward: ForwardPriorityMask) -> Self {
        Self { forward }
    }
}

impl TreeTraits for DeferredTreeTraits {
    type ContextExtra = ();
    type MeshNodeExtra = ();
    type MeshExtra = ();

    fn mesh_node_key(
        &self,
        priority: RenderPriority,
        sort_mode: SortMode,
        is_portal: bool,
    ) -> MeshNodeKey {
        MeshNodeKey {
            priority,
            is_portal,
            use_forward_rendering: self.forward.contains(priority),
            sort_mode,
        }
    }
}

/// Shader setup for deferred contexts.
///
/// Forward meshes pick their shaders through the render layers like in a
/// forward tree. Deferred meshes are drawn only in layer 0, with their
/// material's G-buffer fill shader.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredShaderSetup {
    layers: RenderLayers,
}

impl DeferredShaderSetup {
    /// Setup drawing forward meshes through `layers`.
    pub fn new(layers: RenderLayers) -> Self {
        Self { layers }
    }

    /// The forward layers.
    pub fn layers(&self) -> &RenderLayers {
        &self.layers
    }
}

impl Default for DeferredShaderSetup {
    fn default() -> Self {
        Self::new(RenderLayers::default())
    }
}

impl<T: TreeTraits> ContextShaderSetup<T> for DeferredShaderSetup {
    fn setup_shaders(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        registry: &ShaderRegistry,
        names: &ShaderVarNames,
    ) -> Result<(), TreeError> {
        let layer_count = self.layers.len().max(1);
        setup_sv_array(tree, ctx, layer_count, names)?;
        setup_shaders_with(tree, ctx, layer_count, registry, |layer, node, mesh| {
            let material = &mesh.render_mesh.material;
            if node.key.use_forward_rendering {
                self.layers.get(layer).and_then(|l| l.shader_for(material))
            } else if layer == 0 {
                material.shader(SHADER_TYPE_GBUFFER_FILL)
            } else {
                None
            }
        })
    }
}
