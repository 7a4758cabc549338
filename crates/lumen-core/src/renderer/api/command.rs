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

//! Descriptors and types for render passes and draw calls.

use super::buffer::BufferId;
use super::shader::{ShaderId, ShaderTicket, ShaderVarRef};
use super::target::RenderTargets;
use crate::math::{LinearRgba, Transform};

/// An opaque handle to a command buffer that has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// An opaque handle to an occlusion query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcclusionQueryId(pub u64);

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// A descriptor for a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// The targets written by the pass. An empty set renders to the screen.
    pub targets: RenderTargets,
    /// What happens to the color attachments at the start of the pass.
    pub color_load: LoadOp<LinearRgba>,
    /// What happens to the depth attachment at the start of the pass.
    pub depth_load: LoadOp<f32>,
}

impl<'a> RenderPassDescriptor<'a> {
    /// A pass that keeps the existing contents of `targets`.
    pub fn load(label: &'a str, targets: RenderTargets) -> Self {
        Self {
            label: Some(label),
            targets,
            color_load: LoadOp::Load,
            depth_load: LoadOp::Load,
        }
    }

    /// A pass that clears color to `color` and depth to `1.0`.
    pub fn clear(label: &'a str, targets: RenderTargets, color: LinearRgba) -> Self {
        Self {
            label: Some(label),
            targets,
            color_load: LoadOp::Clear(color),
            depth_load: LoadOp::Clear(1.0),
        }
    }
}

/// Z-buffer mode of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ZBufMode {
    /// Neither test nor write.
    None,
    /// Write without testing.
    Fill,
    /// Test without writing.
    Test,
    /// Test and write.
    #[default]
    Use,
    /// Pass only where depth is equal.
    Equal,
}

/// How a draw blends into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MixMode {
    /// Overwrite.
    #[default]
    Copy,
    /// Alpha blending.
    Alpha,
    /// Additive blending.
    Add,
    /// Multiplicative blending.
    Multiply,
}

/// Face culling of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Cull back faces.
    #[default]
    Normal,
    /// Cull front faces (used when the camera is inside a volume, or mirrored).
    Reverse,
    /// No culling.
    None,
}

impl CullMode {
    /// Swaps `Normal` and `Reverse`.
    pub fn flipped(self) -> Self {
        match self {
            CullMode::Normal => CullMode::Reverse,
            CullMode::Reverse => CullMode::Normal,
            CullMode::None => CullMode::None,
        }
    }
}

/// A single draw of some geometry with a shader.
#[derive(Debug, Clone)]
pub struct DrawCall {
    /// The geometry to draw.
    pub geometry: BufferId,
    /// The shader to draw with.
    pub shader: ShaderId,
    /// The shader technique.
    pub ticket: ShaderTicket,
    /// The pass of the technique being drawn.
    pub pass: u32,
    /// The object-to-world transform.
    pub object_to_world: Transform,
    /// Depth test/write mode.
    pub z_mode: ZBufMode,
    /// Blending mode.
    pub mix_mode: MixMode,
    /// Face culling.
    pub cull_mode: CullMode,
    /// The resolved variable stack.
    pub variables: Vec<ShaderVarRef>,
}
