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

use crate::math::{Mat4, Transform};
use crate::renderer::api::{
    CommandBufferId, DrawCall, OcclusionQueryId, PreCopy, RenderPassDescriptor,
};
use crate::renderer::error::ResourceError;

/// A trait representing an active render pass, used for recording drawing commands.
///
/// A `RenderPass` object is obtained from a [`CommandEncoder`]. The pass ends
/// when the object is dropped.
pub trait RenderPass {
    /// Sets the world-to-camera transform used by subsequent draws.
    fn set_world_to_camera(&mut self, world_to_camera: &Transform);

    /// Sets the projection matrix used by subsequent draws.
    fn set_projection(&mut self, projection: &Mat4);

    /// Copies bound attachments into textures before the next draw.
    fn copy_from_render_targets(&mut self, copies: &[PreCopy]) -> Result<(), ResourceError>;

    /// Records a draw call.
    fn draw_mesh(&mut self, call: &DrawCall);

    /// Starts counting the samples of the following draws into `query`.
    fn begin_occlusion_query(&mut self, _query: OcclusionQueryId) {}

    /// Stops the running query.
    fn end_occlusion_query(&mut self) {}
}

/// A trait for an object that records a sequence of GPU commands.
pub trait CommandEncoder {
    /// Begins a new render pass.
    ///
    /// The returned pass borrows the encoder mutably, so only one pass can be
    /// active at a time. Fails when the device rejects the pass targets.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn RenderPass + 'encoder>, ResourceError>;

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;
}
