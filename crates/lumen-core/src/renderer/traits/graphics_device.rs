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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The resource-creation and submission interface of a graphics backend.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Returns the limits and features of the device.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - The requested size, format and flags.
    /// ## Returns
    /// The ID of the created texture. The device may allocate a larger texture
    /// than requested; query [`GraphicsDevice::texture_info`] for the result.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Returns what the device actually allocated for a texture.
    fn texture_info(&self, id: TextureId) -> Result<TextureInfo, ResourceError>;

    /// Uploads texel data into the first mip level of a texture.
    fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer and initializes it with the provided data.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Writes data to a GPU buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Checks that a set of render targets can be bound together (matching
    /// sizes, supported formats, attachment count within limits).
    fn validate_render_targets(&self, targets: &RenderTargets) -> Result<(), ResourceError>;

    /// Creates a new command encoder to record GPU commands.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a previously recorded command buffer to the GPU for execution.
    fn submit_command_buffer(&self, command_buffer: CommandBufferId);

    /// Creates an occlusion query. Devices without query support fail.
    fn create_occlusion_query(&self) -> Result<OcclusionQueryId, ResourceError> {
        Err(ResourceError::BackendError(
            "occlusion queries are not supported".to_string(),
        ))
    }

    /// Destroys an occlusion query.
    fn destroy_occlusion_query(&self, _query: OcclusionQueryId) -> Result<(), ResourceError> {
        Err(ResourceError::InvalidHandle)
    }

    /// Polls a query without waiting.
    /// ## Returns
    /// `Some(true)` when any sample of the draws recorded inside the query
    /// passed the depth test, `Some(false)` when none did and `None` while
    /// the result is not available yet.
    fn occlusion_query_result(&self, _query: OcclusionQueryId) -> Option<bool> {
        None
    }
}
