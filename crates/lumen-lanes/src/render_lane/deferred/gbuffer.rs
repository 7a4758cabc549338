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

//! The G-buffer: the render targets the fill pass writes surface attributes
//! into, read back by the light renderers.

use super::DeferredError;
use lumen_core::renderer::{
    GraphicsDevice, RenderTarget, RenderTargetAttachment, RenderTargets, ResourceError,
    ShaderValue, ShaderVarContext, ShaderVarName, ShaderVarNames, ShaderVariable,
    TextureDescriptor, TextureFlags, TextureFormat, TextureId,
};
use std::borrow::Cow;

/// The shader variable holding the G-buffer depth texture.
pub const GBUFFER_DEPTH_SV: &str = "tex gbuffer depth";

/// The shader variable holding G-buffer color buffer `index`.
pub fn gbuffer_color_sv(index: usize) -> String {
    format!("tex gbuffer {index}")
}

/// Size and formats of a G-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferDescription {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of color buffers.
    pub color_buffer_count: usize,
    /// Whether a depth buffer is created.
    pub has_depth: bool,
    /// Format of every color buffer.
    pub color_format: TextureFormat,
    /// Format of the depth buffer.
    pub depth_format: TextureFormat,
}

impl GBufferDescription {
    /// The same description at another size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

impl Default for GBufferDescription {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            color_buffer_count: 3,
            has_depth: true,
            color_format: TextureFormat::Rgba16Float,
            depth_format: TextureFormat::Depth24Stencil8,
        }
    }
}

/// The G-buffer textures and their attachment state.
///
/// Attaching and detaching must alternate: attaching twice or detaching an
/// unattached buffer is an error.
#[derive(Debug)]
pub struct GBuffer {
    description: GBufferDescription,
    color_buffers: Vec<TextureId>,
    depth_buffer: Option<TextureId>,
    color_names: Vec<ShaderVarName>,
    depth_name: Option<ShaderVarName>,
    initialized: bool,
    attached: bool,
}

impl GBuffer {
    /// An empty, uninitialized G-buffer.
    pub fn new() -> Self {
        Self {
            description: GBufferDescription::default(),
            color_buffers: Vec::new(),
            depth_buffer: None,
            color_names: Vec::new(),
            depth_name: None,
            initialized: false,
            attached: false,
        }
    }

    /// An uninitialized G-buffer that [`resize`](Self::resize) creates
    /// with the buffer layout of `description`.
    pub fn with_description(description: GBufferDescription) -> Self {
        Self {
            description,
            ..Self::new()
        }
    }

    /// Creates the textures of `description`, releasing previous ones.
    ///
    /// Fails when the device binds fewer color attachments than requested,
    /// when a texture cannot be created or when the device rejects the
    /// resulting target set. Nothing stays allocated on failure.
    pub fn initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        description: GBufferDescription,
        names: &mut ShaderVarNames,
    ) -> Result<(), DeferredError> {
        if self.attached {
            return Err(DeferredError::AlreadyAttached("GBuffer"));
        }
        self.release(device);

        let max = device.capabilities().usable_color_attachments();
        if description.color_buffer_count > max {
            log::error!(
                "GBuffer: {} color buffers requested, the device supports {max}",
                description.color_buffer_count
            );
            return Err(ResourceError::AttachmentLimitExceeded {
                requested: description.color_buffer_count,
                max,
            }
            .into());
        }

        self.description = description;
        if let Err(e) = self.create_textures(device) {
            log::error!("GBuffer: could not create buffers: {e}");
            self.release(device);
            return Err(e.into());
        }
        if let Err(e) = device.validate_render_targets(&self.render_targets()) {
            log::error!(
                "GBuffer: {} x {} / {} is not supported by the device: {e}",
                description.color_buffer_count,
                description.color_format,
                description.depth_format
            );
            self.release(device);
            return Err(e.into());
        }

        self.color_names = (0..description.color_buffer_count)
            .map(|i| names.intern(&gbuffer_color_sv(i)))
            .collect();
        self.depth_name = Some(names.intern(GBUFFER_DEPTH_SV));
        self.initialized = true;
        log::debug!(
            "GBuffer: {}x{} with {} color buffers",
            description.width,
            description.height,
            description.color_buffer_count
        );
        Ok(())
    }

    fn create_textures(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let d = self.description;
        let flags = TextureFlags::RENDER_TARGET
            .with(TextureFlags::NO_MIPMAPS)
            .with(TextureFlags::CLAMP)
            .with(TextureFlags::NPOTS);
        for i in 0..d.color_buffer_count {
            let id = device.create_texture(&TextureDescriptor {
                label: Some(Cow::Owned(format!("GBuffer Color {i}"))),
                width: d.width,
                height: d.height,
                format: d.color_format,
                flags,
            })?;
            self.color_buffers.push(id);
        }
        if d.has_depth {
            self.depth_buffer = Some(device.create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed("GBuffer Depth")),
                width: d.width,
                height: d.height,
                format: d.depth_format,
                flags,
            })?);
        }
        Ok(())
    }

    /// Re-creates the textures when the size changed. Returns `true` when
    /// they were re-created.
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        names: &mut ShaderVarNames,
    ) -> Result<bool, DeferredError> {
        if self.initialized && self.size() == (width, height) {
            return Ok(false);
        }
        self.initialize(device, self.description.with_size(width, height), names)?;
        Ok(true)
    }

    /// Marks the buffer attached and returns its targets, after the device
    /// accepted them.
    pub fn attach(&mut self, device: &dyn GraphicsDevice) -> Result<RenderTargets, DeferredError> {
        if !self.initialized {
            return Err(DeferredError::NotInitialized("GBuffer"));
        }
        if self.attached {
            return Err(DeferredError::AlreadyAttached("GBuffer"));
        }
        let targets = self.render_targets();
        device.validate_render_targets(&targets)?;
        self.attached = true;
        Ok(targets)
    }

    /// Marks the buffer detached.
    pub fn detach(&mut self) -> Result<(), DeferredError> {
        if !self.attached {
            return Err(DeferredError::NotAttached("GBuffer"));
        }
        self.attached = false;
        Ok(())
    }

    /// Returns `true` between [`attach`](Self::attach) and
    /// [`detach`](Self::detach).
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Returns `true` once the textures exist.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The color buffers on `Color0` onwards and the depth buffer.
    pub fn render_targets(&self) -> RenderTargets {
        let mut targets = RenderTargets::SCREEN;
        for (i, id) in self.color_buffers.iter().enumerate() {
            if let Some(attachment) = RenderTargetAttachment::color(i) {
                targets.set(attachment, Some(RenderTarget::new(*id)));
            }
        }
        targets.set(
            RenderTargetAttachment::Depth,
            self.depth_buffer.map(RenderTarget::new),
        );
        targets
    }

    /// The description the buffer was created from.
    pub fn description(&self) -> &GBufferDescription {
        &self.description
    }

    /// The size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.description.width, self.description.height)
    }

    /// Color buffer `index`.
    pub fn color_buffer(&self, index: usize) -> Option<TextureId> {
        self.color_buffers.get(index).copied()
    }

    /// The number of color buffers.
    pub fn color_buffer_count(&self) -> usize {
        self.color_buffers.len()
    }

    /// The depth buffer.
    pub fn depth_buffer(&self) -> Option<TextureId> {
        self.depth_buffer
    }

    /// Returns `true` when the buffer has a depth buffer.
    pub fn has_depth_buffer(&self) -> bool {
        self.depth_buffer.is_some()
    }

    /// Publishes `tex gbuffer N` and `tex gbuffer depth` into `variables`.
    pub fn update_shader_vars(&self, variables: &mut ShaderVarContext) {
        for (name, id) in self.color_names.iter().zip(&self.color_buffers) {
            variables.add_variable(ShaderVariable::new(*name, ShaderValue::Texture(*id)));
        }
        if let (Some(name), Some(id)) = (self.depth_name, self.depth_buffer) {
            variables.add_variable(ShaderVariable::new(name, ShaderValue::Texture(id)));
        }
    }

    /// Destroys the textures.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        for id in self.color_buffers.drain(..).chain(self.depth_buffer.take()) {
            if let Err(e) = device.destroy_texture(id) {
                log::warn!("GBuffer: failed to release {id:?}: {e}");
            }
        }
        self.initialized = false;
    }
}

impl Default for GBuffer {
    fn default() -> Self {
        Self::new()
    }
}
