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
//! A cache of render-target textures reused across frames.

use lumen_core::renderer::{
    GraphicsDevice, ResourceError, TextureDescriptor, TextureFlags, TextureFormat, TextureId,
};
use std::borrow::Cow;

/// Number of frames an unused texture is kept before it is destroyed.
pub const DEFAULT_PURGE_AGE: u64 = 60;

#[derive(Debug, Clone, Copy)]
struct CachedTexture {
    texture: TextureId,
    width: u32,
    height: u32,
    last_used: u64,
}

/// Hands out off-screen textures of a requested size.
///
/// A texture handed out during a frame is not handed out again until the
/// next frame; textures not requested for [`TextureCache::purge_age`] frames
/// are destroyed on [`TextureCache::advance_frame`].
#[derive(Debug)]
pub struct TextureCache {
    entries: Vec<CachedTexture>,
    format: TextureFormat,
    flags: TextureFlags,
    current_frame: u64,
    purge_age: u64,
}

impl TextureCache {
    /// Creates a cache producing `format` textures.
    pub fn new(format: TextureFormat) -> Self {
        Self {
            entries: Vec::new(),
            format,
            flags: TextureFlags::RENDER_TARGET
                | TextureFlags::NO_MIPMAPS
                | TextureFlags::CLAMP
                | TextureFlags::NPOTS,
            current_frame: 0,
            purge_age: DEFAULT_PURGE_AGE,
        }
    }

    /// Sets the creation flags of future textures.
    pub fn set_flags(&mut self, flags: TextureFlags) {
        self.flags = flags;
    }

    /// How many frames an unused texture survives.
    pub fn purge_age(&self) -> u64 {
        self.purge_age
    }

    /// Sets the purge age.
    pub fn set_purge_age(&mut self, frames: u64) {
        self.purge_age = frames;
    }

    /// Returns a texture of exactly `width` × `height` not yet handed out this
    /// frame, creating one when needed.
    pub fn query_unused_texture(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<TextureId, ResourceError> {
        let frame = self.current_frame;
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.width == width && e.height == height && e.last_used < frame)
        {
            entry.last_used = frame;
            return Ok(entry.texture);
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("cached render target")),
            width,
            height,
            format: self.format,
            flags: self.flags,
        })?;
        log::debug!("TextureCache: created {width}x{height} texture {texture:?}");
        self.entries.push(CachedTexture {
            texture,
            width,
            height,
            last_used: frame,
        });
        Ok(texture)
    }

    /// Starts a new frame and destroys textures idle for longer than the
    /// purge age.
    pub fn advance_frame(&mut self, device: &dyn GraphicsDevice, frame: u64) {
        self.current_frame = frame;
        let purge_age = self.purge_age;
        self.entries.retain(|e| {
            let keep = frame.saturating_sub(e.last_used) <= purge_age;
            if !keep {
                if let Err(err) = device.destroy_texture(e.texture) {
                    log::warn!("TextureCache: failed to destroy {:?}: {err}", e.texture);
                }
            }
            keep
        });
    }

    /// Destroys every cached texture.
    pub fn clear(&mut self, device: &dyn GraphicsDevice) {
        for e in self.entries.drain(..) {
            if let Err(err) = device.destroy_texture(e.texture) {
                log::warn!("TextureCache: failed to destroy {:?}: {err}", e.texture);
            }
        }
    }

    /// Number of cached textures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
