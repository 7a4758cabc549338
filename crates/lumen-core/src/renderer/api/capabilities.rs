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

//! Device capabilities queried by render components at initialization.

use super::target::MAX_COLOR_ATTACHMENTS;

/// Limits and features of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// The maximum number of simultaneously bound color attachments.
    pub max_color_attachments: usize,
    /// Whether textures may have non-power-of-two dimensions.
    pub supports_npot: bool,
    /// Whether rectangle textures (pixel addressed) are available.
    pub supports_rect_textures: bool,
    /// The largest texture dimension.
    pub max_texture_size: u32,
    /// Whether the device answers occlusion queries.
    pub supports_occlusion_queries: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_color_attachments: MAX_COLOR_ATTACHMENTS,
            supports_npot: true,
            supports_rect_textures: false,
            max_texture_size: 8192,
            supports_occlusion_queries: true,
        }
    }
}

impl DeviceCapabilities {
    /// The number of color attachments a target set can actually hold: the
    /// device limit capped by the attachment slots of [`RenderTargets`].
    ///
    /// [`RenderTargets`]: super::target::RenderTargets
    pub fn usable_color_attachments(&self) -> usize {
        self.max_color_attachments.min(MAX_COLOR_ATTACHMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_attachments_are_capped_by_the_target_slots() {
        let wide = DeviceCapabilities {
            max_color_attachments: 8,
            ..DeviceCapabilities::default()
        };
        assert_eq!(wide.usable_color_attachments(), MAX_COLOR_ATTACHMENTS);
        let narrow = DeviceCapabilities {
            max_color_attachments: 2,
            ..DeviceCapabilities::default()
        };
        assert_eq!(narrow.usable_color_attachments(), 2);
    }
}
