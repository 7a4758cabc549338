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

//! Defines data structures related to GPU texture resources.

use crate::lumen_bitflags;
use crate::renderer::error::ResourceError;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// The texel format of a texture.
///
/// Formats are named the way layer documents and configuration keys spell
/// them (`"argb8"`, `"rgba16_f"`, `"d24s8"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8 bits per channel, alpha first.
    Argb8,
    /// 8 bits per channel.
    Rgba8,
    /// 16-bit float per channel, four channels.
    Rgba16Float,
    /// 16-bit float per channel, three channels.
    Rgb16Float,
    /// 32-bit float per channel, four channels.
    Rgba32Float,
    /// A single 32-bit float channel.
    R32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24Stencil8,
    /// 32-bit depth.
    Depth32,
}

impl TextureFormat {
    /// Returns the canonical name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            TextureFormat::Argb8 => "argb8",
            TextureFormat::Rgba8 => "rgba8",
            TextureFormat::Rgba16Float => "rgba16_f",
            TextureFormat::Rgb16Float => "rgb16_f",
            TextureFormat::Rgba32Float => "rgba32_f",
            TextureFormat::R32Float => "r32_f",
            TextureFormat::Depth24Stencil8 => "d24s8",
            TextureFormat::Depth32 => "d32",
        }
    }

    /// Returns `true` for depth (and depth/stencil) formats.
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Stencil8 | TextureFormat::Depth32)
    }
}

impl FromStr for TextureFormat {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "argb8" => Ok(TextureFormat::Argb8),
            "rgba8" => Ok(TextureFormat::Rgba8),
            "rgba16_f" => Ok(TextureFormat::Rgba16Float),
            "rgb16_f" => Ok(TextureFormat::Rgb16Float),
            "rgba32_f" => Ok(TextureFormat::Rgba32Float),
            "r32_f" => Ok(TextureFormat::R32Float),
            "d24s8" => Ok(TextureFormat::Depth24Stencil8),
            "d32" => Ok(TextureFormat::Depth32),
            other => Err(ResourceError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

lumen_bitflags! {
    /// Creation flags of a texture. The device reports back the subset it
    /// actually granted in [`TextureInfo::flags`].
    pub struct TextureFlags: u32 {
        /// Do not generate mipmaps.
        const NO_MIPMAPS = 1 << 0;
        /// Clamp texture coordinates to the edge.
        const CLAMP = 1 << 1;
        /// Request exact, non-power-of-two dimensions.
        const NPOTS = 1 << 2;
        /// Round non-power-of-two dimensions up rather than down.
        const SCALE_UP = 1 << 3;
        /// The texture will be rendered into.
        const RENDER_TARGET = 1 << 4;
    }
}

/// How a texture is addressed by shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// A 2D texture addressed with normalized `[0, 1]` coordinates.
    Normalized2D,
    /// A rectangle texture addressed with pixel coordinates.
    Rect,
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The requested width in pixels.
    pub width: u32,
    /// The requested height in pixels.
    pub height: u32,
    /// The format of the texels.
    pub format: TextureFormat,
    /// Creation flags.
    pub flags: TextureFlags,
}

/// What the device actually allocated for a texture.
///
/// The allocated size can be larger than requested when the device cannot
/// honour [`TextureFlags::NPOTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// The allocated width.
    pub width: u32,
    /// The allocated height.
    pub height: u32,
    /// The format of the texels.
    pub format: TextureFormat,
    /// How shaders address the texture.
    pub kind: TextureKind,
    /// The creation flags the device granted.
    pub flags: TextureFlags,
}

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_from_their_names() {
        for format in [
            TextureFormat::Argb8,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgb16Float,
            TextureFormat::Depth24Stencil8,
        ] {
            assert_eq!(format.name().parse::<TextureFormat>(), Ok(format));
        }
        assert_eq!(" RGBA8 ".parse::<TextureFormat>(), Ok(TextureFormat::Rgba8));
        assert_eq!(
            "bogus".parse::<TextureFormat>(),
            Err(ResourceError::UnknownFormat("bogus".to_string()))
        );
    }

    #[test]
    fn depth_formats_are_flagged() {
        assert!(TextureFormat::Depth32.is_depth());
        assert!(!TextureFormat::Argb8.is_depth());
    }
}
