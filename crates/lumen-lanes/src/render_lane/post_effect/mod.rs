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
//! Full-screen post-processing.
//!
//! A [`PostEffectManager`] holds a chain of layers. The scene is rendered
//! into the manager's [`screen target`](PostEffectManager::screen_target);
//! each layer then draws a full-screen quad with its shader, reading the
//! outputs of earlier layers, and the last layer writes to the manager's
//! output (the screen by default). Intermediate textures are shared between
//! layers whose lifetimes do not overlap, which turns a linear chain into
//! ping-pong rendering between two textures.

mod manager;
mod parser;

pub use manager::*;
pub use parser::*;

use lumen_core::renderer::{ResourceError, ShaderVarName};
use thiserror::Error;

/// Name of the input texture variable used when a layer does not name one.
pub const DEFAULT_INPUT_SV: &str = "tex diffuse";
/// Name of the variable holding the size of one output texel in texture
/// coordinates.
pub const PIXEL_SIZE_SV: &str = "pixel size";
/// Label of post-effect passes.
pub const POST_EFFECT_PASS: &str = "PostEffect";

/// Identifies a layer of a [`PostEffectManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

impl LayerId {
    /// The layer holding the rendered scene.
    pub const SCREEN: LayerId = LayerId(0);
}

/// Output options of a layer. Layers with equal options share textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    /// The output is `width >> downsample` × `height >> downsample`.
    pub downsample: u32,
    /// Generate mipmaps for the output.
    pub mipmap: bool,
    /// Highest mipmap level to generate, `-1` for all. Backends may ignore it.
    pub max_mipmap: i32,
    /// Never share the output texture with another layer.
    pub no_texture_reuse: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            downsample: 0,
            mipmap: false,
            max_mipmap: -1,
            no_texture_reuse: false,
        }
    }
}

/// A texture read by a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInput {
    /// The layer whose output is read.
    pub layer: LayerId,
    /// The variable receiving the texture.
    pub texture: ShaderVarName,
    /// The variable receiving the input's texture-coordinate correction
    /// `(scale x, scale y, offset x, offset y)`, if any.
    pub texcoord: Option<ShaderVarName>,
}

/// Errors raised by post effects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostEffectError {
    /// The manager has no device yet.
    #[error("post-effect manager is not initialized")]
    NotInitialized,
    /// Layers were added or the manager was never set up for a view.
    #[error("post-effect manager is not set up for the current layers")]
    NotSetUp,
    /// A layer input refers to a layer that does not precede it.
    #[error("layer {input:?} cannot be read by layer {layer:?}")]
    InvalidInput {
        /// The layer being added.
        layer: LayerId,
        /// The input it refers to.
        input: LayerId,
    },
    /// A texture or buffer could not be created, or a pass could not begin.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
