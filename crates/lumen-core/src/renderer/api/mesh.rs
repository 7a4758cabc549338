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

//! Materials and render meshes: the drawable payload handed to the render tree.

use super::buffer::BufferId;
use super::command::{MixMode, ZBufMode};
use super::shader::{ShaderId, ShaderVarContext};
use ahash::AHashMap;
use std::rc::Rc;

/// Shader type used by meshes rendered into the G-buffer.
pub const SHADER_TYPE_GBUFFER_FILL: &str = "gbuffer fill";
/// Shader type used by full-screen passes that read the G-buffer.
pub const SHADER_TYPE_GBUFFER_USE: &str = "gbuffer use";
/// Shader type of the ordinary forward pass.
pub const SHADER_TYPE_STANDARD: &str = "standard";

/// A material: one shader per shader type plus material-level variables.
#[derive(Debug, Clone, Default)]
pub struct Material {
    /// An optional debug label.
    pub label: Option<String>,
    shaders: AHashMap<String, ShaderId>,
    /// Variables pushed for every mesh using this material.
    pub variables: ShaderVarContext,
}

impl Material {
    /// Creates a material without shaders.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Sets the shader used for `shader_type`.
    pub fn set_shader(&mut self, shader_type: &str, shader: ShaderId) {
        self.shaders.insert(shader_type.to_string(), shader);
    }

    /// Builder form of [`Material::set_shader`].
    #[must_use]
    pub fn with_shader(mut self, shader_type: &str, shader: ShaderId) -> Self {
        self.set_shader(shader_type, shader);
        self
    }

    /// Returns the shader for `shader_type`.
    pub fn shader(&self, shader_type: &str) -> Option<ShaderId> {
        self.shaders.get(shader_type).copied()
    }
}

/// A drawable piece of geometry with its material.
#[derive(Debug, Clone)]
pub struct RenderMesh {
    /// The geometry to draw.
    pub geometry: BufferId,
    /// The material.
    pub material: Rc<Material>,
    /// Overrides the z-buffer mode of the mesh template when set.
    pub z_mode: Option<ZBufMode>,
    /// How the mesh blends into the target.
    pub mix_mode: MixMode,
    /// Mesh-level shader variables.
    pub variables: ShaderVarContext,
}

impl RenderMesh {
    /// Creates an opaque mesh without z-mode override.
    pub fn new(geometry: BufferId, material: Rc<Material>) -> Self {
        Self {
            geometry,
            material,
            z_mode: None,
            mix_mode: MixMode::Copy,
            variables: ShaderVarContext::new(),
        }
    }
}
