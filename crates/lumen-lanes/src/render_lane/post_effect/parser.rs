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
use super::{
    LayerId, LayerInput, LayerOptions, PostEffectError, PostEffectManager, DEFAULT_INPUT_SV,
};
use lumen_core::math::{Vec2, Vec3, Vec4};
use lumen_core::renderer::{
    ShaderId, ShaderRegistry, ShaderValue, ShaderVarNames, ShaderVariable,
};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// The input name referring to the rendered scene.
pub const SCREEN_INPUT: &str = "*screen";

/// Errors raised while reading a layer document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerParseError {
    /// The file could not be read.
    #[error("cannot read '{path}': {reason}")]
    Io {
        /// The file.
        path: String,
        /// What went wrong.
        reason: String,
    },
    /// The document is not a valid layer document.
    #[error("malformed post-effect document: {0}")]
    Syntax(String),
    /// A layer names a shader the registry does not know.
    #[error("layer '{layer}' uses unknown shader '{shader}'")]
    UnknownShader {
        /// The layer.
        layer: String,
        /// The shader name.
        shader: String,
    },
    /// A layer reads a layer that is not defined before it.
    #[error("layer '{layer}' reads unknown layer '{input}'")]
    UnknownInput {
        /// The layer.
        layer: String,
        /// The input name.
        input: String,
    },
    /// The manager rejected a layer.
    #[error(transparent)]
    Layer(#[from] PostEffectError),
}

#[derive(Debug, Deserialize)]
#[serde(rename = "PostEffect")]
struct PostEffectDocument {
    layers: Vec<LayerDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Layer")]
struct LayerDocument {
    #[serde(default)]
    name: String,
    shader: String,
    #[serde(default)]
    inputs: Vec<InputDocument>,
    #[serde(default)]
    options: LayerOptions,
    #[serde(default)]
    shadervars: Vec<ShaderVarDocument>,
}

fn default_texname() -> String {
    DEFAULT_INPUT_SV.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Input")]
struct InputDocument {
    layer: String,
    #[serde(default = "default_texname")]
    texname: String,
    #[serde(default)]
    texcoord: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ShaderVar")]
struct ShaderVarDocument {
    name: String,
    value: VarValue,
}

#[derive(Debug, Clone, Copy, Deserialize)]
enum VarValue {
    Int(i32),
    Float(f32),
    Vec2(f32, f32),
    Vec3(f32, f32, f32),
    Vec4(f32, f32, f32, f32),
}

impl From<VarValue> for ShaderValue {
    fn from(v: VarValue) -> Self {
        match v {
            VarValue::Int(i) => ShaderValue::Int(i),
            VarValue::Float(f) => ShaderValue::Float(f),
            VarValue::Vec2(x, y) => ShaderValue::Vec2(Vec2::new(x, y)),
            VarValue::Vec3(x, y, z) => ShaderValue::Vec3(Vec3::new(x, y, z)),
            VarValue::Vec4(x, y, z, w) => ShaderValue::Vec4(Vec4::new(x, y, z, w)),
        }
    }
}

/// Inputs of a layer, resolved against the document.
enum ResolvedInputs {
    Previous,
    Explicit(Vec<(LayerId, String, Option<String>)>),
}

/// Adds the layers described by a RON document to a [`PostEffectManager`].
///
/// ```ron
/// PostEffect(layers: [
///     Layer(
///         name: "bright",
///         shader: "bloom bright pass",
///         inputs: [Input(layer: "*screen")],
///         options: (downsample: 1),
///     ),
///     Layer(
///         name: "combine",
///         shader: "bloom combine",
///         inputs: [
///             Input(layer: "*screen"),
///             Input(layer: "bright", texname: "tex bloom", texcoord: Some("texcoord bloom")),
///         ],
///         shadervars: [ShaderVar(name: "bloom strength", value: Float(0.8))],
///     ),
/// ])
/// ```
///
/// A layer without inputs reads the previous layer. The whole document is
/// checked before any layer is added.
#[derive(Debug, Clone, Copy)]
pub struct PostEffectLayersParser<'a> {
    registry: &'a ShaderRegistry,
}

impl<'a> PostEffectLayersParser<'a> {
    /// A parser resolving shader names in `registry`.
    pub fn new(registry: &'a ShaderRegistry) -> Self {
        Self { registry }
    }

    /// Reads a layer document file.
    pub fn add_layers_from_file(
        &self,
        manager: &mut PostEffectManager,
        names: &mut ShaderVarNames,
        path: impl AsRef<Path>,
    ) -> Result<Vec<LayerId>, LayerParseError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| LayerParseError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.add_layers_from_document(manager, names, &document)
    }

    /// Parses `document` and appends its layers to `manager`.
    pub fn add_layers_from_document(
        &self,
        manager: &mut PostEffectManager,
        names: &mut ShaderVarNames,
        document: &str,
    ) -> Result<Vec<LayerId>, LayerParseError> {
        let parsed: PostEffectDocument =
            ron::from_str(document).map_err(|e| LayerParseError::Syntax(e.to_string()))?;

        let first = manager.layer_count() + 1;
        let mut resolved: Vec<(ShaderId, ResolvedInputs)> =
            Vec::with_capacity(parsed.layers.len());
        for (index, layer) in parsed.layers.iter().enumerate() {
            let shader = self.registry.find(&layer.shader).ok_or_else(|| {
                LayerParseError::UnknownShader {
                    layer: layer.name.clone(),
                    shader: layer.shader.clone(),
                }
            })?;
            let inputs = if layer.inputs.is_empty() {
                ResolvedInputs::Previous
            } else {
                let mut inputs = Vec::with_capacity(layer.inputs.len());
                for input in &layer.inputs {
                    let source = if input.layer == SCREEN_INPUT {
                        LayerId::SCREEN
                    } else {
                        parsed.layers[..index]
                            .iter()
                            .rposition(|l| l.name == input.layer)
                            .map(|i| LayerId(first + i))
                            .ok_or_else(|| LayerParseError::UnknownInput {
                                layer: layer.name.clone(),
                                input: input.layer.clone(),
                            })?
                    };
                    inputs.push((source, input.texname.clone(), input.texcoord.clone()));
                }
                ResolvedInputs::Explicit(inputs)
            };
            resolved.push((shader, inputs));
        }

        let mut added = Vec::with_capacity(resolved.len());
        for (layer, (shader, inputs)) in parsed.layers.iter().zip(resolved) {
            let id = match inputs {
                ResolvedInputs::Previous => manager.add_layer(shader, layer.options),
                ResolvedInputs::Explicit(inputs) => {
                    let inputs = inputs
                        .into_iter()
                        .map(|(source, texname, texcoord)| LayerInput {
                            layer: source,
                            texture: names.intern(&texname),
                            texcoord: texcoord.map(|t| names.intern(&t)),
                        })
                        .collect();
                    manager.add_layer_with_inputs(shader, layer.options, inputs)?
                }
            };
            if let Some(variables) = manager.layer_variables_mut(id) {
                for var in &layer.shadervars {
                    variables.add_variable(ShaderVariable::new(
                        names.intern(&var.name),
                        var.value.into(),
                    ));
                }
            }
            added.push(id);
        }
        log::debug!("PostEffectLayersParser: added {} layers", added.len());
        Ok(added)
    }
}
