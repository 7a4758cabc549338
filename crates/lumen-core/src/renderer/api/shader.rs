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

//! Shaders and shader variables.
//!
//! Shader variables ("SVs") are named, typed values bound to shaders at draw
//! time. Names are interned into dense [`ShaderVarName`] ids by
//! [`ShaderVarNames`] so that per-mesh variable stacks can be flat slices
//! indexed by name id.

use super::buffer::BufferId;
use super::texture::TextureId;
use crate::math::{Mat4, Transform, Vec2, Vec3, Vec4};
use ahash::AHashMap;
use std::rc::Rc;

/// An interned shader variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderVarName(pub u32);

impl ShaderVarName {
    /// The slot of this name in a variable stack.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Interns shader variable names into dense ids.
#[derive(Debug, Clone, Default)]
pub struct ShaderVarNames {
    ids: AHashMap<String, ShaderVarName>,
    names: Vec<String>,
}

impl ShaderVarNames {
    /// Creates an empty name table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, interning it on first use.
    pub fn intern(&mut self, name: &str) -> ShaderVarName {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = ShaderVarName(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Returns the id of `name` without interning it.
    pub fn lookup(&self, name: &str) -> Option<ShaderVarName> {
        self.ids.get(name).copied()
    }

    /// Returns the string of an interned id.
    pub fn name(&self, id: ShaderVarName) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// The number of interned names, i.e. the length of a full variable stack.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no name has been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The value carried by a shader variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderValue {
    /// An integer.
    Int(i32),
    /// A float.
    Float(f32),
    /// A 2-component vector.
    Vec2(Vec2),
    /// A 3-component vector.
    Vec3(Vec3),
    /// A 4-component vector.
    Vec4(Vec4),
    /// A reversible transform.
    Transform(Transform),
    /// A 4x4 matrix.
    Matrix(Mat4),
    /// A texture binding.
    Texture(TextureId),
    /// An array of vectors (sample kernels and the like).
    Vec3Array(Vec<Vec3>),
    /// A uniform buffer binding.
    Buffer(BufferId),
}

/// A named shader variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderVariable {
    /// The interned name.
    pub name: ShaderVarName,
    /// The current value.
    pub value: ShaderValue,
}

impl ShaderVariable {
    /// Creates a shared variable.
    pub fn new(name: ShaderVarName, value: ShaderValue) -> ShaderVarRef {
        Rc::new(Self { name, value })
    }
}

/// A shared, immutable reference to a shader variable.
pub type ShaderVarRef = Rc<ShaderVariable>;

/// An ordered collection of shader variables (material, mesh or sector
/// variables) that can be pushed onto a variable stack.
#[derive(Debug, Clone, Default)]
pub struct ShaderVarContext {
    variables: Vec<ShaderVarRef>,
}

impl ShaderVarContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, replacing any variable of the same name.
    pub fn add_variable(&mut self, var: ShaderVarRef) {
        match self.variables.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var,
            None => self.variables.push(var),
        }
    }

    /// Looks a variable up by name.
    pub fn variable(&self, name: ShaderVarName) -> Option<&ShaderVarRef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Iterates over the variables.
    pub fn iter(&self) -> impl Iterator<Item = &ShaderVarRef> {
        self.variables.iter()
    }

    /// Writes every variable into `stack` at its name slot. Names beyond the
    /// stack length are skipped.
    pub fn push_variables(&self, stack: &mut [Option<ShaderVarRef>]) {
        for var in &self.variables {
            if let Some(slot) = stack.get_mut(var.name.index()) {
                *slot = Some(var.clone());
            }
        }
    }
}

/// An opaque handle to a registered shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub usize);

/// Selects one technique of a shader for a given variable stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderTicket(pub usize);

/// One way of rendering with a shader.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTechnique {
    /// The number of passes the technique draws.
    pub passes: u32,
    /// Variables that must be present on the stack for the technique to apply.
    pub requires: Vec<ShaderVarName>,
}

impl Default for ShaderTechnique {
    fn default() -> Self {
        Self {
            passes: 1,
            requires: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct ShaderEntry {
    name: String,
    techniques: Vec<ShaderTechnique>,
}

/// Registry of the shaders known to a render manager.
#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    shaders: Vec<ShaderEntry>,
    by_name: AHashMap<String, ShaderId>,
}

impl ShaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single-pass shader, or returns the existing id of `name`.
    pub fn register(&mut self, name: &str) -> ShaderId {
        self.register_with_techniques(name, vec![ShaderTechnique::default()])
    }

    /// Registers a shader with explicit techniques, ordered from most to least
    /// demanding. The last technique is the fallback.
    pub fn register_with_techniques(
        &mut self,
        name: &str,
        mut techniques: Vec<ShaderTechnique>,
    ) -> ShaderId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        if techniques.is_empty() {
            techniques.push(ShaderTechnique::default());
        }
        let id = ShaderId(self.shaders.len());
        self.shaders.push(ShaderEntry {
            name: name.to_string(),
            techniques,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Looks a shader up by name.
    pub fn find(&self, name: &str) -> Option<ShaderId> {
        self.by_name.get(name).copied()
    }

    /// Returns the name of a shader.
    pub fn name(&self, id: ShaderId) -> Option<&str> {
        self.shaders.get(id.0).map(|s| s.name.as_str())
    }

    /// Picks the first technique whose required variables are all present on
    /// `stack`, falling back to the last one.
    pub fn ticket(&self, id: ShaderId, stack: &[Option<ShaderVarRef>]) -> ShaderTicket {
        let Some(entry) = self.shaders.get(id.0) else {
            return ShaderTicket::default();
        };
        let present = |name: &ShaderVarName| {
            stack
                .get(name.index())
                .map(Option::is_some)
                .unwrap_or(false)
        };
        entry
            .techniques
            .iter()
            .position(|t| t.requires.iter().all(present))
            .map(ShaderTicket)
            .unwrap_or(ShaderTicket(entry.techniques.len() - 1))
    }

    /// The number of passes for a shader and ticket. Unknown shaders draw once.
    pub fn num_passes(&self, id: ShaderId, ticket: ShaderTicket) -> u32 {
        self.shaders
            .get(id.0)
            .and_then(|s| s.techniques.get(ticket.0))
            .map(|t| t.passes)
            .unwrap_or(1)
    }
}
