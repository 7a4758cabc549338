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

use super::visibility::VisCuller;
use crate::math::LinearRgba;
use crate::renderer::{Light, ShaderVarContext};
use std::cell::Cell;
use std::rc::Rc;

/// Identifies a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorId(pub u32);

/// A region of the world with its own lights and visibility culler.
///
/// The recursion level counts how many times the sector is currently being
/// rendered through nested portals.
#[derive(Debug)]
pub struct Sector {
    /// The sector id.
    pub id: SectorId,
    /// A human-readable name.
    pub name: String,
    /// Lights affecting the sector.
    pub lights: Vec<Light>,
    /// The ambient term written before lights are accumulated.
    pub ambient: LinearRgba,
    /// Sector-level shader variables (fog and the like).
    pub variables: ShaderVarContext,
    culler: Rc<dyn VisCuller>,
    recursion_level: Cell<u32>,
}

impl Sector {
    /// Creates an empty sector culled by `culler`.
    pub fn new(id: SectorId, name: impl Into<String>, culler: Rc<dyn VisCuller>) -> Self {
        Self {
            id,
            name: name.into(),
            lights: Vec::new(),
            ambient: LinearRgba::BLACK,
            variables: ShaderVarContext::new(),
            culler,
            recursion_level: Cell::new(0),
        }
    }

    /// The visibility culler holding this sector's objects.
    pub fn culler(&self) -> &Rc<dyn VisCuller> {
        &self.culler
    }

    /// How many portal levels currently render this sector.
    pub fn recursion_level(&self) -> u32 {
        self.recursion_level.get()
    }

    /// Enters one more portal level.
    pub fn increment_recursion_level(&self) {
        self.recursion_level.set(self.recursion_level.get() + 1);
    }

    /// Leaves a portal level.
    pub fn decrement_recursion_level(&self) {
        self.recursion_level
            .set(self.recursion_level.get().saturating_sub(1));
    }
}
