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
//! The scene-facing interfaces the render manager consumes.
//!
//! Sectors own lights and a visibility culler, cullers report
//! [`MeshWrapper`]s, and portal objects connect sectors. Scene
//! management itself lives outside the workspace.

mod mesh;
mod portal;
mod priority;
mod sector;
mod view;
mod visibility;

pub use mesh::*;
pub use portal::*;
pub use priority::*;
pub use sector::*;
pub use view::*;
pub use visibility::*;
