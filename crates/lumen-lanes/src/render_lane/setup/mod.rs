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
//! Per-frame setup of the render tree: context setup (visibility, portals,
//! shaders), portal recursion and registered off-screen targets.

mod context;
mod portal;
mod target_registry;

pub use context::*;
pub use portal::*;
pub use target_registry::*;

use super::render_tree::TreeError;
use super::visibility::VisibilityError;
use lumen_core::renderer::ResourceError;
use thiserror::Error;

/// Errors raised while setting up the contexts of a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    /// Collecting the visible objects failed.
    #[error(transparent)]
    Visibility(#[from] VisibilityError),
    /// A tree operation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// A portal texture or geometry buffer could not be created.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
