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

//! The deferred render manager: the engine-facing entry point of the
//! rendering lanes.
//!
//! Each frame the manager builds a render tree over its persistent data,
//! sets up the view's context (visibility, portals, shaders) together with
//! the registered off-screen targets, draws the tree with deferred shading
//! into the post-effect input and finally runs the post effects.

mod config;
mod manager;

pub use config::RenderManagerConfig;
pub use manager::DeferredRenderManager;

use lumen_core::renderer::ResourceError;
use lumen_lanes::render_lane::deferred::DeferredError;
use lumen_lanes::render_lane::post_effect::{LayerParseError, PostEffectError};
use lumen_lanes::render_lane::render_tree::TreeError;
use lumen_lanes::render_lane::setup::SetupError;
use thiserror::Error;

/// Errors reported by [`DeferredRenderManager`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderManagerError {
    /// A frame was requested before [`DeferredRenderManager::initialize`].
    #[error("render manager is not initialized")]
    NotInitialized,
    /// The device cannot hold the requested resources.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The render tree rejected an operation.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Context or portal setup failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// The deferred pipeline failed.
    #[error(transparent)]
    Deferred(#[from] DeferredError),
    /// Post effects could not be set up or drawn.
    #[error(transparent)]
    PostEffect(#[from] PostEffectError),
    /// A post-effect layer document is invalid.
    #[error(transparent)]
    Layers(#[from] LayerParseError),
}
