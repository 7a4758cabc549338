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
//! Visibility: culling sectors and feeding the visible objects into a
//! render tree.

mod collector;
mod frustum;
mod occlusion;

pub use collector::*;
pub use frustum::*;
pub use occlusion::*;

use super::render_tree::TreeError;
use thiserror::Error;

/// Errors raised while collecting the visible objects of a context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisibilityError {
    /// The sector's culler could not perform the test.
    #[error("visibility test failed in sector '{0}'")]
    CullerFailed(String),
    /// Adding an object to the tree failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}
