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

//! The visibility-culling contract.

use super::mesh::MeshWrapper;
use super::view::RenderView;
use std::fmt::Debug;
use std::rc::Rc;

/// Receives the objects a [`VisCuller`] finds potentially visible.
pub trait VisCallback {
    /// Called once per potentially visible object. `frustum_mask` holds the
    /// frustum planes the object's bounds still straddle.
    fn object_visible(&mut self, mesh: &Rc<MeshWrapper>, frustum_mask: u32);
}

/// Determines which objects of a sector may be visible from a view.
pub trait VisCuller: Debug {
    /// Reports every potentially visible object to `callback`.
    ///
    /// Returns `false` when the test could not be performed.
    fn vis_test(
        &self,
        view: &RenderView,
        callback: &mut dyn VisCallback,
        width: u32,
        height: u32,
    ) -> bool;
}
