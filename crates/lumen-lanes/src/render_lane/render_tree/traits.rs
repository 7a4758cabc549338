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
//! Mesh-node keys and the policy trait that computes them.

use lumen_core::scene::{RenderPriority, SortMode};
use std::fmt::Debug;

/// The sort key of a mesh node.
///
/// Ordering follows the field order: priority, then portal flag, then the
/// forward-rendering flag, then the sort mode. Mesh nodes of a context are
/// visited in ascending key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MeshNodeKey {
    /// The render priority.
    pub priority: RenderPriority,
    /// Whether the node holds portal meshes.
    pub is_portal: bool,
    /// Whether the node is drawn by the forward renderer of a deferred tree.
    pub use_forward_rendering: bool,
    /// How the meshes are ordered inside the node.
    pub sort_mode: SortMode,
}

/// Customizes a render tree: the optional extra data carried by each node
/// type and the mesh-node key policy.
pub trait TreeTraits: Debug {
    /// Extra data stored in every context.
    type ContextExtra: Default + Debug;
    /// Extra data stored in every mesh node.
    type MeshNodeExtra: Default + Debug;
    /// Extra data stored with every mesh.
    type MeshExtra: Default + Debug;

    /// Computes the node key of a mesh.
    fn mesh_node_key(
        &self,
        priority: RenderPriority,
        sort_mode: SortMode,
        is_portal: bool,
    ) -> MeshNodeKey;
}

/// Tree traits without extra data, keying meshes by priority, portal flag and
/// sort mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTreeTraits;

impl TreeTraits for StandardTreeTraits {
    type ContextExtra = ();
    type MeshNodeExtra = ();
    type MeshExtra = ();

    fn mesh_node_key(
        &self,
        priority: RenderPriority,
        sort_mode: SortMode,
        is_portal: bool,
    ) -> MeshNodeKey {
        MeshNodeKey {
            priority,
            is_portal,
            use_forward_rendering: false,
            sort_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_priority_then_portal_then_forward() {
        let key = |p, portal, fwd| MeshNodeKey {
            priority: RenderPriority(p),
            is_portal: portal,
            use_forward_rendering: fwd,
            sort_mode: SortMode::None,
        };
        let mut keys = vec![
            key(2, false, false),
            key(1, true, false),
            key(1, false, true),
            key(1, false, false),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                key(1, false, false),
                key(1, false, true),
                key(1, true, false),
                key(2, false, false),
            ]
        );
    }
}
