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
//! Iteration helpers over a render tree, and operation blocks that make an
//! operation run at most once per object.

use super::render_tree::{ContextHandle, ContextNode, MeshNode, RenderTree, SingleMesh, TreeTraits};
use ahash::AHashSet;
use std::hash::Hash;

/// Decides whether an operation runs for an object.
pub trait OperationBlock<K> {
    /// Forgets every object seen so far.
    fn reset(&mut self);

    /// Returns `true` when the operation must be skipped for `key`.
    /// Calling it records `key` as seen.
    fn is_blocked(&mut self, key: &K) -> bool;
}

/// Never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBlock;

impl<K> OperationBlock<K> for NoBlock {
    fn reset(&mut self) {}

    fn is_blocked(&mut self, _key: &K) -> bool {
        false
    }
}

/// Lets the operation run once per distinct key.
#[derive(Debug, Clone)]
pub struct OnceBlock<K> {
    seen: AHashSet<K>,
}

impl<K> Default for OnceBlock<K> {
    fn default() -> Self {
        Self {
            seen: AHashSet::default(),
        }
    }
}

impl<K: Hash + Eq + Clone> OperationBlock<K> for OnceBlock<K> {
    fn reset(&mut self) {
        self.seen.clear();
    }

    fn is_blocked(&mut self, key: &K) -> bool {
        !self.seen.insert(key.clone())
    }
}

/// Calls `f` for every context in draw order.
pub fn for_each_context<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    mut f: impl FnMut(ContextHandle<T>, &ContextNode<T>),
) {
    for handle in tree.contexts() {
        if let Some(ctx) = tree.context(handle) {
            f(handle, ctx);
        }
    }
}

/// Calls `f` for every context in reverse draw order.
pub fn for_each_context_reverse<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    mut f: impl FnMut(ContextHandle<T>, &ContextNode<T>),
) {
    for handle in tree.contexts_rev() {
        if let Some(ctx) = tree.context(handle) {
            f(handle, ctx);
        }
    }
}

/// Calls `f` with a running index for every context in draw order.
pub fn for_each_context_numbered<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    mut f: impl FnMut(usize, ContextHandle<T>, &ContextNode<T>),
) {
    let mut n = 0;
    for_each_context(tree, |h, ctx| {
        f(n, h, ctx);
        n += 1;
    });
}

/// Calls `f` for every context whose block key has not been seen by `block`.
pub fn for_each_context_blocked<T, K, B>(
    tree: &RenderTree<'_, T>,
    block: &mut B,
    key: impl Fn(&ContextNode<T>) -> K,
    mut f: impl FnMut(ContextHandle<T>, &ContextNode<T>),
) where
    T: TreeTraits,
    B: OperationBlock<K>,
{
    for_each_context(tree, |h, ctx| {
        if !block.is_blocked(&key(ctx)) {
            f(h, ctx);
        }
    });
}

/// Calls `f` for every mesh node of `ctx` in ascending key order.
pub fn for_each_mesh_node<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    mut f: impl FnMut(&MeshNode<T>),
) {
    for handle in tree.mesh_nodes(ctx) {
        if let Some(node) = tree.mesh_node(handle) {
            f(node);
        }
    }
}

/// Calls `f` for every mesh node of `ctx` in descending key order.
pub fn for_each_mesh_node_reverse<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    mut f: impl FnMut(&MeshNode<T>),
) {
    for handle in tree.mesh_nodes_rev(ctx) {
        if let Some(node) = tree.mesh_node(handle) {
            f(node);
        }
    }
}

/// Calls `f` for every mesh of `ctx`, node by node.
pub fn for_each_single_mesh<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    mut f: impl FnMut(&MeshNode<T>, &SingleMesh<T>),
) {
    for_each_mesh_node(tree, ctx, |node| {
        for mesh in &node.meshes {
            f(node, mesh);
        }
    });
}

/// Calls `f` with a running index for every mesh of `ctx`.
pub fn for_each_single_mesh_numbered<T: TreeTraits>(
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    mut f: impl FnMut(usize, &SingleMesh<T>),
) {
    let mut n = 0;
    for_each_single_mesh(tree, ctx, |_, mesh| {
        f(n, mesh);
        n += 1;
    });
}
