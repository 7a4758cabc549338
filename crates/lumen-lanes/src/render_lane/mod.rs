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
//! Rendering lane: the per-frame render tree and the strategies drawing it.
//!
//! A frame goes through three steps. Setup ([`setup`]) fills a
//! [`RenderTree`](render_tree::RenderTree) with contexts and meshes from
//! visibility collection and portal recursion, then assigns shaders per
//! render layer ([`layers`]). A tree renderer ([`forward`] or
//! [`deferred`]) turns the tree into render passes. Post effects
//! ([`post_effect`]) finally run over the rendered scene.

pub mod deferred;
pub mod draw;
pub mod forward;
pub mod layers;
pub mod operations;
pub mod post_effect;
pub mod render_tree;
pub mod setup;
pub mod svarray;
pub mod visibility;
