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
use super::*;
use crate::testing::{material, mesh_wrapper, render_mesh, sector, view};
use lumen_core::math::Vec3;
use lumen_core::renderer::{BufferId, ShaderId, ZBufMode};
use lumen_core::scene::{PortalContainer, RenderPriorities, RenderPriority, SortMode};

fn persistent() -> PersistentData<StandardTreeTraits> {
    let mut names = ShaderVarNames::new();
    PersistentData::new(
        StandardTreeTraits,
        Rc::new(RenderPriorities::default()),
        &mut names,
    )
}

fn template(id: u32, priority: u32, portal: bool) -> (Rc<RenderMesh>, MeshTemplate) {
    let mesh = render_mesh(id as usize, material(ShaderId(0)));
    let mut wrapper = mesh_wrapper(id, RenderPriority(priority), Vec3::ZERO, mesh.clone());
    if portal {
        wrapper.portals = Some(Rc::new(PortalContainer::default()));
    }
    (mesh, MeshTemplate::for_wrapper(Rc::new(wrapper)))
}

#[test]
fn insert_after_places_the_context_right_behind() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let v = view(sector(0), 64, 64);
    let a = tree.create_context(v.clone(), None).unwrap();
    let b = tree.create_context(v.clone(), None).unwrap();
    let c = tree.create_context(v, Some(a)).unwrap();

    assert_eq!(tree.contexts().collect::<Vec<_>>(), vec![a, c, b]);
    assert_eq!(tree.contexts_rev().collect::<Vec<_>>(), vec![b, c, a]);
    // Iteration restarts from the beginning every time.
    assert_eq!(tree.contexts().count(), 3);
}

#[test]
fn destroying_an_absent_context_is_an_error() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let v = view(sector(0), 64, 64);
    let a = tree.create_context(v.clone(), None).unwrap();
    tree.destroy_context(a).unwrap();
    assert_eq!(tree.destroy_context(a), Err(TreeError::ContextNotPresent));
    assert_eq!(
        tree.create_context(v, Some(a)).unwrap_err(),
        TreeError::ContextNotPresent
    );
    assert_eq!(tree.context_count(), 1);
}

#[test]
fn mesh_nodes_are_visited_in_key_order() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();

    let added = [(1, 6, false), (2, 3, true), (3, 3, false), (4, 6, false)];
    for (id, priority, portal) in added {
        let (mesh, t) = template(id, priority, portal);
        tree.add_render_mesh(ctx, mesh, RenderPriority(priority), &t)
            .unwrap();
    }

    let keys: Vec<_> = tree
        .mesh_nodes(ctx)
        .map(|n| tree.mesh_node(n).unwrap().key)
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(keys[0].priority, RenderPriority(3));
    assert!(!keys[0].is_portal);
    assert!(keys[1].is_portal);
    assert_eq!(keys[2].priority, RenderPriority(6));

    let rev: Vec<_> = tree
        .mesh_nodes_rev(ctx)
        .map(|n| tree.mesh_node(n).unwrap().key)
        .collect();
    assert_eq!(rev, keys.iter().rev().copied().collect::<Vec<_>>());

    let counts: Vec<_> = tree
        .mesh_nodes(ctx)
        .map(|n| tree.mesh_node(n).unwrap().meshes.len())
        .collect();
    assert_eq!(counts, vec![1, 1, 2]);
}

#[test]
fn every_added_mesh_gets_a_fresh_local_id() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
    let (mesh, t) = template(1, 4, false);
    let ids: Vec<_> = (0..5)
        .map(|_| {
            tree.add_render_mesh(ctx, mesh.clone(), RenderPriority(4), &t)
                .unwrap()
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(tree.context(ctx).unwrap().total_render_meshes(), 5);
    assert_eq!(tree.context(ctx).unwrap().mesh_node_count(), 1);
}

#[test]
fn render_mesh_z_mode_overrides_the_template() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
    let (_, mut t) = template(1, 4, false);
    t.z_mode = ZBufMode::Test;

    let mut overriding = RenderMesh::new(BufferId(9), material(ShaderId(0)));
    overriding.z_mode = Some(ZBufMode::Fill);
    tree.add_render_mesh(ctx, Rc::new(overriding), RenderPriority(4), &t)
        .unwrap();
    let plain = render_mesh(8, material(ShaderId(0)));
    tree.add_render_mesh(ctx, plain, RenderPriority(4), &t).unwrap();

    let node = tree.mesh_nodes(ctx).next().unwrap();
    let modes: Vec<_> = tree
        .mesh_node(node)
        .unwrap()
        .meshes
        .iter()
        .map(|m| m.z_mode)
        .collect();
    assert_eq!(modes, vec![ZBufMode::Fill, ZBufMode::Test]);
}

#[test]
fn destroy_mesh_node_unlinks_it_from_the_context() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
    let key = StandardTreeTraits.mesh_node_key(RenderPriority(1), SortMode::None, false);
    let node = tree.create_mesh_node(ctx, key).unwrap();
    assert_eq!(
        tree.create_mesh_node(ctx, key),
        Err(TreeError::DuplicateMeshNode(key))
    );
    tree.destroy_mesh_node(node).unwrap();
    assert_eq!(tree.context(ctx).unwrap().mesh_node_for(&key), None);
    assert_eq!(
        tree.destroy_mesh_node(node),
        Err(TreeError::MeshNodeNotPresent)
    );
}

#[test]
fn back_to_front_nodes_sort_far_meshes_first() {
    let mut data = persistent();
    let priorities = data.priorities().clone();
    let alpha = priorities.resolve("alpha").unwrap();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
    for (id, z) in [(1, -2.0), (2, -9.0), (3, -5.0)] {
        let mesh = render_mesh(id, material(ShaderId(0)));
        let wrapper = mesh_wrapper(id as u32, alpha, Vec3::new(0.0, 0.0, z), mesh.clone());
        let t = MeshTemplate::for_wrapper(Rc::new(wrapper));
        tree.add_render_mesh(ctx, mesh, alpha, &t).unwrap();
    }
    tree.sort_meshes(ctx).unwrap();
    let node = tree.mesh_nodes(ctx).next().unwrap();
    let node = tree.mesh_node(node).unwrap();
    assert_eq!(node.key.sort_mode, SortMode::BackToFront);
    let order: Vec<_> = node.meshes.iter().map(|m| m.context_local_id).collect();
    assert_eq!(order, vec![1, 2, 0]);
}

#[test]
fn dropping_the_tree_returns_nodes_to_the_arena() {
    let mut data = persistent();
    {
        let mut tree = RenderTree::new(&mut data);
        let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
        let (mesh, t) = template(1, 4, false);
        tree.add_render_mesh(ctx, mesh, RenderPriority(4), &t).unwrap();
        assert_eq!(tree.persistent().live_mesh_nodes(), 1);
    }
    assert_eq!(data.live_contexts(), 0);
    assert_eq!(data.live_mesh_nodes(), 0);
}

#[test]
fn insert_layer_copies_shaders_from_the_source_layer() {
    let mut data = persistent();
    let mut tree = RenderTree::new(&mut data);
    let ctx = tree.create_context(view(sector(0), 64, 64), None).unwrap();
    let (mesh, t) = template(1, 4, false);
    tree.add_render_mesh(ctx, mesh.clone(), RenderPriority(4), &t).unwrap();
    tree.add_render_mesh(ctx, mesh, RenderPriority(4), &t).unwrap();
    {
        let c = tree.context_mut(ctx).unwrap();
        c.shader_array = vec![
            Some(ShaderId(1)),
            Some(ShaderId(2)),
            Some(ShaderId(3)),
            None,
        ];
        c.ticket_array = vec![ShaderTicket::default(); 4];
        c.sv_array.setup(2, 1, 2).unwrap();
    }
    tree.insert_layer(ctx, 0, 1).unwrap();
    let c = tree.context(ctx).unwrap();
    assert_eq!(c.layer_count(), 3);
    assert_eq!(
        c.shader_array,
        vec![
            Some(ShaderId(1)),
            Some(ShaderId(2)),
            Some(ShaderId(3)),
            None,
            Some(ShaderId(3)),
            None
        ]
    );
    assert_eq!(c.sv_array.num_layers(), 3);
    assert_eq!(
        tree.insert_layer(ctx, 5, 0),
        Err(TreeError::LayerOutOfRange {
            layer: 5,
            layer_count: 3
        })
    );
}

#[test]
fn debug_flags_are_registered_on_demand() {
    let mut data = persistent();
    let id = data.register_debug_flag("draw.lightvolumes");
    assert_eq!(data.register_debug_flag("draw.lightvolumes"), id);
    assert!(!data.is_debug_flag_enabled("draw.lightvolumes"));
    data.enable_debug_flag("draw.lightvolumes", true);
    assert!(data.is_debug_flag_enabled("draw.lightvolumes"));
    assert!(!data.is_debug_flag_enabled("unknown"));
}
