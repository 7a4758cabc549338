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
//! Forward rendering of render-tree contexts.
//!
//! [`render_mesh_nodes`] draws selected mesh nodes of one context into an
//! open pass; the deferred pipeline uses it for its forward meshes.
//! [`ForwardTreeRenderer`] draws a whole tree, one pass per context.

use super::draw::resolve_variables;
use super::operations::{OnceBlock, OperationBlock};
use super::render_tree::{
    ContextHandle, DrawFlags, MeshNodeKey, RenderTree, TreeError, TreeTraits,
};
use lumen_core::math::{LinearRgba, Transform};
use lumen_core::renderer::{
    CullMode, DrawCall, GraphicsDevice, LoadOp, RenderPass, RenderPassDescriptor, RenderTargets,
    ResourceError, ShaderRegistry, ShaderValue, ShaderVarRef,
};
use std::ops::Range;
use thiserror::Error;

/// Errors raised while drawing a context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForwardError {
    /// The device rejected a pass or a copy.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The tree is not set up for drawing.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Sets the pass camera to the context's camera.
pub fn apply_context_camera<T: TreeTraits>(
    pass: &mut dyn RenderPass,
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
) -> Result<(), TreeError> {
    let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
    pass.set_world_to_camera(&context.camera_transform.inverse());
    pass.set_projection(&context.view.camera.projection);
    Ok(())
}

/// Draws the meshes of `ctx` whose node key passes `filter`, for each
/// layer in `layers`.
///
/// Layers are drawn one after the other; inside a layer, nodes go in
/// ascending key order and meshes in node order. Each shader pass is one
/// draw call. Returns the number of draw calls issued.
pub fn render_mesh_nodes<T: TreeTraits>(
    pass: &mut dyn RenderPass,
    tree: &RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    layers: Range<usize>,
    registry: &ShaderRegistry,
    filter: impl Fn(&MeshNodeKey) -> bool,
    extra: &[ShaderVarRef],
) -> Result<usize, ForwardError> {
    let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
    let cull_mode = if context.view.camera.mirrored {
        CullMode::Normal.flipped()
    } else {
        CullMode::Normal
    };
    let first_layer = layers.start;
    let mut draws = 0;
    for layer in layers {
        for handle in tree.mesh_nodes(ctx) {
            let node = tree.mesh_node(handle).ok_or(TreeError::MeshNodeNotPresent)?;
            if !filter(&node.key) {
                continue;
            }
            for mesh in &node.meshes {
                let id = mesh.context_local_id;
                let Some((shader, ticket)) = context.shader_for(layer, id) else {
                    continue;
                };
                if layer == first_layer && !mesh.pre_copies.is_empty() {
                    pass.copy_from_render_targets(&mesh.pre_copies)?;
                }
                let variables = if context.sv_array.is_setup() {
                    let stack = context
                        .sv_array
                        .sv_stack(layer, id)
                        .map_err(TreeError::from)?;
                    resolve_variables(stack, extra)
                } else {
                    resolve_variables(&[], extra)
                };
                let object_to_world = match &mesh.object_to_world.value {
                    ShaderValue::Transform(t) => *t,
                    _ => Transform::IDENTITY,
                };
                for shader_pass in 0..registry.num_passes(shader, ticket) {
                    pass.draw_mesh(&DrawCall {
                        geometry: mesh.render_mesh.geometry,
                        shader,
                        ticket,
                        pass: shader_pass,
                        object_to_world,
                        z_mode: mesh.z_mode,
                        mix_mode: mesh.render_mesh.mix_mode,
                        cull_mode,
                        variables: variables.clone(),
                    });
                    draws += 1;
                }
            }
        }
    }
    Ok(draws)
}

/// Draws every context of a tree with forward shading.
#[derive(Debug, Clone)]
pub struct ForwardTreeRenderer {
    /// Color the screen is cleared to.
    pub clear_color: LinearRgba,
}

impl Default for ForwardTreeRenderer {
    fn default() -> Self {
        Self {
            clear_color: LinearRgba::BLACK,
        }
    }
}

impl ForwardTreeRenderer {
    /// Renders the contexts in draw order, one pass labelled `Forward` per
    /// context, and submits the result.
    ///
    /// A target is cleared at most once per frame, by the first context
    /// rendering to it with the matching draw flags.
    pub fn render<T: TreeTraits>(
        &self,
        device: &dyn GraphicsDevice,
        tree: &RenderTree<'_, T>,
        registry: &ShaderRegistry,
    ) -> Result<usize, ForwardError> {
        let mut encoder = device.create_command_encoder(Some("Forward Tree"));
        let mut cleared = OnceBlock::<RenderTargets>::default();
        let mut draws = 0;
        for ctx in tree.contexts() {
            let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
            if !context.draw_flags.contains(DrawFlags::DRAW_3D) {
                continue;
            }
            let first_use = !cleared.is_blocked(&context.render_targets);
            let mut descriptor = RenderPassDescriptor::load("Forward", context.render_targets);
            if first_use && context.draw_flags.contains(DrawFlags::CLEAR_SCREEN) {
                descriptor.color_load = LoadOp::Clear(self.clear_color);
            }
            if first_use && context.draw_flags.contains(DrawFlags::CLEAR_ZBUFFER) {
                descriptor.depth_load = LoadOp::Clear(1.0);
            }
            let mut pass = encoder.begin_render_pass(&descriptor)?;
            apply_context_camera(pass.as_mut(), tree, ctx)?;
            draws += render_mesh_nodes(
                pass.as_mut(),
                tree,
                ctx,
                0..context.layer_count(),
                registry,
                |_| true,
                &[],
            )?;
        }
        device.submit_command_buffer(encoder.finish());
        log::trace!("ForwardTreeRenderer: {draws} draws");
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::layers::{ContextShaderSetup, RenderLayers};
    use crate::render_lane::render_tree::{MeshTemplate, PersistentData, StandardTreeTraits};
    use crate::testing::{material, mesh_wrapper, render_mesh, sector, view, RecordingDevice};
    use lumen_core::math::Vec3;
    use lumen_core::renderer::{
        PreCopy, RenderTarget, RenderTargetAttachment, ShaderTechnique, ShaderVarNames, TextureId,
    };
    use lumen_core::scene::{RenderPriorities, RenderPriority};
    use std::rc::Rc;

    #[test]
    fn contexts_draw_in_order_and_clear_each_target_once() {
        let device = RecordingDevice::default();
        let mut names = ShaderVarNames::new();
        let mut registry = ShaderRegistry::new();
        let two_pass = registry.register_with_techniques(
            "two pass",
            vec![ShaderTechnique {
                passes: 2,
                requires: Vec::new(),
            }],
        );
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);

        let a = tree.create_context(view(sector(0), 32, 32), None).expect("a");
        let b = tree.create_context(view(sector(1), 32, 32), None).expect("b");
        tree.context_mut(b).expect("b").draw_flags |= DrawFlags::CLEAR_SCREEN;

        let mesh = render_mesh(7, material(two_pass));
        let wrapper = Rc::new(mesh_wrapper(1, RenderPriority(6), Vec3::ZERO, mesh.clone()));
        let mut template = MeshTemplate::for_wrapper(wrapper);
        template.pre_copies.push(PreCopy {
            source: RenderTargetAttachment::Color0,
            destination: TextureId(3),
        });
        tree.add_render_mesh(a, mesh, RenderPriority(6), &template)
            .expect("add");
        for ctx in [a, b] {
            RenderLayers::default()
                .setup_shaders(&mut tree, ctx, &registry, &names)
                .expect("shaders");
        }

        let draws = ForwardTreeRenderer::default()
            .render(&device, &tree, &registry)
            .expect("render");
        assert_eq!(draws, 2);

        let passes = device.passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].depth_load, LoadOp::Clear(1.0));
        assert_eq!(passes[0].draws.len(), 2);
        assert_eq!(passes[0].draws[1].pass, 1);
        assert_eq!(passes[0].copies.len(), 1);
        // Same screen target: the second context must not clear again.
        assert_eq!(passes[1].depth_load, LoadOp::Load);
        assert_eq!(passes[1].color_load, LoadOp::Load);
        assert_eq!(device.submitted_count(), 1);
    }

    #[test]
    fn mirrored_views_flip_culling_and_filters_skip_nodes() {
        let device = RecordingDevice::default();
        let mut names = ShaderVarNames::new();
        let mut registry = ShaderRegistry::new();
        let shader = registry.register("plain");
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);

        let mut mirrored = (*view(sector(0), 16, 16)).clone();
        mirrored.camera.mirrored = true;
        let ctx = tree.create_context(Rc::new(mirrored), None).expect("ctx");
        for (i, priority) in [(1, RenderPriority(4)), (2, RenderPriority(9))] {
            let mesh = render_mesh(i, material(shader));
            let wrapper = Rc::new(mesh_wrapper(i as u32, priority, Vec3::ZERO, mesh.clone()));
            tree.add_render_mesh(ctx, mesh, priority, &MeshTemplate::for_wrapper(wrapper))
                .expect("add");
        }
        RenderLayers::default()
            .setup_shaders(&mut tree, ctx, &registry, &names)
            .expect("shaders");

        let mut encoder = device.create_command_encoder(None);
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor::load(
                "Test",
                RenderTargets::color(RenderTarget::new(TextureId(0))),
            ))
            .expect("pass");
        let drawn = render_mesh_nodes(
            pass.as_mut(),
            &tree,
            ctx,
            0..1,
            &registry,
            |key| key.priority == RenderPriority(9),
            &[],
        )
        .expect("draw");
        drop(pass);
        assert_eq!(drawn, 1);
        let draws = device.draws_in("Test");
        assert_eq!(draws[0].geometry.0, 2);
        assert_eq!(draws[0].cull_mode, CullMode::Reverse);
    }
}
