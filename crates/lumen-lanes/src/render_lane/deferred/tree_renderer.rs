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

//! Draws a render tree with deferred shading.

use super::gbuffer::GBuffer;
use super::global_illum::GlobalIllumRenderer;
use super::light_render::{DeferredLightRenderer, LightRenderData};
use super::shadow_pssm::PssmShadows;
use super::DeferredError;
use crate::render_lane::forward::{apply_context_camera, render_mesh_nodes};
use crate::render_lane::operations::{OnceBlock, OperationBlock};
use crate::render_lane::render_tree::{ContextHandle, RenderTree, TreeError, TreeTraits};
use lumen_core::math::LinearRgba;
use lumen_core::renderer::{
    CommandEncoder, GraphicsDevice, LoadOp, RenderPassDescriptor, RenderTarget,
    RenderTargetAttachment, RenderTargets, ShaderRegistry,
};
use lumen_core::scene::{Camera, RenderView, SectorId};
use std::rc::Rc;

/// Counters of one [`DeferredTreeRenderer::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeferredStats {
    /// Context stacks drawn.
    pub stacks: usize,
    /// Draw calls into the G-buffer.
    pub gbuffer_draws: usize,
    /// Ambient and light draw calls.
    pub light_draws: usize,
    /// Global illumination draw calls.
    pub global_illum_draws: usize,
    /// Forward mesh draw calls.
    pub forward_draws: usize,
    /// Light volume outlines.
    pub volume_draws: usize,
}

/// Debug flag outlining light volumes over the final image.
pub const DEBUG_FLAG_LIGHT_VOLUMES: &str = "draw.lightvolumes";

type StackKey = (RenderTargets, *const RenderView);

/// Renders the contexts of a tree in three passes per stack:
///
/// 1. `Fill-GBuffer`: deferred meshes write their surface attributes.
/// 2. `Light-Accumulate`: the ambient term, then every light of every
///    sector in the stack, blended additively.
/// 3. `Forward-Composite`: meshes routed forward, drawn over the lit result.
///
/// Contexts are visited last to first so that contexts rendering into
/// textures are drawn before the contexts sampling them. Consecutive contexts
/// with the same output and the same render view form a stack and share one
/// G-buffer fill. An output is cleared by the first stack drawing into it;
/// later stacks accumulate over it. The G-buffer is filled with the camera of the first context of the
/// stack; contexts seen through simple portals are assumed to share it.
pub struct DeferredTreeRenderer<'a> {
    device: &'a dyn GraphicsDevice,
    registry: &'a ShaderRegistry,
    gbuffer: &'a mut GBuffer,
    lights: &'a mut LightRenderData,
    global_illum: Option<&'a GlobalIllumRenderer>,
    shadows: Option<&'a PssmShadows>,
    clear_color: LinearRgba,
}

impl<'a> DeferredTreeRenderer<'a> {
    /// A renderer filling `gbuffer` and lighting with `lights`.
    pub fn new(
        device: &'a dyn GraphicsDevice,
        registry: &'a ShaderRegistry,
        gbuffer: &'a mut GBuffer,
        lights: &'a mut LightRenderData,
    ) -> Self {
        Self {
            device,
            registry,
            gbuffer,
            lights,
            global_illum: None,
            shadows: None,
            clear_color: LinearRgba::BLACK,
        }
    }

    /// Runs `global_illum` after light accumulation.
    #[must_use]
    pub fn with_global_illum(mut self, global_illum: &'a GlobalIllumRenderer) -> Self {
        self.global_illum = Some(global_illum);
        self
    }

    /// Binds the shadow maps of `shadows` to the lights they were set up
    /// for.
    #[must_use]
    pub fn with_shadows(mut self, shadows: &'a PssmShadows) -> Self {
        self.shadows = Some(shadows);
        self
    }

    /// Color the accumulation buffer is cleared to.
    #[must_use]
    pub fn with_clear_color(mut self, color: LinearRgba) -> Self {
        self.clear_color = color;
        self
    }

    /// Draws `tree` and submits the result. Contexts rendering to the screen
    /// render to `output` instead.
    pub fn render<T: TreeTraits>(
        &mut self,
        tree: &RenderTree<'_, T>,
        output: RenderTargets,
    ) -> Result<DeferredStats, DeferredError> {
        let mut encoder = self.device.create_command_encoder(Some("Deferred Tree"));
        let mut stats = DeferredStats::default();
        let mut stack: Vec<ContextHandle<T>> = Vec::new();
        let mut current: Option<StackKey> = None;
        let mut cleared = OnceBlock::<RenderTargets>::default();

        for ctx in tree.contexts_rev() {
            let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
            let targets = if context.render_targets.is_screen() {
                output
            } else {
                context.render_targets
            };
            let key = (targets, Rc::as_ptr(&context.view));
            if let Some(previous) = current.filter(|k| *k != key) {
                let clear = !cleared.is_blocked(&previous.0);
                self.render_stack(encoder.as_mut(), tree, &stack, previous.0, clear, &mut stats)?;
                stack.clear();
            }
            current = Some(key);
            stack.push(ctx);
        }
        if let Some(last) = current {
            let clear = !cleared.is_blocked(&last.0);
            self.render_stack(encoder.as_mut(), tree, &stack, last.0, clear, &mut stats)?;
        }

        self.device.submit_command_buffer(encoder.finish());
        log::trace!("DeferredTreeRenderer: {stats:?}");
        Ok(stats)
    }

    fn render_stack<T: TreeTraits>(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        tree: &RenderTree<'_, T>,
        stack: &[ContextHandle<T>],
        targets: RenderTargets,
        clear: bool,
        stats: &mut DeferredStats,
    ) -> Result<(), DeferredError> {
        let Some(&first) = stack.first() else {
            return Ok(());
        };
        stats.stacks += 1;

        let gbuffer_targets = self.gbuffer.attach(self.device)?;
        let filled = self.fill_gbuffer(encoder, tree, stack, first, gbuffer_targets);
        self.gbuffer.detach()?;
        stats.gbuffer_draws += filled?;

        let accumulation = self.accumulation_targets(targets);
        self.device.validate_render_targets(&accumulation)?;
        stats.light_draws +=
            self.accumulate_lights(encoder, tree, stack, first, accumulation, clear)?;

        if let Some(gi) = self.global_illum {
            stats.global_illum_draws += gi.render(encoder, self.gbuffer, accumulation)?;
        }

        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::load(
            "Forward-Composite",
            accumulation,
        ))?;
        let mut volumes = DeferredLightRenderer::new(
            self.device,
            &mut *self.lights,
            self.registry,
            self.gbuffer,
        );
        let show_volumes = tree
            .persistent()
            .is_debug_flag_enabled(DEBUG_FLAG_LIGHT_VOLUMES);
        let mut lit = OnceBlock::<SectorId>::default();
        for &ctx in stack {
            let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
            apply_context_camera(pass.as_mut(), tree, ctx)?;
            stats.forward_draws += render_mesh_nodes(
                pass.as_mut(),
                tree,
                ctx,
                0..context.layer_count(),
                self.registry,
                |key| key.use_forward_rendering,
                &[],
            )?;
            let sector = &context.view.sector;
            if show_volumes && !lit.is_blocked(&sector.id) {
                for light in &sector.lights {
                    stats.volume_draws += volumes.render_light_volume(pass.as_mut(), light);
                }
            }
        }
        Ok(())
    }

    fn fill_gbuffer<T: TreeTraits>(
        &self,
        encoder: &mut dyn CommandEncoder,
        tree: &RenderTree<'_, T>,
        stack: &[ContextHandle<T>],
        first: ContextHandle<T>,
        targets: RenderTargets,
    ) -> Result<usize, DeferredError> {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::clear(
            "Fill-GBuffer",
            targets,
            LinearRgba::TRANSPARENT,
        ))?;
        apply_context_camera(pass.as_mut(), tree, first)?;
        let mut draws = 0;
        for &ctx in stack {
            draws += render_mesh_nodes(
                pass.as_mut(),
                tree,
                ctx,
                0..1,
                self.registry,
                |key| !key.use_forward_rendering,
                &[],
            )?;
        }
        Ok(draws)
    }

    /// `targets` with the G-buffer depth attached when it can be shared:
    /// the color target is a texture of the G-buffer's size and no depth
    /// buffer is attached yet.
    fn accumulation_targets(&self, targets: RenderTargets) -> RenderTargets {
        if targets.is_screen() || targets.get(RenderTargetAttachment::Depth).is_some() {
            return targets;
        }
        let (Some(color), Some(depth)) = (
            targets.get(RenderTargetAttachment::Color0),
            self.gbuffer.depth_buffer(),
        ) else {
            return targets;
        };
        match self.device.texture_info(color.texture) {
            Ok(info) if (info.width, info.height) == self.gbuffer.size() => {
                let mut shared = targets;
                shared.set(RenderTargetAttachment::Depth, Some(RenderTarget::new(depth)));
                shared
            }
            _ => targets,
        }
    }

    fn accumulate_lights<T: TreeTraits>(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        tree: &RenderTree<'_, T>,
        stack: &[ContextHandle<T>],
        first: ContextHandle<T>,
        targets: RenderTargets,
        clear: bool,
    ) -> Result<usize, DeferredError> {
        let mut descriptor = if clear {
            RenderPassDescriptor::clear("Light-Accumulate", targets, self.clear_color)
        } else {
            RenderPassDescriptor::load("Light-Accumulate", targets)
        };
        if targets.get(RenderTargetAttachment::Depth).is_some() {
            descriptor.depth_load = LoadOp::Load;
        }
        let mut pass = encoder.begin_render_pass(&descriptor)?;
        let mut renderer = DeferredLightRenderer::new(
            self.device,
            &mut *self.lights,
            self.registry,
            self.gbuffer,
        );

        let first_view = &tree
            .context(first)
            .ok_or(TreeError::ContextNotPresent)?
            .view;
        let mut draws = renderer.output_ambient_light(
            pass.as_mut(),
            first_view.sector.ambient,
            first_view.width,
            first_view.height,
        )?;

        let mut lit = OnceBlock::<SectorId>::default();
        for &ctx in stack {
            let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
            let sector = &context.view.sector;
            if lit.is_blocked(&sector.id) {
                continue;
            }
            apply_context_camera(pass.as_mut(), tree, ctx)?;
            renderer.set_camera(&Camera {
                transform: context.camera_transform,
                ..context.view.camera
            });
            for (index, light) in sector.lights.iter().enumerate() {
                let shadow_vars = self
                    .shadows
                    .map_or(&[][..], |s| s.light_variables(sector.id, index));
                draws +=
                    renderer.render_light(pass.as_mut(), light, &sector.variables, shadow_vars)?;
            }
        }
        Ok(draws)
    }
}
