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

//! Defines the DeferredRenderManager, the orchestrator of a deferred frame.

use super::{RenderManagerConfig, RenderManagerError};
use lumen_core::renderer::{
    GraphicsDevice, Material, RenderTargets, ResourceError, ShaderRegistry,
    ShaderVarNames, TextureId, SHADER_TYPE_GBUFFER_FILL, SHADER_TYPE_STANDARD,
};
use lumen_core::scene::{RenderPriorities, RenderView, VisCuller};
use lumen_lanes::render_lane::deferred::{
    DeferredShaderSetup, DeferredStats, DeferredTreeRenderer, DeferredTreeTraits,
    ForwardPriorityMask, GBuffer, GlobalIllumRenderer, LightRenderData, PssmShadows,
    DEBUG_FLAG_LIGHT_VOLUMES,
};
use lumen_lanes::render_lane::layers::RenderLayers;
use lumen_lanes::render_lane::post_effect::{LayerId, PostEffectLayersParser, PostEffectManager};
use lumen_lanes::render_lane::render_tree::{
    ContextHandle, DrawFlags, PersistentData, RenderTree, TreeError,
};
use lumen_lanes::render_lane::setup::{
    PortalPersistentData, RegisteredTarget, RenderTargetRegistry, StandardContextSetup,
    TargetFlags,
};
use lumen_lanes::render_lane::visibility::{FrustumVisCuller, OcclusionVisCuller, OCCLUSION_SHADER};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

/// Shader drawing the textured polygon of heavy portals.
pub const PORTAL_SHADER: &str = "portal";

/// Renders views with deferred shading.
///
/// The manager owns everything that outlives a frame: the tree arenas, the
/// portal texture cache, the G-buffer, the light volumes, the GI buffers,
/// the registered targets and the post effects. Shaders are looked up by
/// name in the registry handed to [`new`](Self::new); missing light and GI
/// shaders are registered as placeholders.
pub struct DeferredRenderManager {
    config: RenderManagerConfig,
    // Set by initialize(); every frame needs it.
    device: Option<Arc<dyn GraphicsDevice>>,
    registry: ShaderRegistry,
    names: ShaderVarNames,
    tree_data: PersistentData<DeferredTreeTraits>,
    shader_setup: DeferredShaderSetup,
    portals: PortalPersistentData,
    targets: RenderTargetRegistry,
    post_effects: PostEffectManager,
    gbuffer: GBuffer,
    lights: Option<LightRenderData>,
    global_illum: Option<GlobalIllumRenderer>,
    shadows: Option<PssmShadows>,
    objects: Rc<FrustumVisCuller>,
    occlusion: Option<Rc<OcclusionVisCuller>>,
    // --- Frame statistics ---
    frame_count: u64,
    last_stats: DeferredStats,
}

impl DeferredRenderManager {
    /// Creates a manager using the standard render priorities.
    pub fn new(config: RenderManagerConfig, registry: ShaderRegistry) -> Self {
        Self::with_priorities(config, registry, Rc::new(RenderPriorities::default()))
    }

    /// Creates a manager resolving priority names against `priorities`.
    pub fn with_priorities(
        config: RenderManagerConfig,
        mut registry: ShaderRegistry,
        priorities: Rc<RenderPriorities>,
    ) -> Self {
        let mut names = ShaderVarNames::new();
        let forward = ForwardPriorityMask::resolve(&config.forward_priorities, &priorities);
        let mut tree_data =
            PersistentData::new(DeferredTreeTraits::new(forward), priorities, &mut names);
        tree_data.enable_debug_flag(DEBUG_FLAG_LIGHT_VOLUMES, config.show_light_volumes);

        let portal_shader = registry
            .find(PORTAL_SHADER)
            .unwrap_or_else(|| registry.register(PORTAL_SHADER));
        let portal_material = Rc::new(
            Material::new("portal")
                .with_shader(SHADER_TYPE_STANDARD, portal_shader)
                .with_shader(SHADER_TYPE_GBUFFER_FILL, portal_shader),
        );
        let portals =
            PortalPersistentData::new(portal_material, config.portal_texture_format, &mut names);
        let post_effects = PostEffectManager::new(&mut names);
        let gbuffer = GBuffer::with_description(config.gbuffer);
        let shadows = config
            .shadows
            .enable
            .then(|| PssmShadows::new(config.shadows.clone(), &mut registry, &mut names));

        let objects = Rc::new(FrustumVisCuller::new());
        let occlusion = config.occlusion_culling.then(|| {
            let depth_shader = registry
                .find(OCCLUSION_SHADER)
                .unwrap_or_else(|| registry.register(OCCLUSION_SHADER));
            Rc::new(OcclusionVisCuller::new(
                objects.clone(),
                depth_shader,
                config.occlusion_frame_skip,
            ))
        });

        Self {
            config,
            device: None,
            registry,
            names,
            tree_data,
            shader_setup: DeferredShaderSetup::new(RenderLayers::default()),
            portals,
            targets: RenderTargetRegistry::new(),
            post_effects,
            gbuffer,
            lights: None,
            global_illum: None,
            shadows,
            objects,
            occlusion,
            frame_count: 0,
            last_stats: DeferredStats::default(),
        }
    }

    /// Creates the device resources that do not depend on the view size.
    ///
    /// Fails when the device cannot attach the configured G-buffer, when the
    /// light volumes cannot be uploaded or when the configured post-effect
    /// document is invalid. Global illumination failures only disable it.
    pub fn initialize(&mut self, device: Arc<dyn GraphicsDevice>) -> Result<(), RenderManagerError> {
        let requested = self.config.gbuffer.color_buffer_count;
        let max = device.capabilities().usable_color_attachments();
        if requested > max {
            log::error!(
                "DeferredRenderManager: the device supports {max} color attachments, the G-buffer needs {requested}"
            );
            return Err(ResourceError::AttachmentLimitExceeded { requested, max }.into());
        }

        let lights = LightRenderData::new(
            device.as_ref(),
            &mut self.registry,
            &mut self.names,
            self.config.lights,
        )?;
        if let Some(mut old) = self.lights.replace(lights) {
            old.release(device.as_ref());
        }
        if self.config.global_illum.enable {
            self.global_illum = Some(GlobalIllumRenderer::new(
                self.config.global_illum.clone(),
                &mut self.registry,
                &mut self.names,
            ));
        }
        self.post_effects.initialize(device.clone());
        self.device = Some(device);

        if let Some(path) = self.config.effects.clone() {
            self.add_layers_from_file(path)?;
        }
        log::info!(
            "DeferredRenderManager: initialized (forward priorities '{}', global illumination {})",
            self.config.forward_priorities,
            if self.global_illum.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    /// The settings the manager was created with.
    pub fn config(&self) -> &RenderManagerConfig {
        &self.config
    }

    /// The shader registry.
    pub fn registry(&self) -> &ShaderRegistry {
        &self.registry
    }

    /// The shader registry, for registering shaders after creation.
    pub fn registry_mut(&mut self) -> &mut ShaderRegistry {
        &mut self.registry
    }

    /// The interned shader variable names.
    pub fn names(&self) -> &ShaderVarNames {
        &self.names
    }

    /// The post effects run over every rendered view.
    pub fn post_effects(&self) -> &PostEffectManager {
        &self.post_effects
    }

    /// The post effects, mutably.
    pub fn post_effects_mut(&mut self) -> &mut PostEffectManager {
        &mut self.post_effects
    }

    /// The G-buffer.
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// The global illumination stage, when configured.
    pub fn global_illum(&self) -> Option<&GlobalIllumRenderer> {
        self.global_illum.as_ref()
    }

    /// The culler sectors should use: the occlusion culler when configured,
    /// the frustum culler otherwise.
    pub fn vis_culler(&self) -> Rc<dyn VisCuller> {
        if let Some(occlusion) = &self.occlusion {
            return occlusion.clone();
        }
        self.objects.clone()
    }

    /// The object set both cullers test; objects are registered here.
    pub fn frustum_culler(&self) -> &Rc<FrustumVisCuller> {
        &self.objects
    }

    /// The occlusion culler, when `OcclusionCulling` is set.
    pub fn occlusion_culler(&self) -> Option<&Rc<OcclusionVisCuller>> {
        self.occlusion.as_ref()
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Counters of the last rendered frame.
    pub fn last_stats(&self) -> DeferredStats {
        self.last_stats
    }

    /// Changes the priorities drawn forward. Meshes are routed with the new
    /// set from the next frame on.
    pub fn set_forward_priorities(&mut self, names: &str) {
        let forward = ForwardPriorityMask::resolve(names, self.tree_data.priorities());
        self.tree_data.traits_mut().forward = forward;
        self.config.forward_priorities = names.to_string();
    }

    /// Turns the light volume overlay on or off.
    pub fn set_show_light_volumes(&mut self, show: bool) {
        self.config.show_light_volumes = show;
        self.tree_data.enable_debug_flag(DEBUG_FLAG_LIGHT_VOLUMES, show);
    }

    /// The shadow maps, when `Shadows.Enable` is set.
    pub fn shadows(&self) -> Option<&PssmShadows> {
        self.shadows.as_ref()
    }

    /// Renders `view` into `texture` every frame it is marked as used, or
    /// every frame with [`TargetFlags::ALWAYS_USED`].
    pub fn register_render_target(
        &mut self,
        view: Rc<RenderView>,
        texture: TextureId,
        subtexture: u32,
        flags: TargetFlags,
    ) {
        self.targets.register(view, texture, subtexture, flags);
    }

    /// Stops rendering into `texture`. Returns `false` when it was not
    /// registered.
    pub fn unregister_render_target(&mut self, texture: TextureId) -> bool {
        self.targets.unregister(texture)
    }

    /// Requests `texture` to be rendered in the next frame.
    pub fn mark_as_used(&mut self, texture: TextureId) -> bool {
        self.targets.mark_as_used(texture)
    }

    /// Appends the layers of a post-effect document.
    pub fn add_layers_from_document(
        &mut self,
        document: &str,
    ) -> Result<Vec<LayerId>, RenderManagerError> {
        Ok(PostEffectLayersParser::new(&self.registry).add_layers_from_document(
            &mut self.post_effects,
            &mut self.names,
            document,
        )?)
    }

    /// Appends the layers of a post-effect document file.
    pub fn add_layers_from_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<LayerId>, RenderManagerError> {
        Ok(PostEffectLayersParser::new(&self.registry).add_layers_from_file(
            &mut self.post_effects,
            &mut self.names,
            path,
        )?)
    }

    fn device(&self) -> Result<Arc<dyn GraphicsDevice>, RenderManagerError> {
        self.device.clone().ok_or(RenderManagerError::NotInitialized)
    }

    /// Sizes the view-dependent buffers for a `width` × `height` view.
    fn prepare_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderManagerError> {
        self.post_effects.setup_view(width, height)?;
        self.gbuffer
            .resize(device, width, height, &mut self.names)
            .map_err(|e| {
                log::error!("DeferredRenderManager: cannot create the G-buffer: {e}");
                e
            })?;
        if let Some(gi) = self.global_illum.as_mut() {
            if let Err(e) = gi.resize(device, width, height) {
                log::warn!("DeferredRenderManager: global illumination disabled: {e}");
            }
        }
        Ok(())
    }

    /// Creates the top-level contexts of a frame: `view` first, then one per
    /// registered target due this frame.
    fn create_contexts(
        tree: &mut RenderTree<'_, DeferredTreeTraits>,
        view: &Rc<RenderView>,
        due: &[RegisteredTarget],
    ) -> Result<Vec<ContextHandle<DeferredTreeTraits>>, TreeError> {
        let main = tree.create_context(view.clone(), None)?;
        tree.context_mut(main)
            .ok_or(TreeError::ContextNotPresent)?
            .draw_flags |= DrawFlags::CLEAR_SCREEN;
        let mut contexts = vec![main];
        for target in due {
            let ctx = tree.create_context(target.view.clone(), None)?;
            let context = tree.context_mut(ctx).ok_or(TreeError::ContextNotPresent)?;
            context.render_targets = RenderTargets::color(target.target);
            context.draw_flags |= DrawFlags::CLEAR_SCREEN;
            contexts.push(ctx);
        }
        Ok(contexts)
    }

    /// Renders `view`, the registered targets due this frame, and the post
    /// effects. The scene is rendered into the post-effect input, or straight
    /// to the screen without post effects.
    ///
    /// A failure aborts the whole frame; the tree is released either way.
    pub fn render_view(&mut self, view: &Rc<RenderView>) -> Result<DeferredStats, RenderManagerError> {
        let device = self.device()?;
        self.frame_count += 1;
        self.portals.begin_frame(device.as_ref(), self.frame_count);
        if let Some(occlusion) = &self.occlusion {
            occlusion.begin_frame(self.frame_count, &device);
        }
        self.lights
            .as_mut()
            .ok_or(RenderManagerError::NotInitialized)?
            .begin_frame(device.as_ref());
        self.prepare_buffers(device.as_ref(), view.width, view.height)?;
        if let Some(shadows) = self.shadows.as_mut() {
            shadows.begin_frame(device.as_ref(), self.frame_count);
            shadows.render(device.as_ref(), view, &self.objects.objects())?;
        }

        let output = self
            .post_effects
            .screen_target()
            .map_or(RenderTargets::SCREEN, RenderTargets::color);
        let due = self.targets.prepare_frame();
        let lights = self
            .lights
            .as_mut()
            .ok_or(RenderManagerError::NotInitialized)?;

        let stats = {
            let mut tree = RenderTree::new(&mut self.tree_data);
            let contexts = Self::create_contexts(&mut tree, view, &due)?;
            let setup = StandardContextSetup::new(
                &self.shader_setup,
                &self.registry,
                &self.names,
                device.as_ref(),
            )
            .with_recursion_limit(self.config.portal_recursion_limit);
            for ctx in contexts {
                setup.setup(&mut tree, ctx, &mut self.portals)?;
            }

            let mut renderer =
                DeferredTreeRenderer::new(device.as_ref(), &self.registry, &mut self.gbuffer, lights);
            if let Some(shadows) = self.shadows.as_ref() {
                renderer = renderer.with_shadows(shadows);
            }
            if let Some(gi) = self.global_illum.as_ref().filter(|gi| gi.is_enabled()) {
                renderer = renderer.with_global_illum(gi);
            }
            renderer.render(&tree, output)?
        };

        if self.post_effects.layer_count() > 0 {
            let mut encoder = device.create_command_encoder(Some("Post Effects"));
            self.post_effects.draw_post_effects(encoder.as_mut())?;
            device.submit_command_buffer(encoder.finish());
        }

        log::trace!(
            "DeferredRenderManager: frame {} rendered {} stacks",
            self.frame_count,
            stats.stacks
        );
        self.last_stats = stats;
        Ok(stats)
    }

    /// Prepares everything `view` needs without drawing: buffers are sized
    /// and the shaders of every visible mesh are resolved.
    pub fn precache_view(&mut self, view: &Rc<RenderView>) -> Result<(), RenderManagerError> {
        let device = self.device()?;
        self.prepare_buffers(device.as_ref(), view.width, view.height)?;
        let mut tree = RenderTree::new(&mut self.tree_data);
        let ctx = tree.create_context(view.clone(), None)?;
        StandardContextSetup::new(
            &self.shader_setup,
            &self.registry,
            &self.names,
            device.as_ref(),
        )
        .with_recursion_limit(self.config.portal_recursion_limit)
        .setup(&mut tree, ctx, &mut self.portals)?;
        log::debug!(
            "DeferredRenderManager: precached {} meshes",
            tree.context(ctx).map_or(0, |c| c.total_render_meshes())
        );
        Ok(())
    }
}

impl Drop for DeferredRenderManager {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        self.gbuffer.release(device.as_ref());
        if let Some(lights) = self.lights.as_mut() {
            lights.release(device.as_ref());
        }
        if let Some(gi) = self.global_illum.as_mut() {
            gi.release(device.as_ref());
        }
        if let Some(shadows) = self.shadows.as_mut() {
            shadows.release(device.as_ref());
        }
        self.portals.clear(device.as_ref());
    }
}
