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
use super::context::{ContextSetup, ContextSetupData};
use super::SetupError;
use crate::render_lane::render_tree::{
    ContextHandle, DrawFlags, MeshTemplate, PortalHolder, RenderTree, TreeError, TreeTraits,
};
use lumen_core::math::{Box2, Mat4, Vec2, Vec4};
use lumen_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, Material, MixMode, RenderMesh,
    RenderTarget, RenderTargets, ShaderValue, ShaderVarName, ShaderVarNames, ShaderVariable,
    TextureFlags, TextureFormat, ZBufMode,
};
use lumen_core::scene::{Camera, Portal, RenderView, Sector};
use lumen_data::cache::TextureCache;
use std::borrow::Cow;
use std::rc::Rc;

/// Name of the shader variable holding the texture a heavy portal was
/// rendered into.
pub const PORTAL_TEXTURE_SV: &str = "tex portal";

/// A vertex of a synthesized portal mesh: camera-space position and a
/// projective texture coordinate into the portal texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PortalVertex {
    /// Camera-space position.
    pub position: [f32; 3],
    /// `(s * w, t * w, 0, w)`.
    pub texcoord: [f32; 4],
}

/// Portal state that outlives a frame.
#[derive(Debug)]
pub struct PortalPersistentData {
    texture_cache: TextureCache,
    frame_buffers: Vec<BufferId>,
    material: Rc<Material>,
    texture_name: ShaderVarName,
}

impl PortalPersistentData {
    /// Heavy portals are drawn with `material` into `format` textures.
    pub fn new(material: Rc<Material>, format: TextureFormat, names: &mut ShaderVarNames) -> Self {
        let mut texture_cache = TextureCache::new(format);
        texture_cache.set_flags(
            TextureFlags::RENDER_TARGET
                | TextureFlags::NO_MIPMAPS
                | TextureFlags::CLAMP
                | TextureFlags::NPOTS
                | TextureFlags::SCALE_UP,
        );
        Self {
            texture_cache,
            frame_buffers: Vec::new(),
            material,
            texture_name: names.intern(PORTAL_TEXTURE_SV),
        }
    }

    /// Frees the previous frame's portal geometry and ages the texture cache.
    pub fn begin_frame(&mut self, device: &dyn GraphicsDevice, frame: u64) {
        self.release_buffers(device);
        self.texture_cache.advance_frame(device, frame);
    }

    /// Releases every portal resource.
    pub fn clear(&mut self, device: &dyn GraphicsDevice) {
        self.release_buffers(device);
        self.texture_cache.clear(device);
    }

    fn release_buffers(&mut self, device: &dyn GraphicsDevice) {
        for buffer in self.frame_buffers.drain(..) {
            if let Err(err) = device.destroy_buffer(buffer) {
                log::warn!("PortalSetup: failed to destroy portal geometry {buffer:?}: {err}");
            }
        }
    }

    /// The cache heavy portal textures come from.
    pub fn texture_cache(&self) -> &TextureCache {
        &self.texture_cache
    }

    /// The portal texture variable.
    pub fn texture_name(&self) -> ShaderVarName {
        self.texture_name
    }

    /// Portal geometry buffers created this frame.
    pub fn frame_buffers(&self) -> &[BufferId] {
        &self.frame_buffers
    }
}

/// Sets up the contexts seen through the portals met in a context.
///
/// Simple portals render the target sector into the parent's targets,
/// clipped to the portal's screen box, from a context placed right after the
/// last simple portal context. Heavy portals render the target sector into a
/// cached texture through a context appended to the tree, then draw a
/// textured copy of the portal polygon in the parent context.
#[derive(Debug, Clone, Copy)]
pub struct StandardPortalSetup<'d> {
    device: &'d dyn GraphicsDevice,
}

impl<'d> StandardPortalSetup<'d> {
    /// Portal setup creating its resources on `device`.
    pub fn new(device: &'d dyn GraphicsDevice) -> Self {
        Self { device }
    }

    /// Sets up every portal recorded in `ctx`, recursing into the target
    /// sectors through `context_setup`.
    pub fn setup<T: TreeTraits, C: ContextSetup<T> + ?Sized>(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        data: &mut ContextSetupData<T>,
        portals: &mut PortalPersistentData,
        context_setup: &C,
    ) -> Result<(), SetupError> {
        let context = tree.context(ctx).ok_or(TreeError::ContextNotPresent)?;
        let view = context.view.clone();
        let holders = context.portals.clone();

        for holder in &holders {
            for portal in &holder.container.portals {
                let Some(target) = portal.target_sector.clone() else {
                    continue;
                };
                if target.recursion_level() >= portal.max_sector_visit {
                    log::trace!(
                        "PortalSetup: '{}' skipped, '{}' visited {} times",
                        portal.name,
                        target.name,
                        target.recursion_level()
                    );
                    continue;
                }
                let Some(screen_box) = clipped_screen_box(portal, &view) else {
                    continue;
                };

                target.increment_recursion_level();
                let result = if portal.is_simple() {
                    self.setup_simple(
                        tree,
                        ctx,
                        &view,
                        portal,
                        target.clone(),
                        screen_box,
                        data,
                        portals,
                        context_setup,
                    )
                } else {
                    self.setup_heavy(
                        tree,
                        ctx,
                        &view,
                        holder,
                        portal,
                        target.clone(),
                        screen_box,
                        data,
                        portals,
                        context_setup,
                    )
                };
                target.decrement_recursion_level();
                result?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn setup_simple<T: TreeTraits, C: ContextSetup<T> + ?Sized>(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        view: &RenderView,
        portal: &Portal,
        target: Rc<Sector>,
        screen_box: Box2,
        data: &mut ContextSetupData<T>,
        portals: &mut PortalPersistentData,
        context_setup: &C,
    ) -> Result<(), SetupError> {
        let camera = portal.camera_through(&view.camera);
        let portal_view = Rc::new(view.through_portal(camera, target, screen_box));
        let portal_ctx = tree.create_context(portal_view, Some(data.last_simple_portal_ctx))?;
        let targets = tree
            .context(ctx)
            .ok_or(TreeError::ContextNotPresent)?
            .render_targets;
        let portal_context = tree
            .context_mut(portal_ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        portal_context.render_targets = targets;
        portal_context.draw_flags = DrawFlags::CLEAR_ZBUFFER | DrawFlags::DRAW_3D;
        data.last_simple_portal_ctx = portal_ctx;

        log::trace!("PortalSetup: simple portal '{}'", portal.name);
        data.depth += 1;
        let result = context_setup.setup_context(tree, portal_ctx, data, portals);
        data.depth -= 1;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn setup_heavy<T: TreeTraits, C: ContextSetup<T> + ?Sized>(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        view: &RenderView,
        holder: &PortalHolder,
        portal: &Portal,
        target: Rc<Sector>,
        screen_box: Box2,
        data: &ContextSetupData<T>,
        portals: &mut PortalPersistentData,
        context_setup: &C,
    ) -> Result<(), SetupError> {
        let tex_w = screen_box.width().ceil().max(1.0) as u32;
        let tex_h = screen_box.height().ceil().max(1.0) as u32;
        let texture = portals
            .texture_cache
            .query_unused_texture(self.device, tex_w, tex_h)?;
        let info = self.device.texture_info(texture)?;

        let mut camera = portal.camera_through(&view.camera);
        camera.projection =
            portal_projection(&camera.projection, &screen_box, view, info.width, info.height);
        let clip = Box2 {
            min: Vec2::ZERO,
            max: Vec2::new(
                (tex_w + 1).min(info.width) as f32,
                (tex_h + 1).min(info.height) as f32,
            ),
        };
        let portal_view = Rc::new(RenderView {
            camera,
            sector: target,
            width: info.width,
            height: info.height,
            clip_rect: Some(clip),
            previous_sector: Some(view.sector.clone()),
        });
        let portal_ctx = tree.create_context(portal_view, None)?;
        let portal_context = tree
            .context_mut(portal_ctx)
            .ok_or(TreeError::ContextNotPresent)?;
        portal_context.render_targets = RenderTargets::color(RenderTarget::new(texture));
        portal_context.draw_flags =
            DrawFlags::CLEAR_SCREEN | DrawFlags::CLEAR_ZBUFFER | DrawFlags::DRAW_3D;

        log::trace!(
            "PortalSetup: heavy portal '{}' into {}x{} texture {texture:?}",
            portal.name,
            info.width,
            info.height
        );
        let mut nested = ContextSetupData::new(portal_ctx);
        nested.depth = data.depth + 1;
        context_setup.setup_context(tree, portal_ctx, &mut nested, portals)?;

        // The textured portal polygon, drawn in the parent context.
        let texture_projection =
            portal_projection(&view.camera.projection, &screen_box, view, info.width, info.height);
        let vertices = portal_vertices(portal, &view.camera, &texture_projection);
        let geometry = self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Owned(format!("Portal '{}'", portal.name))),
                size: std::mem::size_of_val(vertices.as_slice()) as u64,
                usage: BufferUsage::VERTEX,
            },
            bytemuck::cast_slice(&vertices),
        )?;
        portals.frame_buffers.push(geometry);

        let mut mesh = RenderMesh::new(geometry, portals.material.clone());
        mesh.z_mode = Some(ZBufMode::Use);
        mesh.mix_mode = MixMode::Copy;
        mesh.variables.add_variable(ShaderVariable::new(
            portals.texture_name,
            ShaderValue::Texture(texture),
        ));
        let mut template = MeshTemplate::for_wrapper(holder.mesh_wrapper.clone());
        template.object_to_world = view.camera.transform;
        template.z_mode = ZBufMode::Use;
        tree.add_render_mesh(
            ctx,
            Rc::new(mesh),
            holder.mesh_wrapper.render_priority,
            &template,
        )?;
        Ok(())
    }
}

/// The portal's screen box, restricted to the view's clip rectangle.
fn clipped_screen_box(portal: &Portal, view: &RenderView) -> Option<Box2> {
    let b = portal.screen_box(&view.camera, view.width, view.height)?;
    let Some(clip) = view.clip_rect else {
        return Some(b);
    };
    let min = b.min.max(clip.min);
    let max = b.max.min(clip.max);
    (min.x < max.x && min.y < max.y).then_some(Box2 { min, max })
}

/// Shifts `projection` so the pixels of `screen_box` land at the origin of
/// a `texture_w` × `texture_h` target.
pub fn portal_projection(
    projection: &Mat4,
    screen_box: &Box2,
    view: &RenderView,
    texture_w: u32,
    texture_h: u32,
) -> Mat4 {
    let (sw, sh) = (view.width as f32, view.height as f32);
    let (rw, rh) = (texture_w as f32, texture_h as f32);
    let shift = Mat4::from_cols(
        Vec4::new(sw / rw, 0.0, 0.0, 0.0),
        Vec4::new(0.0, sh / rh, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(
            (sw - 2.0 * screen_box.min.x) / rw - 1.0,
            (sh - 2.0 * screen_box.min.y) / rh - 1.0,
            0.0,
            1.0,
        ),
    );
    shift * *projection
}

fn portal_vertices(portal: &Portal, camera: &Camera, texture_projection: &Mat4) -> Vec<PortalVertex> {
    let world_to_camera = camera.world_to_camera();
    portal
        .vertices
        .iter()
        .map(|v| {
            let p = world_to_camera.transform_point(*v);
            let clip = *texture_projection * Vec4::from_vec3(p, 1.0);
            PortalVertex {
                position: [p.x, p.y, p.z],
                texcoord: [
                    (clip.x + clip.w) * 0.5,
                    (clip.y + clip.w) * 0.5,
                    0.0,
                    clip.w,
                ],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::layers::RenderLayers;
    use crate::render_lane::setup::StandardContextSetup;
    use crate::render_lane::render_tree::{PersistentData, StandardTreeTraits};
    use crate::testing::{
        camera, material, sector, sector_with, view, ListCuller, RecordingDevice,
    };
    use lumen_core::math::Vec3;
    use lumen_core::renderer::{RenderTargetAttachment, ShaderRegistry};
    use lumen_core::scene::{
        MeshWrapper, MeshWrapperId, PortalContainer, PortalFlags, RenderPriorities,
        RenderPriority,
    };

    fn quad(z: f32, half: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(-half, -half, z),
            Vec3::new(half, -half, z),
            Vec3::new(half, half, z),
            Vec3::new(-half, half, z),
        ]
    }

    fn portal_object(id: u32, portal: Portal) -> Rc<MeshWrapper> {
        let mut wrapper = MeshWrapper::new(MeshWrapperId(id), format!("portal{id}"), RenderPriority(3));
        wrapper.portals = Some(Rc::new(PortalContainer::new(vec![portal])));
        Rc::new(wrapper)
    }

    struct Fixture {
        names: ShaderVarNames,
        registry: ShaderRegistry,
        portals: PortalPersistentData,
    }

    fn fixture() -> Fixture {
        let mut names = ShaderVarNames::new();
        let mut registry = ShaderRegistry::new();
        let shader = registry.register("portal");
        let portals = PortalPersistentData::new(material(shader), TextureFormat::Rgba8, &mut names);
        Fixture {
            names,
            registry,
            portals,
        }
    }

    #[test]
    fn projection_shift_maps_the_box_to_the_texture() {
        let v = view(sector(0), 100, 100);
        let screen_box = Box2 {
            min: Vec2::new(40.0, 40.0),
            max: Vec2::new(60.0, 60.0),
        };
        let projection = portal_projection(&v.camera.projection, &screen_box, &v, 32, 32);
        let shifted = Camera::new(v.camera.transform, projection);
        // The box corners land on pixels (0, 0) and (20, 20) of the texture.
        let corner = shifted
            .project_to_screen(Vec3::new(-1.0, -1.0, -5.0), 32, 32)
            .expect("in front");
        approx::assert_abs_diff_eq!(corner.x, 0.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(corner.y, 0.0, epsilon = 1e-3);
        let corner = shifted
            .project_to_screen(Vec3::new(1.0, 1.0, -5.0), 32, 32)
            .expect("in front");
        approx::assert_abs_diff_eq!(corner.x, 20.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(corner.y, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn simple_portals_follow_their_parent_in_draw_order() {
        let mut f = fixture();
        let device = RecordingDevice::default();
        let beyond = sector_with(1, Rc::new(ListCuller::default()));
        let here = Rc::new(ListCuller::default());
        here.push(portal_object(1, Portal::new("a", Some(beyond.clone()), quad(-5.0, 1.0))));
        here.push(portal_object(2, Portal::new("b", Some(beyond), quad(-5.0, 0.5))));
        let start = sector_with(0, here);

        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut f.names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let root = tree.create_context(view(start, 100, 100), None).expect("ctx");
        let layers = RenderLayers::default();
        let setup = StandardContextSetup::new(&layers, &f.registry, &f.names, &device);
        setup.setup(&mut tree, root, &mut f.portals).expect("setup");

        let order: Vec<_> = tree
            .contexts()
            .map(|c| tree.context(c).expect("ctx").view.sector.name.clone())
            .collect();
        assert_eq!(order, vec!["sector0", "sector1", "sector1"]);
        let second = tree.contexts().nth(1).expect("portal ctx");
        let portal_context = tree.context(second).expect("ctx");
        assert!(portal_context.render_targets.is_screen());
        assert!(portal_context.view.clip_rect.is_some());
        assert_eq!(device.created_texture_count(), 0);
    }

    #[test]
    fn heavy_portals_render_into_a_texture_and_add_a_portal_mesh() {
        let mut f = fixture();
        let device = RecordingDevice::default();
        let beyond = sector_with(1, Rc::new(ListCuller::default()));
        let here = Rc::new(ListCuller::default());
        let mut mirror = Portal::new("mirror", Some(beyond), quad(-5.0, 1.0));
        mirror.flags = PortalFlags::MIRROR;
        here.push(portal_object(1, mirror));

        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut f.names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let root = tree
            .create_context(view(sector_with(0, here), 100, 100), None)
            .expect("ctx");
        let layers = RenderLayers::default();
        let setup = StandardContextSetup::new(&layers, &f.registry, &f.names, &device);
        setup.setup(&mut tree, root, &mut f.portals).expect("setup");

        assert_eq!(tree.context_count(), 2);
        let portal_ctx = tree.contexts().nth(1).expect("portal ctx");
        let portal_context = tree.context(portal_ctx).expect("ctx");
        let texture = portal_context
            .render_targets
            .get(RenderTargetAttachment::Color0)
            .expect("texture target")
            .texture;
        assert!(portal_context.view.camera.mirrored);
        assert_eq!(portal_context.view.width, 20);

        let root_context = tree.context(root).expect("ctx");
        assert_eq!(root_context.total_render_meshes(), 1);
        let node = tree.mesh_nodes(root).next().expect("portal node");
        let node = tree.mesh_node(node).expect("node");
        assert!(node.key.is_portal);
        let mesh = &node.meshes[0];
        assert_eq!(
            mesh.object_to_world.value,
            ShaderValue::Transform(camera().transform)
        );
        assert_eq!(
            mesh.render_mesh
                .variables
                .variable(f.portals.texture_name())
                .map(|v| v.value.clone()),
            Some(ShaderValue::Texture(texture))
        );
        assert_eq!(f.portals.frame_buffers().len(), 1);

        drop(tree);
        f.portals.begin_frame(&device, 1);
        assert!(f.portals.frame_buffers().is_empty());
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn recursion_stops_at_the_sector_visit_limit() {
        let mut f = fixture();
        let device = RecordingDevice::default();
        let culler = Rc::new(ListCuller::default());
        let room = sector_with(0, culler.clone());
        let mut looking_back = Portal::new("loop", Some(room.clone()), quad(-5.0, 1.0));
        looking_back.max_sector_visit = 3;
        culler.push(portal_object(1, looking_back));

        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut f.names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let root = tree.create_context(view(room.clone(), 100, 100), None).expect("ctx");
        let layers = RenderLayers::default();
        let setup = StandardContextSetup::new(&layers, &f.registry, &f.names, &device);
        setup.setup(&mut tree, root, &mut f.portals).expect("setup");

        // The root view counts as one visit.
        assert_eq!(tree.context_count(), 3);
        assert_eq!(room.recursion_level(), 0);
    }
}
