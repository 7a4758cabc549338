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
use super::portal::{PortalPersistentData, StandardPortalSetup};
use super::SetupError;
use crate::render_lane::layers::ContextShaderSetup;
use crate::render_lane::render_tree::{ContextHandle, RenderTree, TreeError, TreeTraits};
use crate::render_lane::visibility::collect_visible;
use lumen_core::renderer::{GraphicsDevice, ShaderRegistry, ShaderVarNames};

/// How deep portal setup may recurse before contexts are left empty.
pub const DEFAULT_RECURSION_LIMIT: u32 = 30;

/// State carried through the setup of a context and the contexts seen
/// through its portals.
#[derive(Debug)]
pub struct ContextSetupData<T: TreeTraits> {
    /// Simple portal contexts are inserted after this context.
    pub last_simple_portal_ctx: ContextHandle<T>,
    /// Portal nesting depth.
    pub depth: u32,
}

impl<T: TreeTraits> ContextSetupData<T> {
    /// Setup data for a top-level context.
    pub fn new(ctx: ContextHandle<T>) -> Self {
        Self {
            last_simple_portal_ctx: ctx,
            depth: 0,
        }
    }
}

/// Fills a context of the render tree.
pub trait ContextSetup<T: TreeTraits> {
    /// Sets up `ctx` and every context reached through its portals.
    fn setup_context(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        data: &mut ContextSetupData<T>,
        portals: &mut PortalPersistentData,
    ) -> Result<(), SetupError>;
}

/// The standard context setup: visibility collection, portal recursion,
/// mesh sorting, then SV and shader setup through `S`.
pub struct StandardContextSetup<'a, S> {
    shader_setup: &'a S,
    registry: &'a ShaderRegistry,
    names: &'a ShaderVarNames,
    device: &'a dyn GraphicsDevice,
    recursion_limit: u32,
}

impl<'a, S> StandardContextSetup<'a, S> {
    /// Creates a setup with the default recursion limit.
    pub fn new(
        shader_setup: &'a S,
        registry: &'a ShaderRegistry,
        names: &'a ShaderVarNames,
        device: &'a dyn GraphicsDevice,
    ) -> Self {
        Self {
            shader_setup,
            registry,
            names,
            device,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Caps the portal nesting depth.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets up a top-level context. The sector of its view counts as
    /// visited while its portals are set up.
    pub fn setup<T: TreeTraits>(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        portals: &mut PortalPersistentData,
    ) -> Result<(), SetupError>
    where
        S: ContextShaderSetup<T>,
    {
        let sector = tree
            .context(ctx)
            .ok_or(TreeError::ContextNotPresent)?
            .view
            .sector
            .clone();
        sector.increment_recursion_level();
        let mut data = ContextSetupData::new(ctx);
        let result = self.setup_context(tree, ctx, &mut data, portals);
        sector.decrement_recursion_level();
        result
    }
}

impl<T: TreeTraits, S: ContextShaderSetup<T>> ContextSetup<T> for StandardContextSetup<'_, S> {
    fn setup_context(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        data: &mut ContextSetupData<T>,
        portals: &mut PortalPersistentData,
    ) -> Result<(), SetupError> {
        if data.depth > self.recursion_limit {
            log::warn!(
                "ContextSetup: portal recursion deeper than {}, context left empty",
                self.recursion_limit
            );
            return Ok(());
        }
        collect_visible(tree, ctx)?;
        StandardPortalSetup::new(self.device).setup(tree, ctx, data, portals, self)?;
        tree.sort_meshes(ctx)?;
        self.shader_setup
            .setup_shaders(tree, ctx, self.registry, self.names)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::layers::RenderLayers;
    use crate::render_lane::render_tree::{PersistentData, StandardTreeTraits};
    use crate::testing::{
        material, mesh_wrapper, render_mesh, sector_with, view, ListCuller, RecordingDevice,
    };
    use lumen_core::math::Vec3;
    use lumen_core::renderer::TextureFormat;
    use lumen_core::scene::{
        MeshWrapper, MeshWrapperId, Portal, PortalContainer, RenderPriorities, RenderPriority,
    };
    use std::rc::Rc;

    #[test]
    fn contexts_get_meshes_sorted_and_shaders() {
        let mut names = ShaderVarNames::new();
        let mut registry = ShaderRegistry::new();
        let shader = registry.register("lit");
        let mut portals =
            PortalPersistentData::new(material(shader), TextureFormat::Rgba8, &mut names);
        let device = RecordingDevice::default();

        let culler = Rc::new(ListCuller::default());
        for (id, z) in [(1, -2.0), (2, -8.0), (3, -4.0)] {
            culler.push(Rc::new(mesh_wrapper(
                id,
                RenderPriority(8),
                Vec3::new(0.0, 0.0, z),
                render_mesh(id as usize, material(shader)),
            )));
        }
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree
            .create_context(view(sector_with(0, culler), 64, 64), None)
            .expect("ctx");
        let layers = RenderLayers::default();
        StandardContextSetup::new(&layers, &registry, &names, &device)
            .setup(&mut tree, ctx, &mut portals)
            .expect("setup");

        let node = tree.mesh_nodes(ctx).next().expect("node");
        let order: Vec<_> = tree
            .mesh_node(node)
            .expect("node")
            .meshes
            .iter()
            .map(|m| m.mesh_wrapper.id.0)
            .collect();
        // "transp" sorts back to front.
        assert_eq!(order, vec![2, 3, 1]);
        let context = tree.context(ctx).expect("ctx");
        assert_eq!(context.layer_count(), 1);
        assert!(context.sv_array.is_setup());
        assert_eq!(context.shader_for(0, 0).map(|(s, _)| s), Some(shader));
    }

    #[test]
    fn recursion_depth_is_capped() {
        let mut names = ShaderVarNames::new();
        let registry = ShaderRegistry::new();
        let mut portals = PortalPersistentData::new(
            material(lumen_core::renderer::ShaderId(0)),
            TextureFormat::Rgba8,
            &mut names,
        );
        let device = RecordingDevice::default();

        let culler = Rc::new(ListCuller::default());
        let hall = sector_with(0, culler.clone());
        let mut endless = Portal::new(
            "endless",
            Some(hall.clone()),
            vec![
                Vec3::new(-1.0, -1.0, -5.0),
                Vec3::new(1.0, -1.0, -5.0),
                Vec3::new(1.0, 1.0, -5.0),
                Vec3::new(-1.0, 1.0, -5.0),
            ],
        );
        endless.max_sector_visit = 100;
        let mut wrapper = MeshWrapper::new(MeshWrapperId(1), "mirror hall", RenderPriority(3));
        wrapper.portals = Some(Rc::new(PortalContainer::new(vec![endless])));
        culler.push(Rc::new(wrapper));

        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree.create_context(view(hall.clone(), 64, 64), None).expect("ctx");
        let layers = RenderLayers::default();
        StandardContextSetup::new(&layers, &registry, &names, &device)
            .with_recursion_limit(4)
            .setup(&mut tree, ctx, &mut portals)
            .expect("setup");

        assert_eq!(tree.context_count(), 6);
        assert_eq!(hall.recursion_level(), 0);
    }
}
