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
use super::VisibilityError;
use crate::render_lane::render_tree::{
    ContextHandle, MeshTemplate, PortalHolder, RenderTree, TreeError, TreeTraits,
};
use lumen_core::scene::{MeshWrapper, VisCallback};
use std::rc::Rc;

/// A [`VisCallback`] adding every reported object to one context.
///
/// Portal objects are registered as portal holders; any other object has
/// each of its render meshes added at the object's render priority.
#[derive(Debug)]
pub struct VisibilityCollector<'t, 'p, T: TreeTraits> {
    tree: &'t mut RenderTree<'p, T>,
    ctx: ContextHandle<T>,
    added: usize,
    error: Option<TreeError>,
}

impl<'t, 'p, T: TreeTraits> VisibilityCollector<'t, 'p, T> {
    /// A collector filling `ctx`.
    pub fn new(tree: &'t mut RenderTree<'p, T>, ctx: ContextHandle<T>) -> Self {
        Self {
            tree,
            ctx,
            added: 0,
            error: None,
        }
    }

    /// Number of render meshes added so far.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Ends collection, reporting the first error met.
    pub fn finish(self) -> Result<usize, TreeError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.added),
        }
    }

    fn add_object(&mut self, mesh: &Rc<MeshWrapper>) -> Result<(), TreeError> {
        if let Some(container) = &mesh.portals {
            return self.tree.add_portal(
                self.ctx,
                PortalHolder {
                    container: container.clone(),
                    mesh_wrapper: mesh.clone(),
                },
            );
        }
        let template = MeshTemplate::for_wrapper(mesh.clone());
        for render_mesh in &mesh.render_meshes {
            self.tree.add_render_mesh(
                self.ctx,
                render_mesh.clone(),
                mesh.render_priority,
                &template,
            )?;
            self.added += 1;
        }
        Ok(())
    }
}

impl<T: TreeTraits> VisCallback for VisibilityCollector<'_, '_, T> {
    fn object_visible(&mut self, mesh: &Rc<MeshWrapper>, _frustum_mask: u32) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.add_object(mesh) {
            log::error!("VisibilityCollector: cannot add '{}': {e}", mesh.name);
            self.error = Some(e);
        }
    }
}

/// Runs the visibility test of the context's sector and adds everything
/// reported to the context. Returns the number of render meshes added.
pub fn collect_visible<T: TreeTraits>(
    tree: &mut RenderTree<'_, T>,
    ctx: ContextHandle<T>,
) -> Result<usize, VisibilityError> {
    let view = tree
        .context(ctx)
        .ok_or(TreeError::ContextNotPresent)?
        .view
        .clone();
    let culler = view.sector.culler().clone();
    let mut collector = VisibilityCollector::new(tree, ctx);
    if !culler.vis_test(&view, &mut collector, view.width, view.height) {
        return Err(VisibilityError::CullerFailed(view.sector.name.clone()));
    }
    let added = collector.finish()?;
    log::trace!(
        "VisibilityCollector: {added} meshes visible in '{}'",
        view.sector.name
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::render_tree::{PersistentData, StandardTreeTraits};
    use crate::testing::{material, mesh_wrapper, render_mesh, sector_with, view, ListCuller};
    use lumen_core::math::Vec3;
    use lumen_core::renderer::{ShaderId, ShaderVarNames};
    use lumen_core::scene::{
        MeshWrapperId, Portal, PortalContainer, RenderPriorities, RenderPriority,
    };

    #[test]
    fn meshes_and_portals_land_in_the_context() {
        let culler = Rc::new(ListCuller::default());
        let shader = ShaderId(0);
        let mut wall = mesh_wrapper(
            1,
            RenderPriority(4),
            Vec3::new(0.0, 0.0, -3.0),
            render_mesh(1, material(shader)),
        );
        wall.render_meshes.push(render_mesh(2, material(shader)));
        culler.push(Rc::new(wall));

        let mut hidden = mesh_wrapper(
            2,
            RenderPriority(4),
            Vec3::ZERO,
            render_mesh(3, material(shader)),
        );
        hidden.invisible = true;
        culler.push(Rc::new(hidden));

        let mut door = MeshWrapper::new(MeshWrapperId(3), "door", RenderPriority(3));
        door.portals = Some(Rc::new(PortalContainer::new(vec![Portal::new(
            "door",
            None,
            Vec::new(),
        )])));
        culler.push(Rc::new(door));

        let mut names = ShaderVarNames::new();
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree
            .create_context(view(sector_with(0, culler), 64, 64), None)
            .expect("ctx");

        assert_eq!(collect_visible(&mut tree, ctx), Ok(2));
        let context = tree.context(ctx).expect("ctx");
        assert_eq!(context.total_render_meshes(), 2);
        assert_eq!(context.mesh_node_count(), 1);
        assert_eq!(context.portals.len(), 1);
        assert_eq!(context.portals[0].mesh_wrapper.name, "door");
    }
}
