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
//! Render layers and per-context shader setup.
//!
//! A context is drawn in one or more layers. Each layer names the shader
//! types it draws with; a mesh is drawn in a layer with the first of its
//! material's shaders matching those types, or with the layer's default
//! shader. Shader setup fills a context's SV array and its shader and ticket
//! arrays for every (layer, mesh) pair.

use super::operations::for_each_single_mesh;
use super::render_tree::{
    ContextHandle, MeshNode, RenderTree, SingleMesh, TreeError, TreeTraits,
};
use lumen_core::renderer::{
    Material, ShaderId, ShaderRegistry, ShaderTicket, ShaderVarNames, SHADER_TYPE_STANDARD,
};

/// One render layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayer {
    shader_types: Vec<String>,
    default_shader: Option<ShaderId>,
}

impl RenderLayer {
    /// A layer drawing with the given shader types, in lookup order.
    pub fn new<S: Into<String>>(shader_types: impl IntoIterator<Item = S>) -> Self {
        Self {
            shader_types: shader_types.into_iter().map(Into::into).collect(),
            default_shader: None,
        }
    }

    /// Sets the shader used by materials matching none of the shader types.
    #[must_use]
    pub fn with_default_shader(mut self, shader: ShaderId) -> Self {
        self.default_shader = Some(shader);
        self
    }

    /// The shader types, in lookup order.
    pub fn shader_types(&self) -> &[String] {
        &self.shader_types
    }

    /// The fallback shader.
    pub fn default_shader(&self) -> Option<ShaderId> {
        self.default_shader
    }

    /// The shader a material is drawn with in this layer.
    pub fn shader_for(&self, material: &Material) -> Option<ShaderId> {
        self.shader_types
            .iter()
            .find_map(|t| material.shader(t))
            .or(self.default_shader)
    }
}

/// An ordered set of render layers.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayers {
    layers: Vec<RenderLayer>,
}

impl RenderLayers {
    /// An empty layer set.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// A set holding a single layer.
    pub fn single(layer: RenderLayer) -> Self {
        Self {
            layers: vec![layer],
        }
    }

    /// Appends a layer.
    pub fn add_layer(&mut self, layer: RenderLayer) {
        self.layers.push(layer);
    }

    /// The number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` when there are no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// A layer by index.
    pub fn get(&self, layer: usize) -> Option<&RenderLayer> {
        self.layers.get(layer)
    }

    /// The layers in order.
    pub fn iter(&self) -> impl Iterator<Item = &RenderLayer> {
        self.layers.iter()
    }
}

impl Default for RenderLayers {
    /// A single layer drawing with the `standard` shader type.
    fn default() -> Self {
        Self::single(RenderLayer::new([SHADER_TYPE_STANDARD]))
    }
}

/// Assigns shaders to the meshes of a context.
pub trait ContextShaderSetup<T: TreeTraits> {
    /// Fills the SV array, shader array and ticket array of `ctx`.
    fn setup_shaders(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        registry: &ShaderRegistry,
        names: &ShaderVarNames,
    ) -> Result<(), TreeError>;
}

impl<T: TreeTraits> ContextShaderSetup<T> for RenderLayers {
    fn setup_shaders(
        &self,
        tree: &mut RenderTree<'_, T>,
        ctx: ContextHandle<T>,
        registry: &ShaderRegistry,
        names: &ShaderVarNames,
    ) -> Result<(), TreeError> {
        setup_sv_array(tree, ctx, self.len(), names)?;
        setup_standard_shaders(tree, ctx, self, registry)
    }
}

/// Sizes the SV array of `ctx` and fills layer 0 with each mesh's stack,
/// then copies layer 0 into the other layers.
///
/// A mesh's stack holds, from lowest to highest precedence, the sector
/// variables, the material variables, the render mesh variables and the
/// object-to-world transform.
pub fn setup_sv_array<T: TreeTraits>(
    tree: &mut RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    layer_count: usize,
    names: &ShaderVarNames,
) -> Result<(), TreeError> {
    let mut meshes = Vec::new();
    for_each_single_mesh(tree, ctx, |_, mesh| {
        meshes.push((
            mesh.context_local_id,
            mesh.render_mesh.clone(),
            mesh.object_to_world.clone(),
        ));
    });

    let context = tree.context_mut(ctx).ok_or(TreeError::ContextNotPresent)?;
    let sector = context.view.sector.clone();
    let total = context.total_render_meshes();
    let holder = &mut context.sv_array;
    holder.setup(layer_count.max(1), names.len(), total)?;
    for (id, render_mesh, object_to_world) in meshes {
        let stack = holder.sv_stack_mut(0, id)?;
        sector.variables.push_variables(stack);
        render_mesh.material.variables.push_variables(stack);
        render_mesh.variables.push_variables(stack);
        if let Some(slot) = stack.get_mut(object_to_world.name.index()) {
            *slot = Some(object_to_world);
        }
    }
    holder.replicate_layer_zero();
    Ok(())
}

/// Fills the shader and ticket arrays of `ctx` for `layer_count` layers,
/// asking `pick` for the shader of each (layer, mesh) pair.
///
/// Tickets are chosen against the mesh's stack of that layer when the SV
/// array is set up.
pub fn setup_shaders_with<T: TreeTraits>(
    tree: &mut RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    layer_count: usize,
    registry: &ShaderRegistry,
    mut pick: impl FnMut(usize, &MeshNode<T>, &SingleMesh<T>) -> Option<ShaderId>,
) -> Result<(), TreeError> {
    let total = tree
        .context(ctx)
        .ok_or(TreeError::ContextNotPresent)?
        .total_render_meshes();
    let mut shaders = vec![None; layer_count * total];
    for_each_single_mesh(tree, ctx, |node, mesh| {
        for layer in 0..layer_count {
            shaders[layer * total + mesh.context_local_id] = pick(layer, node, mesh);
        }
    });

    let context = tree.context_mut(ctx).ok_or(TreeError::ContextNotPresent)?;
    let mut tickets = Vec::with_capacity(shaders.len());
    for (index, shader) in shaders.iter().enumerate() {
        let ticket = match shader {
            Some(shader) if context.sv_array.is_setup() => {
                let stack = context.sv_array.sv_stack(index / total, index % total)?;
                registry.ticket(*shader, stack)
            }
            Some(shader) => registry.ticket(*shader, &[]),
            None => ShaderTicket::default(),
        };
        tickets.push(ticket);
    }
    context.shader_array = shaders;
    context.ticket_array = tickets;
    Ok(())
}

/// Picks each mesh's shader from its material through `layers`.
pub fn setup_standard_shaders<T: TreeTraits>(
    tree: &mut RenderTree<'_, T>,
    ctx: ContextHandle<T>,
    layers: &RenderLayers,
    registry: &ShaderRegistry,
) -> Result<(), TreeError> {
    setup_shaders_with(tree, ctx, layers.len(), registry, |layer, _, mesh| {
        layers
            .get(layer)
            .and_then(|l| l.shader_for(&mesh.render_mesh.material))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::render_tree::{MeshTemplate, PersistentData, StandardTreeTraits};
    use crate::testing::{material, mesh_wrapper, render_mesh, sector, view};
    use lumen_core::math::Vec3;
    use lumen_core::renderer::{ShaderTechnique, ShaderValue, ShaderVariable};
    use lumen_core::scene::{RenderPriorities, RenderPriority};
    use std::rc::Rc;

    #[test]
    fn materials_pick_the_first_matching_shader_type() {
        let mut registry = ShaderRegistry::new();
        let fill = registry.register("fill");
        let fallback = registry.register("fallback");
        let m = Material::new("m").with_shader("b", fill);
        let layer = RenderLayer::new(["a", "b"]).with_default_shader(fallback);
        assert_eq!(layer.shader_for(&m), Some(fill));
        assert_eq!(layer.shader_for(&Material::new("bare")), Some(fallback));
        assert_eq!(RenderLayer::new(["a"]).shader_for(&m), None);
    }

    #[test]
    fn shader_arrays_cover_every_layer_and_mesh() {
        let mut names = ShaderVarNames::new();
        let tint = names.intern("tint");
        let mut registry = ShaderRegistry::new();
        let lit = registry.register_with_techniques(
            "lit",
            vec![
                ShaderTechnique {
                    passes: 2,
                    requires: vec![tint],
                },
                ShaderTechnique::default(),
            ],
        );
        let depth = registry.register("depth");

        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree.create_context(view(sector(0), 64, 64), None).expect("ctx");

        let mut tinted = Material::new("tinted").with_shader(SHADER_TYPE_STANDARD, lit);
        tinted
            .variables
            .add_variable(ShaderVariable::new(tint, ShaderValue::Float(0.5)));
        let meshes = [
            render_mesh(1, Rc::new(tinted)),
            render_mesh(2, material(lit)),
            render_mesh(3, material(lit)),
        ];
        for (i, m) in meshes.iter().enumerate() {
            let wrapper = Rc::new(mesh_wrapper(
                i as u32,
                RenderPriority(4),
                Vec3::ZERO,
                m.clone(),
            ));
            let template = MeshTemplate::for_wrapper(wrapper);
            tree.add_render_mesh(ctx, m.clone(), RenderPriority(4), &template)
                .expect("add");
        }

        let mut layers = RenderLayers::new();
        layers.add_layer(RenderLayer::new(["depthonly"]).with_default_shader(depth));
        layers.add_layer(RenderLayer::new([SHADER_TYPE_STANDARD]));
        layers
            .setup_shaders(&mut tree, ctx, &registry, &names)
            .expect("setup");

        let context = tree.context(ctx).expect("ctx");
        assert_eq!(context.total_render_meshes(), 3);
        assert_eq!(context.shader_array.len(), 3 * 2);
        assert_eq!(context.layer_count(), 2);
        assert_eq!(context.shader_for(0, 1), Some((depth, ShaderTicket(0))));
        assert_eq!(context.shader_for(1, 0), Some((lit, ShaderTicket(0))));
        assert_eq!(context.shader_for(1, 2), Some((lit, ShaderTicket(1))));

        let o2w = tree.persistent().object_to_world_name();
        let stack = context.sv_array.sv_stack(1, 0).expect("stack");
        assert!(stack[o2w.index()].is_some());
        assert!(stack[tint.index()].is_some());
    }

    #[test]
    fn contexts_without_meshes_set_up_every_layer() {
        let mut names = ShaderVarNames::new();
        let mut registry = ShaderRegistry::new();
        let depth = registry.register("depth");
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree.create_context(view(sector(0), 8, 8), None).expect("ctx");

        let mut layers = RenderLayers::new();
        layers.add_layer(RenderLayer::new(["depthonly"]).with_default_shader(depth));
        layers.add_layer(RenderLayer::new([SHADER_TYPE_STANDARD]));
        layers
            .setup_shaders(&mut tree, ctx, &registry, &names)
            .expect("setup");

        let context = tree.context(ctx).expect("ctx");
        assert_eq!(context.total_render_meshes(), 0);
        assert!(context.shader_array.is_empty());
        assert!(context.ticket_array.is_empty());
        assert!(context.sv_array.is_setup());
    }

    #[test]
    fn setting_up_twice_is_rejected() {
        let mut names = ShaderVarNames::new();
        let mut persistent = PersistentData::new(
            StandardTreeTraits,
            Rc::new(RenderPriorities::default()),
            &mut names,
        );
        let mut tree = RenderTree::new(&mut persistent);
        let ctx = tree.create_context(view(sector(0), 8, 8), None).expect("ctx");
        setup_sv_array(&mut tree, ctx, 1, &names).expect("first");
        assert!(matches!(
            setup_sv_array(&mut tree, ctx, 1, &names),
            Err(TreeError::SvArray(_))
        ));
    }
}
