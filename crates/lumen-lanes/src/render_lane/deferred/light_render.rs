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

//! Light accumulation from the G-buffer.
//!
//! Every light is drawn as a bounding volume (a sphere for point lights, a
//! cone for spot lights and a box for directional lights) whose shader reads
//! the G-buffer and adds the light's contribution to the accumulation
//! buffer. When the camera is inside a volume, its back faces are drawn
//! instead of its front faces.

use super::gbuffer::GBuffer;
use super::DeferredError;
use crate::render_lane::draw::{resolve_variables, FullscreenQuad};
use lumen_core::math::{LinearRgba, Mat3, Transform, Vec2, Vec3, EPSILON};
use lumen_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CullMode, DrawCall, GraphicsDevice, Light,
    LightKind, MixMode, RenderPass, ShaderId, ShaderRegistry, ShaderValue, ShaderVarContext,
    ShaderVarName, ShaderVarNames, ShaderVarRef, ShaderVariable, ZBufMode,
};
use lumen_core::scene::Camera;
use std::borrow::Cow;
use std::f32::consts::{PI, TAU};

/// Shader drawing point light volumes.
pub const POINT_LIGHT_SHADER: &str = "deferred_point_light";
/// Shader drawing spot light volumes.
pub const SPOT_LIGHT_SHADER: &str = "deferred_spot_light";
/// Shader drawing directional light volumes.
pub const DIRECTIONAL_LIGHT_SHADER: &str = "deferred_directional_light";
/// Shader writing the ambient term.
pub const AMBIENT_LIGHT_SHADER: &str = "deferred_ambient_light";
/// Shader outlining light volumes for debugging.
pub const LIGHT_VOLUME_SHADER: &str = "deferred_light_volume";

/// Given the cosine of an angle, returns the cosine of half that angle.
#[inline]
pub fn cosine_half_angle(c: f32) -> f32 {
    ((1.0 + c) / 2.0).sqrt()
}

/// The transform mapping the unit volume of `light` onto its area of
/// influence.
///
/// The unit volumes are a sphere of radius 1 at the origin (point lights), a
/// cone of height and base radius 1 along +Y with its base centered at the
/// origin (spot lights) and the box from -1 to 1 (directional lights).
/// Returns `None` for spot lights whose cone cannot be bounded.
pub fn light_volume_transform(light: &Light) -> Option<Transform> {
    let range = light.cutoff_distance;
    match light.kind {
        LightKind::Point => Some(
            Transform::from_translation(light.position())
                * Transform::from_scale(Vec3::ONE * range),
        ),
        LightKind::Spot { outer, .. } => {
            if outer <= EPSILON {
                return None;
            }
            // Base radius of a cone of height `range` and half angle acos(outer).
            let r = (range / outer) * (1.0 - outer * outer).max(0.0).sqrt();
            let cone = Transform::try_new(
                Mat3::from_cols(
                    Vec3::new(r, 0.0, 0.0),
                    Vec3::new(0.0, 0.0, -range),
                    Vec3::new(0.0, r, 0.0),
                ),
                Vec3::new(0.0, 0.0, range),
            )?;
            Some(light.transform * cone)
        }
        LightKind::Directional { cutoff_radius } => Some(
            light.transform
                * Transform::from_scale(Vec3::new(cutoff_radius, cutoff_radius, range)),
        ),
    }
}

/// Returns `true` when `p` lies inside the area of influence of `light`.
pub fn is_point_inside_light(p: Vec3, light: &Light) -> bool {
    let range = light.cutoff_distance;
    match light.kind {
        LightKind::Point => (p - light.position()).length_squared() <= range * range,
        LightKind::Spot { outer, .. } => {
            let u = p - light.position();
            let along = u.dot(light.direction());
            if along <= 0.0 || along >= range {
                return false;
            }
            along / u.length() >= outer
        }
        LightKind::Directional { .. } => match light_volume_transform(light) {
            Some(volume) => {
                let local = volume.inverse_transform_point(p);
                local.x.abs() <= 1.0 && local.y.abs() <= 1.0 && local.z.abs() <= 1.0
            }
            None => false,
        },
    }
}

/// Per-light parameters uploaded for the light shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniforms {
    /// Linear color, alpha unused.
    pub color: [f32; 4],
    /// View-space position, `w = 1`.
    pub position_view: [f32; 4],
    /// View-space direction, `w = 0`.
    pub direction_view: [f32; 4],
    /// Cutoff distance, inner and outer falloff cosines, light kind.
    pub attenuation: [f32; 4],
}

impl LightUniforms {
    fn new(light: &Light, world_to_camera: &Transform) -> Self {
        let position = world_to_camera.transform_point(light.position());
        let direction = world_to_camera
            .transform_direction(light.direction())
            .normalize();
        let (inner, outer, kind) = match light.kind {
            LightKind::Point => (-1.0, -1.0, 0.0),
            LightKind::Spot { inner, outer } => (inner, outer, 1.0),
            LightKind::Directional { .. } => (1.0, 1.0, 2.0),
        };
        Self {
            color: [light.color.r, light.color.g, light.color.b, light.color.a],
            position_view: [position.x, position.y, position.z, 1.0],
            direction_view: [direction.x, direction.y, direction.z, 0.0],
            attenuation: [light.cutoff_distance, inner, outer, kind],
        }
    }
}

/// Tesselation of the light volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightRenderConfig {
    /// Slices and stacks of the point light sphere.
    pub sphere_detail: u32,
    /// Segments of the spot light cone.
    pub cone_detail: u32,
}

impl Default for LightRenderConfig {
    fn default() -> Self {
        Self {
            sphere_detail: 32,
            cone_detail: 32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LightVarNames {
    position_view: ShaderVarName,
    direction_view: ShaderVarName,
    parameters: ShaderVarName,
    ambient: ShaderVarName,
}

/// Light renderer state kept across frames: the volume meshes, the light
/// shaders and the uniform buffers of the current frame.
#[derive(Debug)]
pub struct LightRenderData {
    sphere: BufferId,
    cone: BufferId,
    cube: BufferId,
    point_shader: ShaderId,
    spot_shader: ShaderId,
    directional_shader: ShaderId,
    ambient_shader: ShaderId,
    volume_shader: ShaderId,
    ambient_quad: Option<FullscreenQuad>,
    names: LightVarNames,
    frame_buffers: Vec<BufferId>,
}

fn find_shader(registry: &mut ShaderRegistry, name: &str) -> ShaderId {
    registry.find(name).unwrap_or_else(|| {
        log::warn!("LightRenderData: shader '{name}' is not loaded, registering a placeholder");
        registry.register(name)
    })
}

fn upload(
    device: &dyn GraphicsDevice,
    label: &'static str,
    vertices: &[[f32; 3]],
) -> Result<BufferId, DeferredError> {
    let data: &[u8] = bytemuck::cast_slice(vertices);
    Ok(device.create_buffer_with_data(
        &BufferDescriptor {
            label: Some(Cow::Borrowed(label)),
            size: data.len() as u64,
            usage: BufferUsage::VERTEX,
        },
        data,
    )?)
}

impl LightRenderData {
    /// Builds the volume meshes and looks the light shaders up.
    pub fn new(
        device: &dyn GraphicsDevice,
        registry: &mut ShaderRegistry,
        names: &mut ShaderVarNames,
        config: LightRenderConfig,
    ) -> Result<Self, DeferredError> {
        let sphere = upload(device, "Light Sphere", &sphere_vertices(config.sphere_detail))?;
        let cone = upload(device, "Light Cone", &cone_vertices(config.cone_detail))?;
        let cube = upload(device, "Light Box", &box_vertices())?;
        Ok(Self {
            sphere,
            cone,
            cube,
            point_shader: find_shader(registry, POINT_LIGHT_SHADER),
            spot_shader: find_shader(registry, SPOT_LIGHT_SHADER),
            directional_shader: find_shader(registry, DIRECTIONAL_LIGHT_SHADER),
            ambient_shader: find_shader(registry, AMBIENT_LIGHT_SHADER),
            volume_shader: find_shader(registry, LIGHT_VOLUME_SHADER),
            ambient_quad: None,
            names: LightVarNames {
                position_view: names.intern("light position view"),
                direction_view: names.intern("light direction view"),
                parameters: names.intern("light parameters"),
                ambient: names.intern("light ambient"),
            },
            frame_buffers: Vec::new(),
        })
    }

    /// Frees the uniform buffers of the previous frame.
    pub fn begin_frame(&mut self, device: &dyn GraphicsDevice) {
        for id in self.frame_buffers.drain(..) {
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("LightRenderData: failed to release {id:?}: {e}");
            }
        }
    }

    /// Uniform buffers uploaded this frame.
    pub fn frame_buffers(&self) -> &[BufferId] {
        &self.frame_buffers
    }

    fn volume(&self, kind: &LightKind) -> (BufferId, ShaderId) {
        match kind {
            LightKind::Point => (self.sphere, self.point_shader),
            LightKind::Spot { .. } => (self.cone, self.spot_shader),
            LightKind::Directional { .. } => (self.cube, self.directional_shader),
        }
    }

    fn ambient_quad(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<&FullscreenQuad, DeferredError> {
        if self.ambient_quad.as_ref().map(FullscreenQuad::size) != Some((width, height)) {
            if let Some(old) = self.ambient_quad.take() {
                old.destroy(device);
            }
            let quad = FullscreenQuad::new(device, width, height, Vec2::ONE, Vec2::ZERO)?;
            self.ambient_quad = Some(quad);
        }
        self.ambient_quad
            .as_ref()
            .ok_or(DeferredError::NotInitialized("ambient quad"))
    }

    /// Releases every buffer.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        self.begin_frame(device);
        if let Some(quad) = self.ambient_quad.take() {
            quad.destroy(device);
        }
        for id in [self.sphere, self.cone, self.cube] {
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("LightRenderData: failed to release {id:?}: {e}");
            }
        }
    }
}

/// Draws the lights of one stack of contexts into an open accumulation pass.
///
/// Usage: output the ambient term once, set the camera of the context whose
/// lights are drawn, then render each light.
pub struct DeferredLightRenderer<'a> {
    device: &'a dyn GraphicsDevice,
    data: &'a mut LightRenderData,
    registry: &'a ShaderRegistry,
    gbuffer_vars: Vec<ShaderVarRef>,
    world_to_camera: Transform,
    camera_position: Vec3,
    mirrored: bool,
}

impl<'a> DeferredLightRenderer<'a> {
    /// A renderer reading `gbuffer`.
    pub fn new(
        device: &'a dyn GraphicsDevice,
        data: &'a mut LightRenderData,
        registry: &'a ShaderRegistry,
        gbuffer: &GBuffer,
    ) -> Self {
        let mut vars = ShaderVarContext::new();
        gbuffer.update_shader_vars(&mut vars);
        Self {
            device,
            data,
            registry,
            gbuffer_vars: vars.iter().cloned().collect(),
            world_to_camera: Transform::IDENTITY,
            camera_position: Vec3::ZERO,
            mirrored: false,
        }
    }

    /// Uses `camera` for the view-space light variables and inside tests.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.world_to_camera = camera.world_to_camera();
        self.camera_position = camera.position();
        self.mirrored = camera.mirrored;
    }

    /// Writes `ambient` over a `width` × `height` target. Leaves the pass
    /// camera in screen space.
    pub fn output_ambient_light(
        &mut self,
        pass: &mut dyn RenderPass,
        ambient: LinearRgba,
        width: u32,
        height: u32,
    ) -> Result<usize, DeferredError> {
        let shader = self.data.ambient_shader;
        let mut vars = self.gbuffer_vars.clone();
        vars.push(ShaderVariable::new(
            self.data.names.ambient,
            ShaderValue::Vec3(ambient.to_vec3()),
        ));
        let quad = self.data.ambient_quad(self.device, width, height)?;
        quad.draw(pass, shader, MixMode::Copy, vars);
        Ok(1)
    }

    fn light_variables(&mut self, light: &Light) -> Result<Vec<ShaderVarRef>, DeferredError> {
        let uniforms = LightUniforms::new(light, &self.world_to_camera);
        let data = bytemuck::bytes_of(&uniforms);
        let buffer = self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("Light Uniforms")),
                size: data.len() as u64,
                usage: BufferUsage::UNIFORM,
            },
            data,
        )?;
        self.data.frame_buffers.push(buffer);

        let names = self.data.names;
        let mut vars = vec![ShaderVariable::new(
            names.parameters,
            ShaderValue::Buffer(buffer),
        )];
        let position = &uniforms.position_view;
        let direction = &uniforms.direction_view;
        if matches!(light.kind, LightKind::Point | LightKind::Spot { .. }) {
            vars.push(ShaderVariable::new(
                names.position_view,
                ShaderValue::Vec3(Vec3::new(position[0], position[1], position[2])),
            ));
        }
        if matches!(light.kind, LightKind::Directional { .. } | LightKind::Spot { .. }) {
            vars.push(ShaderVariable::new(
                names.direction_view,
                ShaderValue::Vec3(Vec3::new(direction[0], direction[1], direction[2])),
            ));
        }
        Ok(vars)
    }

    /// Adds the contribution of `light`. `sector_vars` are bound below the
    /// G-buffer and light variables, `shadow_vars` above them. Returns the
    /// number of draw calls.
    pub fn render_light(
        &mut self,
        pass: &mut dyn RenderPass,
        light: &Light,
        sector_vars: &ShaderVarContext,
        shadow_vars: &[ShaderVarRef],
    ) -> Result<usize, DeferredError> {
        let Some(volume) = light_volume_transform(light) else {
            log::debug!("DeferredLightRenderer: skipping unbounded light volume");
            return Ok(0);
        };
        let inside = is_point_inside_light(self.camera_position, light);
        let mut cull_mode = if inside {
            CullMode::Reverse
        } else {
            CullMode::Normal
        };
        if self.mirrored {
            cull_mode = cull_mode.flipped();
        }
        let z_mode = if inside { ZBufMode::None } else { ZBufMode::Test };

        let mut extra = self.gbuffer_vars.clone();
        extra.extend(self.light_variables(light)?);
        extra.extend(shadow_vars.iter().cloned());
        let base: Vec<_> = sector_vars.iter().cloned().map(Some).collect();
        let variables = resolve_variables(&base, &extra);

        let (geometry, shader) = self.data.volume(&light.kind);
        let ticket = self.registry.ticket(shader, &[]);
        let passes = self.registry.num_passes(shader, ticket);
        for shader_pass in 0..passes {
            pass.draw_mesh(&DrawCall {
                geometry,
                shader,
                ticket,
                pass: shader_pass,
                object_to_world: volume,
                z_mode,
                // Lights must not overwrite each other.
                mix_mode: MixMode::Add,
                cull_mode,
                variables: variables.clone(),
            });
        }
        Ok(passes as usize)
    }

    /// Outlines the volume of `light` for debugging.
    pub fn render_light_volume(&mut self, pass: &mut dyn RenderPass, light: &Light) -> usize {
        let Some(volume) = light_volume_transform(light) else {
            return 0;
        };
        let (geometry, _) = self.data.volume(&light.kind);
        pass.draw_mesh(&DrawCall {
            geometry,
            shader: self.data.volume_shader,
            ticket: Default::default(),
            pass: 0,
            object_to_world: volume,
            z_mode: ZBufMode::Test,
            mix_mode: MixMode::Alpha,
            cull_mode: CullMode::None,
            variables: Vec::new(),
        });
        1
    }
}

fn sphere_vertices(detail: u32) -> Vec<[f32; 3]> {
    let slices = detail.max(3);
    let stacks = (detail / 2).max(2);
    let point = |stack: u32, slice: u32| {
        let theta = PI * stack as f32 / stacks as f32;
        let phi = TAU * slice as f32 / slices as f32;
        [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()]
    };
    let mut vertices = Vec::with_capacity((stacks * slices * 6) as usize);
    for stack in 0..stacks {
        for slice in 0..slices {
            let (a, b) = (point(stack, slice), point(stack, slice + 1));
            let (c, d) = (point(stack + 1, slice), point(stack + 1, slice + 1));
            vertices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    vertices
}

fn cone_vertices(detail: u32) -> Vec<[f32; 3]> {
    let segments = detail.max(3);
    let rim = |i: u32| {
        let phi = TAU * i as f32 / segments as f32;
        [phi.cos(), 0.0, phi.sin()]
    };
    let mut vertices = Vec::with_capacity((segments * 6) as usize);
    for i in 0..segments {
        let (a, b) = (rim(i), rim(i + 1));
        vertices.extend_from_slice(&[[0.0, 1.0, 0.0], b, a]);
        vertices.extend_from_slice(&[[0.0, 0.0, 0.0], a, b]);
    }
    vertices
}

fn box_vertices() -> Vec<[f32; 3]> {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];
    let mut vertices = Vec::with_capacity(36);
    for (n, u, v) in FACES {
        let corner = |su: f32, sv: f32| {
            [
                n[0] + su * u[0] + sv * v[0],
                n[1] + su * u[1] + sv * v[1],
                n[2] + su * u[2] + sv * v[2],
            ]
        };
        let (a, b, c, d) = (
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        );
        vertices.extend_from_slice(&[a, b, c, a, c, d]);
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, RecordingDevice};
    use approx::assert_relative_eq;
    use lumen_core::renderer::{RenderPassDescriptor, RenderTargets};

    fn spot(outer: f32) -> Light {
        Light {
            kind: LightKind::Spot { inner: 1.0, outer },
            transform: Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)),
            color: LinearRgba::WHITE,
            cutoff_distance: 10.0,
        }
    }

    #[test]
    fn half_angle_cosines() {
        assert_relative_eq!(cosine_half_angle(1.0), 1.0);
        assert_relative_eq!(cosine_half_angle(0.0), std::f32::consts::FRAC_1_SQRT_2);
        assert_relative_eq!(cosine_half_angle(-1.0), 0.0);
    }

    #[test]
    fn volumes_cover_the_light_range() {
        let point = Light::point(Vec3::new(1.0, 2.0, 3.0), 4.0, LinearRgba::WHITE);
        let t = light_volume_transform(&point).expect("point");
        let top = t.transform_point(Vec3::Y);
        assert_relative_eq!(top.y, 6.0, epsilon = 1e-5);
        assert_relative_eq!(top.x, 1.0, epsilon = 1e-5);

        // A 90 degree cone: radius equals range.
        let light = spot(std::f32::consts::FRAC_1_SQRT_2);
        let t = light_volume_transform(&light).expect("spot");
        let apex = t.transform_point(Vec3::Y);
        assert_relative_eq!(apex.z, 2.0, epsilon = 1e-4);
        let base_center = t.transform_point(Vec3::ZERO);
        assert_relative_eq!(base_center.z, 12.0, epsilon = 1e-4);
        let rim = t.transform_point(Vec3::X);
        assert_relative_eq!(rim.x, 10.0, epsilon = 1e-3);
        assert!(light_volume_transform(&spot(0.0)).is_none());

        let sun = Light {
            kind: LightKind::Directional { cutoff_radius: 5.0 },
            ..Light::point(Vec3::ZERO, 20.0, LinearRgba::WHITE)
        };
        let t = light_volume_transform(&sun).expect("directional");
        let corner = t.transform_point(Vec3::ONE);
        assert_relative_eq!(corner.x, 5.0, epsilon = 1e-5);
        assert_relative_eq!(corner.z, 20.0, epsilon = 1e-5);
    }

    #[test]
    fn inside_tests_match_the_volumes() {
        let point = Light::point(Vec3::ZERO, 2.0, LinearRgba::WHITE);
        assert!(is_point_inside_light(Vec3::new(0.0, 1.9, 0.0), &point));
        assert!(!is_point_inside_light(Vec3::new(0.0, 2.1, 0.0), &point));

        let light = spot(0.9);
        assert!(is_point_inside_light(Vec3::new(0.0, 0.1, 5.0), &light));
        assert!(!is_point_inside_light(Vec3::new(0.0, 4.0, 5.0), &light));
        assert!(!is_point_inside_light(Vec3::new(0.0, 0.0, 1.0), &light));
        assert!(!is_point_inside_light(Vec3::new(0.0, 0.0, 13.0), &light));

        let sun = Light {
            kind: LightKind::Directional { cutoff_radius: 5.0 },
            ..Light::point(Vec3::ZERO, 20.0, LinearRgba::WHITE)
        };
        assert!(is_point_inside_light(Vec3::new(4.0, -4.0, 19.0), &sun));
        assert!(!is_point_inside_light(Vec3::new(6.0, 0.0, 0.0), &sun));
    }

    #[test]
    fn lights_blend_additively_and_flip_culling_from_inside() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut names = ShaderVarNames::new();
        let mut data = LightRenderData::new(
            &device,
            &mut registry,
            &mut names,
            LightRenderConfig::default(),
        )
        .expect("data");
        let gbuffer = GBuffer::new();

        let mut encoder = device.create_command_encoder(None);
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor::load("Lights", RenderTargets::SCREEN))
            .expect("pass");
        let mut renderer = DeferredLightRenderer::new(&device, &mut data, &registry, &gbuffer);
        renderer.set_camera(&camera());
        renderer
            .output_ambient_light(pass.as_mut(), LinearRgba::rgb(0.1, 0.1, 0.1), 32, 32)
            .expect("ambient");
        let near = Light::point(Vec3::new(0.0, 0.0, -1.0), 5.0, LinearRgba::WHITE);
        let far = Light::point(Vec3::new(0.0, 0.0, -20.0), 5.0, LinearRgba::WHITE);
        let vars = ShaderVarContext::new();
        assert_eq!(renderer.render_light(pass.as_mut(), &near, &vars, &[]).expect("near"), 1);
        assert_eq!(renderer.render_light(pass.as_mut(), &far, &vars, &[]).expect("far"), 1);
        drop(pass);

        let draws = device.draws_in("Lights");
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0].mix_mode, MixMode::Copy);
        assert_eq!(draws[1].mix_mode, MixMode::Add);
        assert_eq!(draws[1].cull_mode, CullMode::Reverse);
        assert_eq!(draws[2].cull_mode, CullMode::Normal);
        assert_eq!(draws[2].z_mode, ZBufMode::Test);

        let position = names.lookup("light position view").expect("interned");
        assert_eq!(
            draws[2].variable(position),
            Some(&ShaderValue::Vec3(Vec3::new(0.0, 0.0, -20.0)))
        );
        let params = names.lookup("light parameters").expect("interned");
        let Some(ShaderValue::Buffer(buffer)) = draws[2].variable(params).cloned() else {
            panic!("light parameters are bound");
        };
        let uniforms: LightUniforms =
            bytemuck::pod_read_unaligned(&device.buffer_data(buffer).expect("uploaded"));
        assert_eq!(uniforms.attenuation[0], 5.0);

        assert_eq!(data.frame_buffers().len(), 2);
        data.begin_frame(&device);
        assert!(data.frame_buffers().is_empty());
        data.release(&device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
