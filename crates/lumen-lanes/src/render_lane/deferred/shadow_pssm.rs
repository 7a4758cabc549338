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
//! Parallel-split shadow maps.
//!
//! The view frustum is cut into slices along the view direction. Slice
//! boundaries blend a logarithmic and a uniform distribution, so near slices
//! are thin and far ones thick. For every light, each slice is bounded in
//! light space; the casters touching a slice get a shadow map whose
//! projection is cropped to exactly their bounds. The maps are rendered with
//! a depth shader before light accumulation, and their projections, pixel
//! sizes and textures are bound to the light draws.

use super::DeferredError;
use ahash::AHashMap;
use lumen_core::config::ConfigStore;
use lumen_core::math::{Aabb, LinearRgba, Mat4, Transform, Vec3, Vec4, EPSILON};
use lumen_core::renderer::{
    CullMode, DrawCall, GraphicsDevice, Light, LightKind, MixMode, RenderPassDescriptor,
    RenderTarget, RenderTargets, ShaderId, ShaderRegistry, ShaderTicket, ShaderValue,
    ShaderVarName, ShaderVarNames, ShaderVarRef, ShaderVariable, TextureFormat, TextureId,
    ZBufMode,
};
use lumen_core::scene::{Camera, MeshWrapper, RenderView, SectorId};
use lumen_data::cache::TextureCache;
use std::rc::Rc;

/// Shader writing caster depth into shadow maps.
pub const SHADOW_DEPTH_SHADER: &str = "shadow_depth";

/// Distance of the first split from the camera, and near plane of the
/// light projections.
pub const SHADOW_NEAR: f32 = 0.01;

/// Settings of the shadow maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    /// Whether lights cast shadows.
    pub enable: bool,
    /// Number of slices the view frustum is cut into.
    pub split_count: u32,
    /// Distance beyond which nothing is shadowed.
    pub far: f32,
    /// Side of every shadow map, in texels.
    pub map_size: u32,
    /// Format of the shadow maps.
    pub format: TextureFormat,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enable: false,
            split_count: 3,
            far: 100.0,
            map_size: 1024,
            format: TextureFormat::R32Float,
        }
    }
}

impl ShadowConfig {
    /// The standard key prefix.
    pub const PREFIX: &'static str = "RenderManager.Deferred.Shadows";

    /// Reads the settings under `prefix`, defaulting missing keys.
    pub fn from_config(store: &ConfigStore, prefix: &str) -> Self {
        let d = Self::default();
        let key = |name: &str| format!("{prefix}.{name}");
        let int = |name: &str, default: u32| {
            store.get_int(&key(name), i64::from(default)).clamp(1, i64::from(u32::MAX)) as u32
        };
        let format = match store.raw(&key("Format")) {
            None => d.format,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                log::warn!("ShadowConfig: {prefix}.Format: {e}, using {}", d.format.name());
                d.format
            }),
        };
        Self {
            enable: store.get_bool(&key("Enable"), d.enable),
            split_count: int("SplitCount", d.split_count),
            far: store.get_float(&key("Far"), d.far).max(SHADOW_NEAR * 2.0),
            map_size: int("MapSize", d.map_size),
            format,
        }
    }
}

/// The `parts + 1` slice boundaries between `near` and `far`: the average
/// of the logarithmic and the uniform split schemes.
pub fn split_distances(near: f32, far: f32, parts: u32) -> Vec<f32> {
    let parts = parts.max(1);
    (0..=parts)
        .map(|i| {
            let t = i as f32 / parts as f32;
            let logarithmic = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            (logarithmic + uniform) * 0.5
        })
        .collect()
}

/// Light space to post-projection light space. Directional lights project
/// orthographically; point and spot lights see a 90° frustum along their
/// +Z axis, with depth `[0, 1]` between [`SHADOW_NEAR`] and the cutoff.
pub fn light_projection(light: &Light) -> Mat4 {
    match light.kind {
        LightKind::Directional { .. } => Mat4::IDENTITY,
        LightKind::Point | LightKind::Spot { .. } => {
            let n = SHADOW_NEAR;
            let f = light.cutoff_distance.max(n * 2.0);
            let depth = f / (f - n);
            Mat4::from_cols(
                Vec4::X,
                Vec4::Y,
                Vec4::new(0.0, 0.0, depth, 1.0),
                Vec4::new(0.0, 0.0, -n * depth, 0.0),
            )
        }
    }
}

/// The light-space box a light can shadow.
pub fn light_bounds(light: &Light) -> Aabb {
    let c = light.cutoff_distance;
    match light.kind {
        LightKind::Directional { cutoff_radius } => Aabb::from_min_max(
            Vec3::new(-cutoff_radius, -cutoff_radius, 0.0),
            Vec3::new(cutoff_radius, cutoff_radius, c),
        ),
        LightKind::Point | LightKind::Spot { .. } => {
            Aabb::from_min_max(Vec3::new(-c, -c, SHADOW_NEAR), Vec3::new(c, c, c))
        }
    }
}

fn intersect(a: &Aabb, b: &Aabb) -> Option<Aabb> {
    let min = a.min.max(b.min);
    let max = a.max.min(b.max);
    (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some(Aabb { min, max })
}

fn union(a: Aabb, b: Aabb) -> Aabb {
    Aabb {
        min: a.min.min(b.min),
        max: a.max.max(b.max),
    }
}

fn corners(b: &Aabb) -> [Vec3; 8] {
    let (lo, hi) = (b.min, b.max);
    [
        Vec3::new(lo.x, lo.y, lo.z),
        Vec3::new(hi.x, lo.y, lo.z),
        Vec3::new(lo.x, hi.y, lo.z),
        Vec3::new(hi.x, hi.y, lo.z),
        Vec3::new(lo.x, lo.y, hi.z),
        Vec3::new(hi.x, lo.y, hi.z),
        Vec3::new(lo.x, hi.y, hi.z),
        Vec3::new(hi.x, hi.y, hi.z),
    ]
}

fn project_box(b: &Aabb, projection: &Mat4) -> Option<Aabb> {
    Aabb::from_points(&corners(b).map(|c| projection.project_point(c)))
}

/// The world-space point seen at `ndc` on the screen, `depth` units in
/// front of the camera.
fn unproject(camera: &Camera, ndc: (f32, f32), depth: f32) -> Option<Vec3> {
    let p = &camera.projection;
    let (sx, sy) = (p.cols[0].x, p.cols[1].y);
    if sx.abs() < EPSILON || sy.abs() < EPSILON {
        return None;
    }
    let local = if p.cols[2].w != 0.0 {
        Vec3::new(
            (ndc.0 + p.cols[2].x) * depth / sx,
            (ndc.1 + p.cols[2].y) * depth / sy,
            -depth,
        )
    } else {
        Vec3::new((ndc.0 - p.cols[3].x) / sx, (ndc.1 - p.cols[3].y) / sy, -depth)
    };
    Some(camera.transform.transform_point(local))
}

/// One slice of the view frustum as seen from a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitVolume {
    /// Distance of the slice start from the camera.
    pub near: f32,
    /// Distance of the slice end from the camera.
    pub far: f32,
    /// Light-space bounds of the slice, clipped to the light.
    pub light_space: Aabb,
}

/// Bounds the view slice between `near` and `far` in the space of `light`.
/// Returns `None` when the slice is out of the light's reach.
pub fn split_volume(light: &Light, camera: &Camera, near: f32, far: f32) -> Option<SplitVolume> {
    let world_to_light = light.transform.inverse();
    let mut points = Vec::with_capacity(8);
    for ndc in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
        for depth in [near, far] {
            points.push(world_to_light.transform_point(unproject(camera, ndc, depth)?));
        }
    }
    let slice = Aabb::from_points(&points)?;
    let light_space = intersect(&slice, &light_bounds(light))?;
    Some(SplitVolume {
        near,
        far,
        light_space,
    })
}

/// The shadow-map projection of a slice: `light_projection` followed by a
/// crop mapping `casters` (post-projection bounds) onto the whole map, with
/// depth `[0, 1]` from `min_z` to the far side of the casters.
pub fn shadow_projection(casters: &Aabb, min_z: f32, light_projection: &Mat4) -> Mat4 {
    let (lo, hi) = (casters.min, casters.max);
    let w = (hi.x - lo.x).max(EPSILON);
    let h = (hi.y - lo.y).max(EPSILON);
    // n == f would give a singular matrix.
    let depth = 1.0 / (hi.z + EPSILON - min_z).max(EPSILON);
    let crop = Mat4::from_cols(
        Vec4::new(2.0 / w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / h, 0.0, 0.0),
        Vec4::new(0.0, 0.0, depth, 0.0),
        Vec4::new(-(hi.x + lo.x) / w, -(hi.y + lo.y) / h, -min_z * depth, 1.0),
    );
    crop * *light_projection
}

/// A shadow map set up for one slice of one light.
#[derive(Debug, Clone)]
pub struct ShadowMap {
    /// Index of the light in its sector.
    pub light: usize,
    /// Index of the slice.
    pub split: usize,
    /// World to light space.
    pub world_to_light: Transform,
    /// Light space to shadow-map clip space.
    pub projection: Mat4,
    /// The map.
    pub texture: TextureId,
    /// Side of the map, in texels.
    pub size: u32,
    /// The objects drawn into the map.
    pub casters: Vec<Rc<MeshWrapper>>,
}

#[derive(Debug, Clone, Copy)]
struct SplitVarNames {
    projection: ShaderVarName,
    pixel_size: ShaderVarName,
    texture: ShaderVarName,
    far: ShaderVarName,
}

/// Per-frame shadow maps of the lights of a view, with their textures
/// cached across frames.
#[derive(Debug)]
pub struct PssmShadows {
    config: ShadowConfig,
    depth_shader: ShaderId,
    names: Vec<SplitVarNames>,
    cache: TextureCache,
    maps: Vec<ShadowMap>,
    variables: AHashMap<(SectorId, usize), Vec<ShaderVarRef>>,
}

impl PssmShadows {
    /// Interns the per-slice light variables
    /// (`light shadow map projection <n>` and so on) and finds the depth
    /// shader.
    pub fn new(config: ShadowConfig, registry: &mut ShaderRegistry, names: &mut ShaderVarNames) -> Self {
        let depth_shader = registry.find(SHADOW_DEPTH_SHADER).unwrap_or_else(|| {
            log::warn!(
                "PssmShadows: shader '{SHADOW_DEPTH_SHADER}' is not loaded, registering a placeholder"
            );
            registry.register(SHADOW_DEPTH_SHADER)
        });
        let split_names = (0..config.split_count.max(1))
            .map(|i| SplitVarNames {
                projection: names.intern(&format!("light shadow map projection {i}")),
                pixel_size: names.intern(&format!("light shadow map pixel size {i}")),
                texture: names.intern(&format!("light shadow map {i}")),
                far: names.intern(&format!("light shadow map far {i}")),
            })
            .collect();
        let cache = TextureCache::new(config.format);
        Self {
            config,
            depth_shader,
            names: split_names,
            cache,
            maps: Vec::new(),
            variables: AHashMap::new(),
        }
    }

    /// The settings.
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Drops the maps of the previous frame and purges idle textures.
    pub fn begin_frame(&mut self, device: &dyn GraphicsDevice, frame: u64) {
        self.cache.advance_frame(device, frame);
        self.maps.clear();
        self.variables.clear();
    }

    /// The maps set up this frame.
    pub fn maps(&self) -> &[ShadowMap] {
        &self.maps
    }

    /// The shadow variables of light `index` of `sector`; empty for lights
    /// without maps.
    pub fn light_variables(&self, sector: SectorId, index: usize) -> &[ShaderVarRef] {
        self.variables
            .get(&(sector, index))
            .map_or(&[], Vec::as_slice)
    }

    /// Sets up the maps of light `index` of `sector` as seen from `view`.
    /// Slices without casters get no map. Returns the number of maps.
    pub fn setup_light(
        &mut self,
        device: &dyn GraphicsDevice,
        sector: SectorId,
        index: usize,
        light: &Light,
        view: &RenderView,
        casters: &[Rc<MeshWrapper>],
    ) -> Result<usize, DeferredError> {
        let splits = split_distances(SHADOW_NEAR, self.config.far, self.config.split_count);
        let projection = light_projection(light);
        let bounds = light_bounds(light);
        let world_to_light = light.transform.inverse();
        let size = self.config.map_size;
        let mut min_z = f32::INFINITY;
        let mut variables = Vec::new();
        let mut created = 0;

        for (split, range) in splits.windows(2).enumerate() {
            let Some(volume) = split_volume(light, &view.camera, range[0], range[1]) else {
                continue;
            };
            let mut contained = Vec::new();
            let mut casters_pp: Option<Aabb> = None;
            for caster in casters.iter().filter(|c| !c.invisible) {
                let local = caster.world_bbox().transformed(&world_to_light);
                if intersect(&local, &volume.light_space).is_none() {
                    continue;
                }
                let Some(projected) = intersect(&local, &bounds)
                    .and_then(|clipped| project_box(&clipped, &projection))
                else {
                    continue;
                };
                casters_pp = Some(casters_pp.map_or(projected, |b| union(b, projected)));
                contained.push(caster.clone());
            }
            let Some(casters_pp) = casters_pp else {
                continue;
            };
            // Casters closer to the light than this slice still shadow it.
            min_z = min_z.min(casters_pp.min.z);
            let matrix = shadow_projection(&casters_pp, min_z, &projection);
            let texture = self.cache.query_unused_texture(device, size, size)?;

            let names = self.names[split.min(self.names.len() - 1)];
            let texel = 1.0 / size as f32;
            variables.extend([
                ShaderVariable::new(names.projection, ShaderValue::Matrix(matrix)),
                ShaderVariable::new(
                    names.pixel_size,
                    ShaderValue::Vec4(Vec4::new(texel, texel, size as f32, size as f32)),
                ),
                ShaderVariable::new(names.texture, ShaderValue::Texture(texture)),
                ShaderVariable::new(names.far, ShaderValue::Float(volume.far)),
            ]);
            self.maps.push(ShadowMap {
                light: index,
                split,
                world_to_light,
                projection: matrix,
                texture,
                size,
                casters: contained,
            });
            created += 1;
        }
        if !variables.is_empty() {
            self.variables.insert((sector, index), variables);
        }
        Ok(created)
    }

    /// Sets up the maps of every light of the sector of `view` and draws
    /// `casters` into them. Returns the number of draw calls.
    pub fn render(
        &mut self,
        device: &dyn GraphicsDevice,
        view: &RenderView,
        casters: &[Rc<MeshWrapper>],
    ) -> Result<usize, DeferredError> {
        let sector = &view.sector;
        for (index, light) in sector.lights.iter().enumerate() {
            self.setup_light(device, sector.id, index, light, view, casters)?;
        }
        if self.maps.is_empty() {
            return Ok(0);
        }

        let mut encoder = device.create_command_encoder(Some("Shadow Maps"));
        let mut draws = 0;
        for map in &self.maps {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::clear(
                "Shadow-Map",
                RenderTargets::color(RenderTarget::new(map.texture)),
                LinearRgba::WHITE,
            ))?;
            pass.set_world_to_camera(&map.world_to_light);
            pass.set_projection(&map.projection);
            for caster in &map.casters {
                for mesh in &caster.render_meshes {
                    pass.draw_mesh(&DrawCall {
                        geometry: mesh.geometry,
                        shader: self.depth_shader,
                        ticket: ShaderTicket(0),
                        pass: 0,
                        object_to_world: caster.transform,
                        z_mode: ZBufMode::Use,
                        mix_mode: MixMode::Copy,
                        cull_mode: CullMode::Normal,
                        variables: Vec::new(),
                    });
                    draws += 1;
                }
            }
        }
        device.submit_command_buffer(encoder.finish());
        log::trace!("PssmShadows: {} maps, {draws} draws", self.maps.len());
        Ok(draws)
    }

    /// Destroys the cached maps.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        self.maps.clear();
        self.variables.clear();
        self.cache.clear(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, material, mesh_wrapper, render_mesh, ListCuller, RecordingDevice};
    use approx::assert_relative_eq;
    use lumen_core::scene::{RenderPriority, Sector};

    #[test]
    fn split_distances_average_the_log_and_uniform_schemes() {
        let splits = split_distances(1.0, 100.0, 3);
        assert_eq!(splits.len(), 4);
        assert_relative_eq!(splits[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(splits[1], (100f32.powf(1.0 / 3.0) + 34.0) * 0.5, epsilon = 1e-3);
        assert_relative_eq!(splits[2], (100f32.powf(2.0 / 3.0) + 67.0) * 0.5, epsilon = 1e-3);
        assert_relative_eq!(splits[3], 100.0, epsilon = 1e-3);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn the_crop_maps_the_casters_onto_the_whole_map() {
        let casters = Aabb::from_min_max(Vec3::new(0.0, 0.0, 2.0), Vec3::new(4.0, 2.0, 6.0));
        let m = shadow_projection(&casters, 2.0, &Mat4::IDENTITY);
        let lo = m.project_point(casters.min);
        let hi = m.project_point(casters.max);
        assert_relative_eq!(lo.x, -1.0, epsilon = 1e-4);
        assert_relative_eq!(lo.y, -1.0, epsilon = 1e-4);
        assert_relative_eq!(lo.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(hi.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(hi.y, 1.0, epsilon = 1e-4);
        assert_relative_eq!(hi.z, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn spot_projections_put_the_cutoff_at_full_depth() {
        let mut light = Light::point(Vec3::ZERO, 20.0, LinearRgba::WHITE);
        light.kind = LightKind::Spot {
            inner: 0.9,
            outer: 0.8,
        };
        let p = light_projection(&light);
        assert_relative_eq!(p.project_point(Vec3::new(0.0, 0.0, SHADOW_NEAR)).z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.project_point(Vec3::new(0.0, 0.0, 20.0)).z, 1.0, epsilon = 1e-4);
        assert_relative_eq!(p.project_point(Vec3::new(5.0, 0.0, 5.0)).x, 1.0, epsilon = 1e-4);
    }

    /// A directional light 60 units in front of the camera, shining back at
    /// it.
    fn sun() -> Light {
        Light {
            kind: LightKind::Directional {
                cutoff_radius: 50.0,
            },
            transform: Transform::from_translation(Vec3::new(0.0, 0.0, -60.0)),
            color: LinearRgba::WHITE,
            cutoff_distance: 100.0,
        }
    }

    fn cube(id: u32, z: f32) -> Rc<MeshWrapper> {
        Rc::new(mesh_wrapper(
            id,
            RenderPriority(6),
            Vec3::new(0.0, 0.0, z),
            render_mesh(id as usize, material(ShaderId(0))),
        ))
    }

    fn shadows(registry: &mut ShaderRegistry) -> PssmShadows {
        let config = ShadowConfig {
            enable: true,
            far: 30.0,
            map_size: 256,
            ..ShadowConfig::default()
        };
        PssmShadows::new(config, registry, &mut ShaderVarNames::new())
    }

    #[test]
    fn casters_get_a_map_in_the_slices_they_touch() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut shadows = shadows(&mut registry);
        let mut sector = Sector::new(SectorId(3), "yard", Rc::new(ListCuller::default()));
        sector.lights.push(sun());
        let view = RenderView::new(camera(), Rc::new(sector), 100, 100);
        // Splits at 0.01, ~5.08, ~11.04 and 30.
        let casters = [cube(1, -3.0), cube(2, -25.0)];

        shadows.begin_frame(&device, 1);
        let draws = shadows.render(&device, &view, &casters).expect("shadows");
        assert_eq!(draws, 2);
        let maps = shadows.maps();
        assert_eq!(maps.len(), 2);
        assert_eq!((maps[0].split, maps[1].split), (0, 2));
        assert_eq!(maps[0].casters[0].id.0, 1);
        assert_eq!(maps[1].casters[0].id.0, 2);
        assert_ne!(maps[0].texture, maps[1].texture);
        assert_eq!(shadows.light_variables(SectorId(3), 0).len(), 8);
        assert!(shadows.light_variables(SectorId(3), 1).is_empty());

        let passes = device.passes();
        assert_eq!(passes.len(), 2);
        assert!(passes.iter().all(|p| p.label == "Shadow-Map"));
        assert_eq!(passes[0].projection, Some(maps[0].projection));
        assert_eq!(passes[0].world_to_camera, Some(sun().transform.inverse()));
        let depth = registry.find(SHADOW_DEPTH_SHADER).expect("registered");
        assert_eq!(passes[1].draws[0].shader, depth);

        // The caster of the first map spans it entirely.
        let local = casters[0].world_bbox().transformed(&maps[0].world_to_light);
        let lo = maps[0].projection.project_point(local.min);
        let hi = maps[0].projection.project_point(local.max);
        assert_relative_eq!(lo.x, -1.0, epsilon = 1e-3);
        assert_relative_eq!(hi.x, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn lights_out_of_reach_and_empty_slices_get_no_maps() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut shadows = shadows(&mut registry);
        let mut sector = Sector::new(SectorId(0), "cellar", Rc::new(ListCuller::default()));
        // Behind the camera, facing away.
        sector
            .lights
            .push(Light::point(Vec3::new(0.0, 0.0, 40.0), 5.0, LinearRgba::WHITE));
        let view = RenderView::new(camera(), Rc::new(sector), 100, 100);

        shadows.begin_frame(&device, 1);
        assert_eq!(shadows.render(&device, &view, &[cube(1, -3.0)]).expect("shadows"), 0);
        assert!(shadows.maps().is_empty());
        assert!(device.passes().is_empty());
        assert_eq!(device.created_texture_count(), 0);
    }

    #[test]
    fn maps_are_reused_across_frames() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut shadows = shadows(&mut registry);
        let mut sector = Sector::new(SectorId(0), "yard", Rc::new(ListCuller::default()));
        sector.lights.push(sun());
        let view = RenderView::new(camera(), Rc::new(sector), 100, 100);
        let casters = [cube(1, -3.0)];

        for frame in 1..=3 {
            shadows.begin_frame(&device, frame);
            shadows.render(&device, &view, &casters).expect("shadows");
        }
        assert_eq!(device.created_texture_count(), 1);
        shadows.release(&device);
        assert_eq!(device.live_texture_count(), 0);
    }
}
