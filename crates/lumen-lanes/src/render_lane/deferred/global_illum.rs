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

//! Screen-space global illumination: directional occlusion and one bounce
//! of indirect light computed from the G-buffer.
//!
//! The stage runs after light accumulation. A GI pass samples the G-buffer
//! around each pixel with a precomputed kernel of hemisphere directions,
//! rotated per pixel by a tiled random-normals texture. The result is blurred
//! horizontally then vertically with an edge-aware kernel and added onto
//! the accumulation buffer.

use super::gbuffer::GBuffer;
use super::DeferredError;
use crate::render_lane::draw::FullscreenQuad;
use lumen_core::config::ConfigStore;
use lumen_core::math::{LinearRgba, Vec2, Vec3};
use lumen_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CommandEncoder, GraphicsDevice, LoadOp, MixMode,
    RenderPassDescriptor, RenderTarget, RenderTargets, ShaderId, ShaderRegistry, ShaderValue,
    ShaderVarContext, ShaderVarName, ShaderVarNames, ShaderVarRef, ShaderVariable,
    TextureDescriptor, TextureFlags, TextureFormat, TextureId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Shader computing occlusion and bounce light.
pub const GLOBAL_ILLUM_SHADER: &str = "deferred_globalillum";
/// Shader of the horizontal blur pass.
pub const BLUR_HORIZONTAL_SHADER: &str = "deferred_globalillum_blur_h";
/// Shader of the vertical blur pass.
pub const BLUR_VERTICAL_SHADER: &str = "deferred_globalillum_blur_v";
/// Shader adding the blurred result to the accumulation buffer.
pub const COMPOSITION_SHADER: &str = "deferred_light_composition";

/// Side of the random-normals texture.
pub const RANDOM_NORMALS_SIZE: u32 = 64;

/// Size of the generated irradiance environment map, latitude-longitude.
pub const ENVIRONMENT_MAP_SIZE: (u32, u32) = (32, 16);

/// Upper bound on the sample-direction kernel.
pub const MAX_SAMPLE_DIRECTIONS: usize = 1 << 20;

/// Labels of the GI passes, in order.
pub const GLOBAL_ILLUM_PASSES: [&str; 4] = [
    "GlobalIllum",
    "GlobalIllum-BlurH",
    "GlobalIllum-BlurV",
    "GlobalIllum-Composite",
];

/// Resolution of the GI buffers relative to the G-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferResolution {
    /// Same size.
    #[default]
    Full,
    /// Half width and height.
    Half,
    /// Quarter width and height.
    Quarter,
}

impl BufferResolution {
    /// The size divisor.
    pub fn divisor(self) -> u32 {
        match self {
            BufferResolution::Full => 1,
            BufferResolution::Half => 2,
            BufferResolution::Quarter => 4,
        }
    }

    /// Scales a G-buffer size, never below one pixel.
    pub fn scale(self, width: u32, height: u32) -> (u32, u32) {
        let d = self.divisor();
        ((width / d).max(1), (height / d).max(1))
    }
}

impl FromStr for BufferResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BufferResolution::Full),
            "half" => Ok(BufferResolution::Half),
            "quarter" => Ok(BufferResolution::Quarter),
            other => Err(format!("unknown buffer resolution '{other}'")),
        }
    }
}

impl fmt::Display for BufferResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferResolution::Full => "full",
            BufferResolution::Half => "half",
            BufferResolution::Quarter => "quarter",
        })
    }
}

/// Settings of the GI stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalIllumConfig {
    /// Whether the stage runs.
    pub enable: bool,
    /// GI buffer size relative to the G-buffer.
    pub buffer_resolution: BufferResolution,
    /// Side of the interleaved sampling pattern.
    pub pattern_size: u32,
    /// Samples generated per pattern cell.
    pub max_samples: u32,
    /// Samples taken per pixel.
    pub sample_count: u32,
    /// World-space sampling radius.
    pub sample_radius: f32,
    /// Depth difference below which a sample does not occlude.
    pub depth_bias: f32,
    /// Occlusion multiplier.
    pub occlusion_strength: f32,
    /// Occluders farther away are ignored.
    pub max_occluder_distance: f32,
    /// Rotation of the environment light, in radians.
    pub light_rotation_angle: f32,
    /// Indirect light multiplier.
    pub bounce_strength: f32,
    /// Blur kernel size in pixels.
    pub blur_kernel_size: u32,
    /// Position difference stopping the blur.
    pub blur_position_threshold: f32,
    /// Normal difference stopping the blur.
    pub blur_normal_threshold: f32,
    /// Format of the GI buffer.
    pub global_illum_buffer_format: TextureFormat,
    /// Format of the blur buffer.
    pub composition_buffer_format: TextureFormat,
}

impl Default for GlobalIllumConfig {
    fn default() -> Self {
        Self {
            enable: true,
            buffer_resolution: BufferResolution::Full,
            pattern_size: 4,
            max_samples: 128,
            sample_count: 16,
            sample_radius: 5.0,
            depth_bias: 1.0,
            occlusion_strength: 4.0,
            max_occluder_distance: 50.0,
            light_rotation_angle: 0.0,
            bounce_strength: 1.0,
            blur_kernel_size: 3,
            blur_position_threshold: 1.0,
            blur_normal_threshold: 0.5,
            global_illum_buffer_format: TextureFormat::Rgba16Float,
            composition_buffer_format: TextureFormat::Rgb16Float,
        }
    }
}

fn parse_or<T: FromStr + fmt::Display + Copy>(store: &ConfigStore, key: &str, default: T) -> T
where
    T::Err: fmt::Display,
{
    match store.raw(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("GlobalIllumConfig: {key}: {e}, using {default}");
            default
        }),
    }
}

impl GlobalIllumConfig {
    /// The standard key prefix.
    pub const PREFIX: &'static str = "RenderManager.Deferred.GlobalIllum";

    /// Reads the settings under `prefix`, defaulting missing keys.
    pub fn from_config(store: &ConfigStore, prefix: &str) -> Self {
        let d = Self::default();
        let key = |name: &str| format!("{prefix}.{name}");
        let int = |name: &str, default: u32| {
            store.get_int(&key(name), i64::from(default)).clamp(0, i64::from(u32::MAX)) as u32
        };
        let float = |name: &str, default: f32| store.get_float(&key(name), default);
        Self {
            enable: store.get_bool(&key("Enable"), d.enable),
            buffer_resolution: parse_or(store, &key("BufferResolution"), d.buffer_resolution),
            pattern_size: int("SSDO.SamplingPatternSize", d.pattern_size).max(1),
            max_samples: int("SSDO.MaxSamples", d.max_samples).max(1),
            sample_count: int("SSDO.SampleCount", d.sample_count),
            sample_radius: float("SSDO.SampleRadius", d.sample_radius),
            depth_bias: float("SSDO.DepthBias", d.depth_bias),
            occlusion_strength: float("SSDO.OcclusionStrength", d.occlusion_strength),
            max_occluder_distance: float("SSDO.MaxOccluderDistance", d.max_occluder_distance),
            light_rotation_angle: float("SSDO.LightRotationAngle", d.light_rotation_angle),
            bounce_strength: float("SSDO.BounceStrength", d.bounce_strength),
            blur_kernel_size: int("SSDO.BlurKernelSize", d.blur_kernel_size),
            blur_position_threshold: float(
                "SSDO.BlurPositionThreshold",
                d.blur_position_threshold,
            ),
            blur_normal_threshold: float("SSDO.BlurNormalThreshold", d.blur_normal_threshold),
            global_illum_buffer_format: parse_or(
                store,
                &key("GlobalIllumBufferFormat"),
                d.global_illum_buffer_format,
            ),
            composition_buffer_format: parse_or(
                store,
                &key("CompositionBufferFormat"),
                d.composition_buffer_format,
            ),
        }
    }

    /// Samples taken per pixel, at most `max_samples`.
    pub fn effective_sample_count(&self) -> u32 {
        self.sample_count.min(self.max_samples)
    }
}

/// Element `index` of the Halton low-discrepancy sequence in `base`.
pub fn halton(base: u32, mut index: u32) -> f32 {
    let mut x = 0.0;
    let inv = 1.0 / base as f32;
    let mut f = inv;
    while index > 0 {
        x += f * (index % base) as f32;
        index /= base;
        f *= inv;
    }
    x
}

/// `pattern_size² × max_samples`, or `None` when the product overflows or
/// exceeds [`MAX_SAMPLE_DIRECTIONS`].
pub fn sample_direction_count(pattern_size: u32, max_samples: u32) -> Option<usize> {
    pattern_size
        .checked_mul(pattern_size)
        .and_then(|cells| cells.checked_mul(max_samples))
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= MAX_SAMPLE_DIRECTIONS)
}

/// `pattern_size² × max_samples` directions inside the unit hemisphere
/// around +Z, taken from the Halton sequence in bases 2, 3 and 5. Points
/// outside the unit sphere are rejected.
///
/// Returns `None` for kernels [`sample_direction_count`] rejects.
pub fn sample_directions(pattern_size: u32, max_samples: u32) -> Option<Vec<Vec3>> {
    let count = sample_direction_count(pattern_size, max_samples)?;
    let mut samples = Vec::with_capacity(count);
    let mut index = 0;
    while samples.len() < count {
        let sample = Vec3::new(
            2.0 * halton(2, index) - 1.0,
            2.0 * halton(3, index) - 1.0,
            halton(5, index),
        );
        index += 1;
        if sample.length() <= 1.0 {
            samples.push(sample);
        }
    }
    Some(samples)
}

/// A latitude-longitude RGBA8 irradiance map fading from a dim ground
/// color at the bottom row to a bright sky at the top.
pub fn irradiance_environment_map(width: u32, height: u32) -> Vec<[u8; 4]> {
    const GROUND: [f32; 3] = [0.25, 0.22, 0.2];
    const SKY: [f32; 3] = [0.75, 0.85, 1.0];
    let rows = height.max(1);
    (0..rows)
        .flat_map(|y| {
            // Row 0 is the zenith.
            let t = if rows == 1 { 1.0 } else { 1.0 - y as f32 / (rows - 1) as f32 };
            let texel = [0, 1, 2].map(|c| {
                ((GROUND[c] + (SKY[c] - GROUND[c]) * t) * 255.0).round() as u8
            });
            std::iter::repeat([texel[0], texel[1], texel[2], 255]).take(width as usize)
        })
        .collect()
}

/// A `size` × `size` RGBA8 texture of random unit vectors, packed to
/// `[0, 255]`. The sequence is fixed by `seed`.
pub fn random_normals(size: u32, seed: u64) -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let pack = |v: f32| ((v * 0.5 + 0.5) * 255.0).round() as u8;
    (0..size * size)
        .map(|_| {
            let v = loop {
                let v = Vec3::new(
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                );
                let len = v.length();
                if len > 1e-3 && len <= 1.0 {
                    break v / len;
                }
            };
            [pack(v.x), pack(v.y), pack(v.z), 255]
        })
        .collect()
}

/// Parameters of the GI shaders, uploaded as one uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalIllumParams {
    /// Side of the sampling pattern.
    pub pattern_size: u32,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Blur kernel size.
    pub blur_kernel_size: u32,
    /// Padding.
    pub _pad: u32,
    /// Sampling radius.
    pub sample_radius: f32,
    /// Depth bias.
    pub depth_bias: f32,
    /// Occlusion multiplier.
    pub occlusion_strength: f32,
    /// Maximum occluder distance.
    pub max_occluder_distance: f32,
    /// Environment light rotation.
    pub light_rotation_angle: f32,
    /// Indirect light multiplier.
    pub bounce_strength: f32,
    /// Blur position threshold.
    pub blur_position_threshold: f32,
    /// Blur normal threshold.
    pub blur_normal_threshold: f32,
}

impl From<&GlobalIllumConfig> for GlobalIllumParams {
    fn from(c: &GlobalIllumConfig) -> Self {
        Self {
            pattern_size: c.pattern_size,
            sample_count: c.effective_sample_count(),
            blur_kernel_size: c.blur_kernel_size,
            _pad: 0,
            sample_radius: c.sample_radius,
            depth_bias: c.depth_bias,
            occlusion_strength: c.occlusion_strength,
            max_occluder_distance: c.max_occluder_distance,
            light_rotation_angle: c.light_rotation_angle,
            bounce_strength: c.bounce_strength,
            blur_position_threshold: c.blur_position_threshold,
            blur_normal_threshold: c.blur_normal_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GlobalIllumShaders {
    global_illum: ShaderId,
    blur_horizontal: ShaderId,
    blur_vertical: ShaderId,
    composition: ShaderId,
}

#[derive(Debug, Clone, Copy)]
struct GlobalIllumNames {
    input: ShaderVarName,
    random_normals: ShaderVarName,
    sample_directions: ShaderVarName,
    environment_map: ShaderVarName,
    parameters: ShaderVarName,
}

#[derive(Debug)]
struct GlobalIllumResources {
    screen_size: (u32, u32),
    global_illum_buffer: TextureId,
    composition_buffer: TextureId,
    random_normals: TextureId,
    sample_directions: TextureId,
    environment_map: TextureId,
    parameters: BufferId,
    buffer_quad: FullscreenQuad,
    screen_quad: FullscreenQuad,
}

/// Runs the GI stage and owns its buffers.
#[derive(Debug)]
pub struct GlobalIllumRenderer {
    config: GlobalIllumConfig,
    enabled: bool,
    shaders: GlobalIllumShaders,
    names: GlobalIllumNames,
    environment_map: Option<TextureId>,
    resources: Option<GlobalIllumResources>,
}

fn find_shader(registry: &mut ShaderRegistry, name: &str) -> ShaderId {
    registry.find(name).unwrap_or_else(|| {
        log::warn!("GlobalIllumRenderer: shader '{name}' is not loaded, registering a placeholder");
        registry.register(name)
    })
}

impl GlobalIllumRenderer {
    /// A renderer with `config`. Buffers are created by
    /// [`initialize`](Self::initialize).
    pub fn new(
        config: GlobalIllumConfig,
        registry: &mut ShaderRegistry,
        names: &mut ShaderVarNames,
    ) -> Self {
        Self {
            enabled: config.enable,
            config,
            shaders: GlobalIllumShaders {
                global_illum: find_shader(registry, GLOBAL_ILLUM_SHADER),
                blur_horizontal: find_shader(registry, BLUR_HORIZONTAL_SHADER),
                blur_vertical: find_shader(registry, BLUR_VERTICAL_SHADER),
                composition: find_shader(registry, COMPOSITION_SHADER),
            },
            names: GlobalIllumNames {
                input: names.intern("tex global illumination"),
                random_normals: names.intern("tex random normals"),
                sample_directions: names.intern("tex sample directions"),
                environment_map: names.intern("tex globalillum envmap"),
                parameters: names.intern("globalillum parameters"),
            },
            environment_map: None,
            resources: None,
        }
    }

    /// The settings.
    pub fn config(&self) -> &GlobalIllumConfig {
        &self.config
    }

    /// Returns `true` when the stage runs.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns the stage on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns `true` once the buffers exist.
    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// The GI buffer, once created.
    pub fn global_illum_buffer(&self) -> Option<TextureId> {
        self.resources.as_ref().map(|r| r.global_illum_buffer)
    }

    /// The blur buffer, once created.
    pub fn composition_buffer(&self) -> Option<TextureId> {
        self.resources.as_ref().map(|r| r.composition_buffer)
    }

    /// Replaces the generated irradiance environment map with `texture`.
    /// The texture stays owned by the caller; `None` restores the generated
    /// map.
    pub fn set_irradiance_environment_map(&mut self, texture: Option<TextureId>) {
        self.environment_map = texture;
    }

    /// The irradiance environment map bound to the GI pass, once
    /// initialized.
    pub fn irradiance_environment_map(&self) -> Option<TextureId> {
        self.resources
            .as_ref()
            .map(|r| self.environment_map.unwrap_or(r.environment_map))
    }

    /// Creates the buffers for a `width` × `height` G-buffer, releasing
    /// previous ones. Does nothing when disabled.
    ///
    /// On failure the stage disables itself and keeps nothing allocated.
    pub fn initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), DeferredError> {
        self.release(device);
        if !self.enabled {
            return Ok(());
        }
        let mut created = CreatedResources::default();
        match self.create_resources(device, width, height, &mut created) {
            Ok(resources) => {
                log::debug!(
                    "GlobalIllumRenderer: {}x{} buffers ({})",
                    width,
                    height,
                    self.config.buffer_resolution
                );
                self.resources = Some(resources);
                Ok(())
            }
            Err(e) => {
                log::error!("GlobalIllumRenderer: disabled, {e}");
                created.release(device);
                self.enabled = false;
                Err(e)
            }
        }
    }

    /// Re-creates the buffers when the G-buffer size changed. Returns
    /// `true` when they were re-created.
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<bool, DeferredError> {
        if !self.enabled {
            return Ok(false);
        }
        if self.resources.as_ref().map(|r| r.screen_size) == Some((width, height)) {
            return Ok(false);
        }
        self.initialize(device, width, height)?;
        Ok(true)
    }

    fn create_resources(
        &self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        created: &mut CreatedResources,
    ) -> Result<GlobalIllumResources, DeferredError> {
        let pattern = self.config.pattern_size;
        let max_samples = self.config.max_samples;
        let max_size = device.capabilities().max_texture_size;
        let directions = sample_directions(pattern, max_samples)
            .filter(|_| max_samples <= max_size)
            .filter(|_| pattern.checked_mul(pattern).is_some_and(|h| h <= max_size))
            .ok_or_else(|| {
                DeferredError::InvalidConfig(format!(
                    "sampling pattern {pattern}x{pattern} with {max_samples} samples is too large"
                ))
            })?;

        let (bw, bh) = self.config.buffer_resolution.scale(width, height);
        let flags = TextureFlags::RENDER_TARGET
            .with(TextureFlags::NO_MIPMAPS)
            .with(TextureFlags::CLAMP)
            .with(TextureFlags::NPOTS);
        let mut target = |label: &'static str, format: TextureFormat| {
            let id = device.create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed(label)),
                width: bw,
                height: bh,
                format,
                flags,
            })?;
            created.textures.push(id);
            device.validate_render_targets(&RenderTargets::color(RenderTarget::new(id)))?;
            Ok::<_, DeferredError>(id)
        };
        let global_illum_buffer =
            target("GlobalIllum Buffer", self.config.global_illum_buffer_format)?;
        let composition_buffer =
            target("GlobalIllum Composition", self.config.composition_buffer_format)?;

        let normals_texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("GlobalIllum Random Normals")),
            width: RANDOM_NORMALS_SIZE,
            height: RANDOM_NORMALS_SIZE,
            format: TextureFormat::Rgba8,
            flags: TextureFlags::NO_MIPMAPS,
        })?;
        created.textures.push(normals_texture);
        device.write_texture(
            normals_texture,
            bytemuck::cast_slice(&random_normals(RANDOM_NORMALS_SIZE, 0)),
        )?;

        let directions_texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("GlobalIllum Sample Directions")),
            width: max_samples,
            height: pattern * pattern,
            format: TextureFormat::Rgba32Float,
            flags: TextureFlags::NO_MIPMAPS
                .with(TextureFlags::CLAMP)
                .with(TextureFlags::NPOTS),
        })?;
        created.textures.push(directions_texture);
        let texels: Vec<[f32; 4]> = directions
            .into_iter()
            .map(|v| [v.x, v.y, v.z, 0.0])
            .collect();
        device.write_texture(directions_texture, bytemuck::cast_slice(&texels))?;

        let (env_w, env_h) = ENVIRONMENT_MAP_SIZE;
        let environment_map = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("GlobalIllum Environment Map")),
            width: env_w,
            height: env_h,
            format: TextureFormat::Rgba8,
            flags: TextureFlags::NO_MIPMAPS.with(TextureFlags::CLAMP),
        })?;
        created.textures.push(environment_map);
        device.write_texture(
            environment_map,
            bytemuck::cast_slice(&irradiance_environment_map(env_w, env_h)),
        )?;

        let params = GlobalIllumParams::from(&self.config);
        let data = bytemuck::bytes_of(&params);
        let parameters = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("GlobalIllum Parameters")),
                size: data.len() as u64,
                usage: BufferUsage::UNIFORM,
            },
            data,
        )?;
        created.buffers.push(parameters);

        let buffer_quad = FullscreenQuad::new(device, bw, bh, Vec2::ONE, Vec2::ZERO)?;
        created.buffers.push(buffer_quad.geometry());
        let screen_quad = FullscreenQuad::new(device, width, height, Vec2::ONE, Vec2::ZERO)?;
        created.buffers.push(screen_quad.geometry());

        Ok(GlobalIllumResources {
            screen_size: (width, height),
            global_illum_buffer,
            composition_buffer,
            random_normals: normals_texture,
            sample_directions: directions_texture,
            environment_map,
            parameters,
            buffer_quad,
            screen_quad,
        })
    }

    /// Rewrites the shader parameters from `config`. Buffers are kept; a
    /// changed resolution or format takes effect at the next
    /// [`initialize`](Self::initialize).
    pub fn set_config(
        &mut self,
        device: &dyn GraphicsDevice,
        config: GlobalIllumConfig,
    ) -> Result<(), DeferredError> {
        self.config = config;
        if let Some(r) = &self.resources {
            let params = GlobalIllumParams::from(&self.config);
            device.write_buffer(r.parameters, 0, bytemuck::bytes_of(&params))?;
        }
        Ok(())
    }

    fn input(&self, texture: TextureId) -> ShaderVarRef {
        ShaderVariable::new(self.names.input, ShaderValue::Texture(texture))
    }

    /// Records the GI, blur and composition passes. The composition adds
    /// onto `accumulation`. Returns the number of draw calls.
    pub fn render(
        &self,
        encoder: &mut dyn CommandEncoder,
        gbuffer: &GBuffer,
        accumulation: RenderTargets,
    ) -> Result<usize, DeferredError> {
        if !self.enabled {
            return Ok(0);
        }
        let r = self
            .resources
            .as_ref()
            .ok_or(DeferredError::NotInitialized("GlobalIllumRenderer"))?;

        let mut gbuffer_vars = ShaderVarContext::new();
        gbuffer.update_shader_vars(&mut gbuffer_vars);
        let mut vars: Vec<ShaderVarRef> = gbuffer_vars.iter().cloned().collect();
        vars.extend([
            ShaderVariable::new(self.names.random_normals, ShaderValue::Texture(r.random_normals)),
            ShaderVariable::new(
                self.names.sample_directions,
                ShaderValue::Texture(r.sample_directions),
            ),
            ShaderVariable::new(
                self.names.environment_map,
                ShaderValue::Texture(self.environment_map.unwrap_or(r.environment_map)),
            ),
            ShaderVariable::new(self.names.parameters, ShaderValue::Buffer(r.parameters)),
        ]);

        let [gi_label, blur_h_label, blur_v_label, composite_label] = GLOBAL_ILLUM_PASSES;
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(gi_label),
                targets: RenderTargets::color(RenderTarget::new(r.global_illum_buffer)),
                color_load: LoadOp::Clear(LinearRgba::TRANSPARENT),
                depth_load: LoadOp::Load,
            })?;
            r.buffer_quad
                .draw(pass.as_mut(), self.shaders.global_illum, MixMode::Copy, vars.clone());
        }
        let blurs = [
            (blur_h_label, self.shaders.blur_horizontal, r.global_illum_buffer, r.composition_buffer),
            (blur_v_label, self.shaders.blur_vertical, r.composition_buffer, r.global_illum_buffer),
        ];
        for (label, shader, source, destination) in blurs {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::load(
                label,
                RenderTargets::color(RenderTarget::new(destination)),
            ))?;
            let mut blur_vars = vars.clone();
            blur_vars.push(self.input(source));
            r.buffer_quad
                .draw(pass.as_mut(), shader, MixMode::Copy, blur_vars);
        }
        {
            let mut pass =
                encoder.begin_render_pass(&RenderPassDescriptor::load(composite_label, accumulation))?;
            let mut composite_vars = vars;
            composite_vars.push(self.input(r.global_illum_buffer));
            r.screen_quad.draw(
                pass.as_mut(),
                self.shaders.composition,
                MixMode::Add,
                composite_vars,
            );
        }
        Ok(GLOBAL_ILLUM_PASSES.len())
    }

    /// Destroys the buffers.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(r) = self.resources.take() {
            let mut created = CreatedResources {
                textures: vec![
                    r.global_illum_buffer,
                    r.composition_buffer,
                    r.random_normals,
                    r.sample_directions,
                    r.environment_map,
                ],
                buffers: vec![r.parameters],
            };
            created.release(device);
            r.buffer_quad.destroy(device);
            r.screen_quad.destroy(device);
        }
    }
}

#[derive(Debug, Default)]
struct CreatedResources {
    textures: Vec<TextureId>,
    buffers: Vec<BufferId>,
}

impl CreatedResources {
    fn release(&mut self, device: &dyn GraphicsDevice) {
        for id in self.textures.drain(..) {
            if let Err(e) = device.destroy_texture(id) {
                log::warn!("GlobalIllumRenderer: failed to release {id:?}: {e}");
            }
        }
        for id in self.buffers.drain(..) {
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("GlobalIllumRenderer: failed to release {id:?}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDevice;
    use approx::assert_relative_eq;

    #[test]
    fn halton_sequence_values() {
        assert_eq!(halton(2, 0), 0.0);
        assert_relative_eq!(halton(2, 1), 0.5);
        assert_relative_eq!(halton(2, 2), 0.25);
        assert_relative_eq!(halton(2, 3), 0.75);
        assert_relative_eq!(halton(3, 1), 1.0 / 3.0);
        assert_relative_eq!(halton(3, 5), 7.0 / 9.0);
        assert_relative_eq!(halton(5, 6), 0.2 + 1.0 / 25.0);
    }

    #[test]
    fn sample_directions_stay_in_the_hemisphere() {
        let samples = sample_directions(2, 16).expect("small kernel");
        assert_eq!(samples.len(), 64);
        assert!(samples
            .iter()
            .all(|s| s.length() <= 1.0 && s.z >= 0.0));
        assert_eq!(Some(samples), sample_directions(2, 16));
    }

    #[test]
    fn oversized_kernels_are_rejected() {
        assert_eq!(sample_direction_count(4, 128), Some(2048));
        assert_eq!(sample_direction_count(u32::MAX, 2), None);
        assert_eq!(sample_direction_count(65536, 1), None);
        assert_eq!(sample_direction_count(1024, 2048), None);
        assert!(sample_directions(70_000, 70_000).is_none());

        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut names = ShaderVarNames::new();
        let config = GlobalIllumConfig {
            pattern_size: 100_000,
            max_samples: 100_000,
            ..GlobalIllumConfig::default()
        };
        let mut gi = GlobalIllumRenderer::new(config, &mut registry, &mut names);
        assert!(matches!(
            gi.initialize(&device, 64, 32),
            Err(DeferredError::InvalidConfig(_))
        ));
        assert!(!gi.is_enabled());
        assert_eq!(device.created_texture_count(), 0);
    }

    #[test]
    fn environment_map_fades_from_sky_to_ground() {
        let map = irradiance_environment_map(4, 3);
        assert_eq!(map.len(), 12);
        assert_eq!(map[0], map[3]);
        assert!(map[0][2] > map[8][2]);
        assert_eq!(map[0][3], 255);
    }

    #[test]
    fn the_gi_pass_binds_the_irradiance_environment_map() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut names = ShaderVarNames::new();
        let mut gi =
            GlobalIllumRenderer::new(GlobalIllumConfig::default(), &mut registry, &mut names);
        assert_eq!(gi.irradiance_environment_map(), None);
        gi.initialize(&device, 64, 32).expect("init");
        let generated = gi.irradiance_environment_map().expect("generated map");
        let info = device.texture_info(generated).expect("info");
        assert_eq!((info.width, info.height), ENVIRONMENT_MAP_SIZE);
        let envmap = names.lookup("tex globalillum envmap").expect("interned");

        let render = |gi: &GlobalIllumRenderer| {
            device.clear_log();
            let mut encoder = device.create_command_encoder(None);
            gi.render(encoder.as_mut(), &GBuffer::new(), RenderTargets::SCREEN)
                .expect("render");
            device.draws_in(GLOBAL_ILLUM_PASSES[0])[0].inputs.clone()
        };
        assert!(render(&gi).contains(&(envmap, generated)));

        let custom = device
            .create_texture(&TextureDescriptor {
                label: None,
                width: 8,
                height: 4,
                format: TextureFormat::Rgba8,
                flags: TextureFlags::NO_MIPMAPS,
            })
            .expect("custom map");
        gi.set_irradiance_environment_map(Some(custom));
        assert!(render(&gi).contains(&(envmap, custom)));

        gi.release(&device);
        assert!(device.destroyed_textures().contains(&generated));
        assert!(!device.destroyed_textures().contains(&custom));
        assert_eq!(device.live_texture_count(), 1);
    }

    #[test]
    fn random_normals_are_deterministic() {
        let a = random_normals(4, 0);
        assert_eq!(a.len(), 16);
        assert_eq!(a, random_normals(4, 0));
        assert_ne!(a, random_normals(4, 1));
    }

    #[test]
    fn config_reads_keys_under_the_prefix() {
        let mut store = ConfigStore::new();
        let p = GlobalIllumConfig::PREFIX;
        store.set(format!("{p}.BufferResolution"), "half");
        store.set(format!("{p}.SSDO.SampleCount"), 500);
        store.set(format!("{p}.SSDO.SampleRadius"), 2.5);
        store.set(format!("{p}.GlobalIllumBufferFormat"), "rgba32_f");
        store.set(format!("{p}.CompositionBufferFormat"), "nonsense");
        let config = GlobalIllumConfig::from_config(&store, p);
        assert!(config.enable);
        assert_eq!(config.buffer_resolution, BufferResolution::Half);
        assert_eq!(config.effective_sample_count(), 128);
        assert_eq!(config.sample_radius, 2.5);
        assert_eq!(config.global_illum_buffer_format, TextureFormat::Rgba32Float);
        assert_eq!(config.composition_buffer_format, TextureFormat::Rgb16Float);
        assert_eq!(config.blur_kernel_size, 3);
        assert_eq!(BufferResolution::Quarter.scale(100, 6), (25, 1));
    }

    #[test]
    fn passes_run_in_order_and_buffers_follow_the_resolution() {
        let device = RecordingDevice::default();
        let mut registry = ShaderRegistry::new();
        let mut names = ShaderVarNames::new();
        let config = GlobalIllumConfig {
            buffer_resolution: BufferResolution::Half,
            ..GlobalIllumConfig::default()
        };
        let mut gi = GlobalIllumRenderer::new(config, &mut registry, &mut names);
        gi.initialize(&device, 64, 32).expect("init");
        let buffer = gi.global_illum_buffer().expect("buffer");
        let info = device.texture_info(buffer).expect("info");
        assert_eq!((info.width, info.height), (32, 16));
        assert!(!gi.resize(&device, 64, 32).expect("same size"));

        let accumulation = RenderTargets::color(RenderTarget::new(TextureId(99)));
        let mut encoder = device.create_command_encoder(None);
        let draws = gi
            .render(encoder.as_mut(), &GBuffer::new(), accumulation)
            .expect("render");
        assert_eq!(draws, 4);
        assert_eq!(device.pass_labels(), GLOBAL_ILLUM_PASSES.to_vec());
        let passes = device.passes();
        assert_eq!(passes[3].targets, accumulation);
        assert_eq!(passes[3].draws[0].mix_mode, MixMode::Add);
        let input = names.lookup("tex global illumination").expect("interned");
        assert!(passes[1].draws[0].inputs.contains(&(input, buffer)));
        assert_eq!(
            passes[2].targets,
            RenderTargets::color(RenderTarget::new(buffer))
        );

        gi.release(&device);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn failures_disable_the_stage() {
        let device = RecordingDevice::default();
        device.fail_validation(true);
        let mut registry = ShaderRegistry::new();
        let mut names = ShaderVarNames::new();
        let mut gi =
            GlobalIllumRenderer::new(GlobalIllumConfig::default(), &mut registry, &mut names);
        assert!(gi.initialize(&device, 64, 32).is_err());
        assert!(!gi.is_enabled());
        assert_eq!(device.live_texture_count(), 0);
        let mut encoder = device.create_command_encoder(None);
        assert_eq!(
            gi.render(encoder.as_mut(), &GBuffer::new(), RenderTargets::SCREEN),
            Ok(0)
        );
    }
}
