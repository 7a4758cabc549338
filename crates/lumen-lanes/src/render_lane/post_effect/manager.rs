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
use super::{
    LayerId, LayerInput, LayerOptions, PostEffectError, DEFAULT_INPUT_SV, PIXEL_SIZE_SV,
    POST_EFFECT_PASS,
};
use crate::render_lane::draw::{resolve_variables, FullscreenQuad};
use lumen_core::math::{Vec2, Vec4};
use lumen_core::renderer::{
    CommandEncoder, GraphicsDevice, LoadOp, MixMode, RenderPassDescriptor, RenderTarget,
    RenderTargets, ShaderId, ShaderValue, ShaderVarContext, ShaderVarName, ShaderVarNames,
    ShaderVarRef, ShaderVariable, TextureDescriptor, TextureFlags, TextureFormat, TextureId,
    TextureInfo, TextureKind,
};
use std::borrow::Cow;
use std::sync::Arc;

/// Maps texture coordinates of an image onto the texture holding it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoordCorrection {
    /// Texture coordinates spanned by the image.
    pub scale: Vec2,
    /// Texture coordinates of the image origin.
    pub offset: Vec2,
}

impl TexCoordCorrection {
    /// The image fills the texture.
    pub const IDENTITY: Self = Self {
        scale: Vec2::ONE,
        offset: Vec2::ZERO,
    };

    /// The correction for a `width` × `height` image stored in a texture
    /// the device allocated as `info`.
    ///
    /// Rectangle textures are addressed in pixels. A texture that had to be
    /// rounded up holds the image in its top-left corner.
    pub fn for_texture(info: &TextureInfo, width: u32, height: u32) -> Self {
        match info.kind {
            TextureKind::Rect => Self {
                scale: Vec2::new(width as f32, height as f32),
                offset: Vec2::ZERO,
            },
            TextureKind::Normalized2D if !info.flags.contains(TextureFlags::NPOTS) => {
                let scale = Vec2::new(
                    width as f32 / info.width as f32,
                    height as f32 / info.height as f32,
                );
                Self {
                    scale,
                    offset: Vec2::new(0.0, 1.0 - scale.y),
                }
            }
            TextureKind::Normalized2D => Self::IDENTITY,
        }
    }

    /// The size of one image pixel in texture coordinates.
    pub fn pixel_size(&self, width: u32, height: u32) -> Vec2 {
        Vec2::new(
            self.scale.x / width.max(1) as f32,
            self.scale.y / height.max(1) as f32,
        )
    }
}

/// The output textures chosen for a layer chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDistribution {
    /// Per layer, the index of its output texture in its bucket. The last
    /// layer writes to the manager output and has none.
    pub outputs: Vec<Option<usize>>,
    /// Per bucket, the number of textures needed.
    pub bucket_sizes: Vec<usize>,
}

/// Chooses an output texture for every layer but the last.
///
/// `buckets[l]` is the bucket of layer `l`, `inputs[l]` the layers it
/// reads. A layer takes the first texture of its bucket not live at that
/// layer; its texture stays live until the last layer reading it.
/// `exclusive[l]` gives layer `l` a texture of its own.
pub fn distribute_textures(
    buckets: &[usize],
    inputs: &[Vec<usize>],
    exclusive: &[bool],
) -> TextureDistribution {
    let n = buckets.len();
    let bucket_count = buckets.iter().max().map_or(0, |b| b + 1);
    // live[bucket][texture][layer]
    let mut live: Vec<Vec<Vec<bool>>> = vec![Vec::new(); bucket_count];
    let mut outputs = vec![None; n];

    for l in 0..n.saturating_sub(1) {
        let last_read = if exclusive[l] {
            n - 1
        } else {
            (l + 1..n)
                .filter(|c| inputs[*c].contains(&l))
                .max()
                .unwrap_or(l)
        };
        let textures = &mut live[buckets[l]];
        let free = if exclusive[l] {
            None
        } else {
            textures.iter().position(|t| !t[l])
        };
        let t = free.unwrap_or_else(|| {
            textures.push(vec![false; n]);
            textures.len() - 1
        });
        for slot in &mut textures[t][l..=last_read] {
            *slot = true;
        }
        outputs[l] = Some(t);
    }

    TextureDistribution {
        outputs,
        bucket_sizes: live.iter().map(Vec::len).collect(),
    }
}

#[derive(Debug)]
struct Layer {
    shader: Option<ShaderId>,
    options: LayerOptions,
    inputs: Vec<LayerInput>,
    variables: ShaderVarContext,
    bucket: usize,
    output: Option<usize>,
    quad: Option<FullscreenQuad>,
}

impl Layer {
    fn new(shader: Option<ShaderId>, options: LayerOptions, inputs: Vec<LayerInput>) -> Self {
        Self {
            shader,
            options,
            inputs,
            variables: ShaderVarContext::new(),
            bucket: 0,
            output: None,
            quad: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BucketTexture {
    texture: TextureId,
    info: TextureInfo,
    correction: TexCoordCorrection,
}

#[derive(Debug)]
struct Bucket {
    options: LayerOptions,
    width: u32,
    height: u32,
    textures: Vec<BucketTexture>,
}

/// Runs a chain of full-screen shader layers over the rendered scene.
///
/// Layer 0 ([`LayerId::SCREEN`]) stands for the scene itself and has no
/// shader. Textures are allocated by [`PostEffectManager::setup_view`] and
/// only reallocated when the view size or the layers change.
#[derive(Debug)]
pub struct PostEffectManager {
    device: Option<Arc<dyn GraphicsDevice>>,
    layers: Vec<Layer>,
    buckets: Vec<Bucket>,
    format: TextureFormat,
    keep_all_intermediates: bool,
    dimensions: Option<(u32, u32)>,
    output_target: Option<RenderTarget>,
    chained: Option<Box<PostEffectManager>>,
    default_input: ShaderVarName,
    pixel_size: ShaderVarName,
}

impl PostEffectManager {
    /// Creates a manager without layers.
    pub fn new(names: &mut ShaderVarNames) -> Self {
        Self {
            device: None,
            layers: vec![Layer::new(None, LayerOptions::default(), Vec::new())],
            buckets: Vec::new(),
            format: TextureFormat::Argb8,
            keep_all_intermediates: false,
            dimensions: None,
            output_target: None,
            chained: None,
            default_input: names.intern(DEFAULT_INPUT_SV),
            pixel_size: names.intern(PIXEL_SIZE_SV),
        }
    }

    /// Captures the device textures are created on. Nothing is allocated
    /// until [`PostEffectManager::setup_view`].
    pub fn initialize(&mut self, device: Arc<dyn GraphicsDevice>) {
        if let Some(chained) = self.chained.as_mut() {
            if chained.device.is_none() {
                chained.initialize(device.clone());
            }
        }
        self.device = Some(device);
    }

    /// Appends a layer reading the previous layer through [`DEFAULT_INPUT_SV`].
    pub fn add_layer(&mut self, shader: ShaderId, options: LayerOptions) -> LayerId {
        let previous = LayerId(self.layers.len() - 1);
        let input = LayerInput {
            layer: previous,
            texture: self.default_input,
            texcoord: None,
        };
        self.push_layer(shader, options, vec![input])
    }

    /// Appends a layer reading `inputs`, which must all be earlier layers.
    pub fn add_layer_with_inputs(
        &mut self,
        shader: ShaderId,
        options: LayerOptions,
        inputs: Vec<LayerInput>,
    ) -> Result<LayerId, PostEffectError> {
        let id = LayerId(self.layers.len());
        if let Some(bad) = inputs.iter().find(|i| i.layer >= id) {
            log::error!("PostEffectManager: layer {id:?} cannot read {:?}", bad.layer);
            return Err(PostEffectError::InvalidInput {
                layer: id,
                input: bad.layer,
            });
        }
        Ok(self.push_layer(shader, options, inputs))
    }

    fn push_layer(
        &mut self,
        shader: ShaderId,
        options: LayerOptions,
        inputs: Vec<LayerInput>,
    ) -> LayerId {
        self.layers.push(Layer::new(Some(shader), options, inputs));
        self.invalidate();
        LayerId(self.layers.len() - 1)
    }

    /// Variables bound when drawing `layer`, overriding the generated inputs.
    pub fn layer_variables_mut(&mut self, layer: LayerId) -> Option<&mut ShaderVarContext> {
        self.layers.get_mut(layer.0).map(|l| &mut l.variables)
    }

    /// Removes every layer but the scene.
    pub fn clear_layers(&mut self) {
        self.layers.truncate(1);
        self.invalidate();
    }

    /// Number of shader layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len() - 1
    }

    /// The input variable used by [`PostEffectManager::add_layer`].
    pub fn default_input_name(&self) -> ShaderVarName {
        self.default_input
    }

    /// The texture `layer` writes, once set up. The last layer writes the
    /// manager output and has none.
    pub fn layer_output(&self, layer: LayerId) -> Option<RenderTarget> {
        self.output_texture(layer).map(|t| RenderTarget::new(t.texture))
    }

    fn output_texture(&self, layer: LayerId) -> Option<&BucketTexture> {
        let layer = self.layers.get(layer.0)?;
        self.buckets.get(layer.bucket)?.textures.get(layer.output?)
    }

    /// Gives every layer its own texture, keeping all intermediate results
    /// readable after drawing.
    pub fn set_keep_all_intermediates(&mut self, keep: bool) {
        if self.keep_all_intermediates != keep {
            self.keep_all_intermediates = keep;
            self.invalidate();
        }
    }

    /// The format of intermediate textures.
    pub fn set_intermediate_target_format(&mut self, format: TextureFormat) {
        if self.format != format {
            self.format = format;
            self.invalidate();
        }
    }

    /// The format of intermediate textures.
    pub fn intermediate_target_format(&self) -> TextureFormat {
        self.format
    }

    /// Where the last layer writes when no manager is chained. `None` is the
    /// screen.
    pub fn set_output_target(&mut self, target: Option<RenderTarget>) {
        self.output_target = target;
    }

    /// Chains `next` after this manager: the last layer writes `next`'s
    /// screen target and drawing continues with `next`. Returns the manager
    /// previously chained.
    pub fn set_chained_output(
        &mut self,
        next: Option<PostEffectManager>,
    ) -> Option<PostEffectManager> {
        let mut next = next.map(Box::new);
        if let (Some(next), Some(device)) = (next.as_mut(), self.device.as_ref()) {
            if next.device.is_none() {
                next.initialize(device.clone());
            }
        }
        std::mem::replace(&mut self.chained, next).map(|b| *b)
    }

    /// The chained manager.
    pub fn chained_output(&self) -> Option<&PostEffectManager> {
        self.chained.as_deref()
    }

    /// The chained manager, mutably.
    pub fn chained_output_mut(&mut self) -> Option<&mut PostEffectManager> {
        self.chained.as_deref_mut()
    }

    fn effective_output(&self) -> Option<RenderTarget> {
        self.chained
            .as_ref()
            .and_then(|c| c.screen_target())
            .or(self.output_target)
    }

    /// The target the scene has to be rendered into: the input texture of
    /// the first layer, or the manager output when there are no layers.
    pub fn screen_target(&self) -> Option<RenderTarget> {
        if self.layers.len() > 1 {
            self.layer_output(LayerId::SCREEN)
        } else {
            self.effective_output()
        }
    }

    fn invalidate(&mut self) {
        if let Some(device) = self.device.clone() {
            self.release_resources(device.as_ref());
        }
        self.dimensions = None;
    }

    /// Prepares the textures for a `width` × `height` view. Returns `true`
    /// when anything was reallocated.
    pub fn setup_view(&mut self, width: u32, height: u32) -> Result<bool, PostEffectError> {
        let device = self.device.clone().ok_or(PostEffectError::NotInitialized)?;
        let chained_changed = match self.chained.as_mut() {
            Some(chained) => chained.setup_view(width, height)?,
            None => false,
        };
        if self.dimensions == Some((width, height)) {
            return Ok(chained_changed);
        }

        self.release_resources(device.as_ref());
        if self.layers.len() > 1 {
            if let Err(e) = self.allocate(device.as_ref(), width, height) {
                log::error!("PostEffectManager: cannot allocate {width}x{height} targets: {e}");
                self.release_resources(device.as_ref());
                return Err(e);
            }
        }
        self.dimensions = Some((width, height));
        log::debug!(
            "PostEffectManager: set up {} layers for {width}x{height}",
            self.layer_count()
        );
        Ok(true)
    }

    fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), PostEffectError> {
        for i in 0..self.layers.len() {
            let options = self.layers[i].options;
            let bucket = match self.buckets.iter().position(|b| b.options == options) {
                Some(b) => b,
                None => {
                    self.buckets.push(Bucket {
                        options,
                        width: (width >> options.downsample).max(1),
                        height: (height >> options.downsample).max(1),
                        textures: Vec::new(),
                    });
                    self.buckets.len() - 1
                }
            };
            self.layers[i].bucket = bucket;
        }

        let buckets: Vec<usize> = self.layers.iter().map(|l| l.bucket).collect();
        let inputs: Vec<Vec<usize>> = self
            .layers
            .iter()
            .map(|l| l.inputs.iter().map(|i| i.layer.0).collect())
            .collect();
        let exclusive: Vec<bool> = self
            .layers
            .iter()
            .map(|l| self.keep_all_intermediates || l.options.no_texture_reuse)
            .collect();
        let distribution = distribute_textures(&buckets, &inputs, &exclusive);
        for (layer, output) in self.layers.iter_mut().zip(&distribution.outputs) {
            layer.output = *output;
        }

        for (bucket, &count) in self.buckets.iter_mut().zip(&distribution.bucket_sizes) {
            let mut flags = TextureFlags::RENDER_TARGET
                | TextureFlags::NPOTS
                | TextureFlags::CLAMP
                | TextureFlags::SCALE_UP;
            if !bucket.options.mipmap {
                flags.insert(TextureFlags::NO_MIPMAPS);
            }
            for _ in 0..count {
                let texture = device.create_texture(&TextureDescriptor {
                    label: Some(Cow::Borrowed("post effect target")),
                    width: bucket.width,
                    height: bucket.height,
                    format: self.format,
                    flags,
                })?;
                let info = match device.texture_info(texture) {
                    Ok(info) => info,
                    Err(e) => {
                        if let Err(destroy) = device.destroy_texture(texture) {
                            log::warn!(
                                "PostEffectManager: failed to destroy {texture:?}: {destroy}"
                            );
                        }
                        return Err(e.into());
                    }
                };
                bucket.textures.push(BucketTexture {
                    texture,
                    info,
                    correction: TexCoordCorrection::for_texture(&info, bucket.width, bucket.height),
                });
            }
        }

        let last = self.layers.len() - 1;
        for l in 1..=last {
            let input = self.layers[l]
                .inputs
                .first()
                .map_or(TexCoordCorrection::IDENTITY, |i| self.correction_of(i.layer));
            let quad = if l == last {
                FullscreenQuad::new(device, width, height, input.scale, input.offset)?
            } else {
                let bucket = &self.buckets[self.layers[l].bucket];
                let target = self
                    .output_texture(LayerId(l))
                    .map_or((bucket.width, bucket.height), |t| (t.info.width, t.info.height));
                FullscreenQuad::new(device, bucket.width, bucket.height, input.scale, input.offset)?
                    .in_target(target.0, target.1)
            };
            self.layers[l].quad = Some(quad);
        }
        Ok(())
    }

    fn correction_of(&self, layer: LayerId) -> TexCoordCorrection {
        self.output_texture(layer)
            .map_or(TexCoordCorrection::IDENTITY, |t| t.correction)
    }

    fn release_resources(&mut self, device: &dyn GraphicsDevice) {
        for bucket in self.buckets.drain(..) {
            for t in bucket.textures {
                if let Err(e) = device.destroy_texture(t.texture) {
                    log::warn!("PostEffectManager: failed to destroy {:?}: {e}", t.texture);
                }
            }
        }
        for layer in &mut self.layers {
            layer.output = None;
            if let Some(quad) = layer.quad.take() {
                quad.destroy(device);
            }
        }
        self.dimensions = None;
    }

    fn layer_variables(&self, l: usize) -> Vec<ShaderVarRef> {
        let layer = &self.layers[l];
        let mut generated = Vec::new();
        for input in &layer.inputs {
            if let Some(target) = self.layer_output(input.layer) {
                generated.push(Some(ShaderVariable::new(
                    input.texture,
                    ShaderValue::Texture(target.texture),
                )));
            }
            if let Some(name) = input.texcoord {
                let c = self.correction_of(input.layer);
                generated.push(Some(ShaderVariable::new(
                    name,
                    ShaderValue::Vec4(Vec4::new(c.scale.x, c.scale.y, c.offset.x, c.offset.y)),
                )));
            }
        }
        let pixel_size = match self.buckets.get(layer.bucket) {
            Some(bucket) => {
                let correction = bucket
                    .textures
                    .first()
                    .map_or(TexCoordCorrection::IDENTITY, |t| t.correction);
                correction.pixel_size(bucket.width, bucket.height)
            }
            None => Vec2::ONE,
        };
        generated.push(Some(ShaderVariable::new(
            self.pixel_size,
            ShaderValue::Vec2(pixel_size),
        )));
        let user: Vec<ShaderVarRef> = layer.variables.iter().cloned().collect();
        resolve_variables(&generated, &user)
    }

    /// Draws every layer in order, then the chained manager. Each layer is
    /// one pass with one draw.
    pub fn draw_post_effects(
        &self,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), PostEffectError> {
        let last = self.layers.len() - 1;
        if last > 0 && self.dimensions.is_none() {
            return Err(PostEffectError::NotSetUp);
        }
        for l in 1..=last {
            let layer = &self.layers[l];
            let (Some(shader), Some(quad)) = (layer.shader, layer.quad.as_ref()) else {
                return Err(PostEffectError::NotSetUp);
            };
            let target = if l == last {
                self.effective_output()
            } else {
                self.layer_output(LayerId(l))
            };
            let descriptor = RenderPassDescriptor {
                label: Some(POST_EFFECT_PASS),
                targets: target.map_or(RenderTargets::SCREEN, RenderTargets::color),
                color_load: LoadOp::Load,
                depth_load: LoadOp::Clear(1.0),
            };
            let mut pass = encoder.begin_render_pass(&descriptor)?;
            quad.draw(pass.as_mut(), shader, MixMode::Copy, self.layer_variables(l));
        }
        log::trace!("PostEffectManager: drew {last} layers");
        if let Some(chained) = &self.chained {
            chained.draw_post_effects(encoder)?;
        }
        Ok(())
    }
}

impl Drop for PostEffectManager {
    fn drop(&mut self) {
        if let Some(device) = self.device.clone() {
            self.release_resources(device.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDevice;
    use lumen_core::renderer::{DeviceCapabilities, RenderTargetAttachment, ShaderRegistry};

    fn setup(
        capabilities: DeviceCapabilities,
        layers: usize,
    ) -> (RecordingDevice, PostEffectManager, ShaderVarNames) {
        let device = RecordingDevice::new(capabilities);
        let mut names = ShaderVarNames::new();
        let mut manager = PostEffectManager::new(&mut names);
        manager.initialize(Arc::new(device.clone()));
        let mut registry = ShaderRegistry::new();
        for i in 0..layers {
            let shader = registry.register(&format!("effect{i}"));
            manager.add_layer(shader, LayerOptions::default());
        }
        (device, manager, names)
    }

    fn draw(device: &RecordingDevice, manager: &PostEffectManager) {
        let mut encoder = device.create_command_encoder(None);
        manager
            .draw_post_effects(encoder.as_mut())
            .expect("post effects");
        device.submit_command_buffer(encoder.finish());
    }

    #[test]
    fn layers_ping_pong_and_end_on_the_screen() {
        for n in 1..=5 {
            let (device, mut manager, _) = setup(DeviceCapabilities::default(), n);
            assert!(manager.setup_view(64, 48).expect("setup"));
            let scene = manager.screen_target().expect("scene target").texture;
            draw(&device, &manager);

            let passes = device.passes();
            assert_eq!(passes.len(), n);
            let other = passes[0]
                .targets
                .get(RenderTargetAttachment::Color0)
                .map(|t| t.texture);
            for (i, pass) in passes.iter().enumerate() {
                let (read, write) = if i % 2 == 0 {
                    (Some(scene), other)
                } else {
                    (other, Some(scene))
                };
                assert_eq!(pass.draws.len(), 1);
                assert_eq!(Some(pass.draws[0].inputs[0].1), read, "layer {i} of {n}");
                assert_eq!(pass.depth_load, LoadOp::Clear(1.0));
                if i + 1 < n {
                    let write = write.expect("intermediate texture");
                    assert_eq!(pass.targets, RenderTargets::color(RenderTarget::new(write)));
                } else {
                    assert!(pass.targets.is_screen());
                }
            }
            assert_eq!(device.live_texture_count(), n.min(2));
        }
    }

    #[test]
    fn without_layers_the_scene_goes_straight_to_the_output() {
        let (device, mut manager, _) = setup(DeviceCapabilities::default(), 0);
        assert!(manager.setup_view(64, 48).expect("setup"));
        assert_eq!(manager.screen_target(), None);
        let target = RenderTarget::new(TextureId(42));
        manager.set_output_target(Some(target));
        assert_eq!(manager.screen_target(), Some(target));
        draw(&device, &manager);
        assert!(device.passes().is_empty());
        assert_eq!(device.created_texture_count(), 0);
    }

    #[test]
    fn textures_are_only_reallocated_on_resize() {
        let (device, mut manager, _) = setup(DeviceCapabilities::default(), 3);
        assert!(manager.setup_view(64, 48).expect("setup"));
        assert_eq!(device.created_texture_count(), 2);
        assert!(!manager.setup_view(64, 48).expect("setup"));
        assert_eq!(device.created_texture_count(), 2);
        assert!(manager.setup_view(128, 48).expect("setup"));
        assert_eq!(device.created_texture_count(), 4);
        assert_eq!(device.live_texture_count(), 2);
        assert_eq!(device.destroyed_textures().len(), 2);

        manager.clear_layers();
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn coordinates_are_corrected_for_the_allocated_texture() {
        let pot_only = DeviceCapabilities {
            supports_npot: false,
            ..DeviceCapabilities::default()
        };
        let rect = DeviceCapabilities {
            supports_npot: false,
            supports_rect_textures: true,
            ..DeviceCapabilities::default()
        };
        let cases = [
            (DeviceCapabilities::default(), Vec4::new(1.0, 1.0, 0.0, 0.0)),
            (pot_only, Vec4::new(100.0 / 128.0, 60.0 / 64.0, 0.0, 1.0 - 60.0 / 64.0)),
            (rect, Vec4::new(100.0, 60.0, 0.0, 0.0)),
        ];
        for (capabilities, expected) in cases {
            let device = RecordingDevice::new(capabilities);
            let mut names = ShaderVarNames::new();
            let texcoord = names.intern("texcoord diffuse");
            let mut manager = PostEffectManager::new(&mut names);
            manager.initialize(Arc::new(device.clone()));
            let input = LayerInput {
                layer: LayerId::SCREEN,
                texture: manager.default_input_name(),
                texcoord: Some(texcoord),
            };
            manager
                .add_layer_with_inputs(ShaderId(0), LayerOptions::default(), vec![input])
                .expect("layer");
            manager.setup_view(100, 60).expect("setup");
            draw(&device, &manager);

            let drawn = device.draws_in(POST_EFFECT_PASS);
            assert_eq!(drawn[0].variable(texcoord), Some(&ShaderValue::Vec4(expected)));
            let pixel = names.lookup(PIXEL_SIZE_SV).expect("interned");
            let expected_pixel = Vec2::new(expected.x / 100.0, expected.y / 60.0);
            assert_eq!(drawn[0].variable(pixel), Some(&ShaderValue::Vec2(expected_pixel)));
        }
    }

    #[test]
    fn distribution_keeps_textures_alive_until_their_last_reader() {
        // Layer 3 combines the scene with the result of layers 1 and 2.
        let inputs = vec![vec![], vec![0], vec![1], vec![0, 2]];
        let d = distribute_textures(&[0, 0, 0, 0], &inputs, &[false; 4]);
        assert_eq!(d.outputs, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(d.bucket_sizes, vec![3]);

        let chain = vec![vec![], vec![0], vec![1], vec![2], vec![3]];
        let d = distribute_textures(&[0; 5], &chain, &[false; 5]);
        assert_eq!(d.outputs, vec![Some(0), Some(1), Some(0), Some(1), None]);
        let d = distribute_textures(&[0; 5], &chain, &[true; 5]);
        assert_eq!(d.outputs, vec![Some(0), Some(1), Some(2), Some(3), None]);

        // A downsampled layer lives in its own bucket.
        let d = distribute_textures(&[0, 1, 0, 0], &chain[..4], &[false; 4]);
        assert_eq!(d.outputs, vec![Some(0), Some(0), Some(0), None]);
        assert_eq!(d.bucket_sizes, vec![1, 1]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (_, mut manager, _) = setup(DeviceCapabilities::default(), 1);
        let input = LayerInput {
            layer: LayerId(2),
            texture: manager.default_input_name(),
            texcoord: None,
        };
        assert_eq!(
            manager.add_layer_with_inputs(ShaderId(0), LayerOptions::default(), vec![input]),
            Err(PostEffectError::InvalidInput {
                layer: LayerId(2),
                input: LayerId(2),
            })
        );
    }

    #[test]
    fn chained_managers_draw_in_sequence() {
        let (device, mut first, mut names) = setup(DeviceCapabilities::default(), 1);
        let mut second = PostEffectManager::new(&mut names);
        second.add_layer(ShaderId(7), LayerOptions::default());
        assert!(first.set_chained_output(Some(second)).is_none());

        first.setup_view(32, 32).expect("setup");
        let handoff = first
            .chained_output()
            .and_then(PostEffectManager::screen_target)
            .expect("chained input");
        draw(&device, &first);

        let passes = device.passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].targets, RenderTargets::color(handoff));
        assert_eq!(passes[1].draws[0].shader, ShaderId(7));
        assert_eq!(passes[1].draws[0].inputs[0].1, handoff.texture);
        assert!(passes[1].targets.is_screen());
    }

    #[test]
    fn unreadable_targets_are_destroyed_on_failure() {
        let (device, mut manager, _) = setup(DeviceCapabilities::default(), 3);
        device.fail_texture_info(true);
        assert!(manager.setup_view(64, 48).is_err());
        assert!(device.created_texture_count() > 0);
        assert_eq!(device.live_texture_count(), 0);

        device.fail_texture_info(false);
        assert!(manager.setup_view(64, 48).expect("setup"));
        assert!(device.live_texture_count() > 0);
    }

    #[test]
    fn drawing_requires_setup() {
        let mut names = ShaderVarNames::new();
        let mut manager = PostEffectManager::new(&mut names);
        assert_eq!(manager.setup_view(8, 8), Err(PostEffectError::NotInitialized));
        let (device, mut manager, _) = setup(DeviceCapabilities::default(), 1);
        let mut encoder = device.create_command_encoder(None);
        assert_eq!(
            manager.draw_post_effects(encoder.as_mut()),
            Err(PostEffectError::NotSetUp)
        );
        manager.setup_view(8, 8).expect("setup");
    }
}
