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
//! Test support: a graphics device that records passes and draws, and small
//! scene fixtures.
//!
//! Only compiled for this crate's tests and with the `test-support` feature.

use lumen_core::math::{Aabb, LinearRgba, Mat4, Transform, Vec3};
use lumen_core::renderer::{
    BufferDescriptor, BufferId, CommandBufferId, CommandEncoder, CullMode, DeviceCapabilities,
    DrawCall, GraphicsDevice, LoadOp, Material, MixMode, OcclusionQueryId, PreCopy, RenderMesh,
    RenderPass,
    RenderPassDescriptor, RenderTargets, ResourceError, ShaderId, ShaderValue, ShaderVarName,
    TextureDescriptor, TextureFlags, TextureId, TextureInfo, TextureKind, ZBufMode,
    SHADER_TYPE_GBUFFER_FILL, SHADER_TYPE_STANDARD,
};
use lumen_core::scene::{
    Camera, MeshWrapper, MeshWrapperId, RenderPriority, RenderView, Sector, SectorId, VisCallback,
    VisCuller,
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A draw call as seen by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    /// The geometry drawn.
    pub geometry: BufferId,
    /// The shader used.
    pub shader: ShaderId,
    /// The shader pass.
    pub pass: u32,
    /// Object-to-world transform.
    pub object_to_world: Transform,
    /// Depth mode.
    pub z_mode: ZBufMode,
    /// Blending.
    pub mix_mode: MixMode,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Texture variables bound to the draw.
    pub inputs: Vec<(ShaderVarName, TextureId)>,
    /// Every variable bound to the draw.
    pub variables: Vec<(ShaderVarName, ShaderValue)>,
    /// The occlusion query running when the draw was recorded.
    pub query: Option<OcclusionQueryId>,
}

impl RecordedDraw {
    /// The value bound for `name`.
    pub fn variable(&self, name: ShaderVarName) -> Option<&ShaderValue> {
        self.variables
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

/// A render pass as seen by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    /// The pass label.
    pub label: String,
    /// The attachments.
    pub targets: RenderTargets,
    /// Color load operation.
    pub color_load: LoadOp<LinearRgba>,
    /// Depth load operation.
    pub depth_load: LoadOp<f32>,
    /// The last world-to-camera transform set.
    pub world_to_camera: Option<Transform>,
    /// The last projection set.
    pub projection: Option<Mat4>,
    /// Render-target copies requested in the pass.
    pub copies: Vec<PreCopy>,
    /// Draws in submission order.
    pub draws: Vec<RecordedDraw>,
}

#[derive(Debug, Default)]
struct DeviceState {
    textures: HashMap<TextureId, TextureInfo>,
    next_texture: usize,
    destroyed_textures: Vec<TextureId>,
    texture_data: HashMap<TextureId, Vec<u8>>,
    buffers: HashMap<BufferId, Vec<u8>>,
    next_buffer: usize,
    passes: Vec<RecordedPass>,
    submitted: Vec<CommandBufferId>,
    next_command_buffer: u64,
    fail_validation: bool,
    fail_texture_creation: bool,
    fail_texture_info: bool,
    failing_pass: Option<String>,
    // None until the query has been ended once.
    queries: HashMap<OcclusionQueryId, Option<bool>>,
    next_query: u64,
    occluded: HashSet<BufferId>,
}

fn lock(state: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`GraphicsDevice`] that allocates nothing and records everything.
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    capabilities: DeviceCapabilities,
    state: Arc<Mutex<DeviceState>>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(DeviceCapabilities::default())
    }
}

impl RecordingDevice {
    /// Creates a device with the given capabilities.
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    /// Makes `validate_render_targets` fail.
    pub fn fail_validation(&self, fail: bool) {
        lock(&self.state).fail_validation = fail;
    }

    /// Makes texture creation fail.
    pub fn fail_texture_creation(&self, fail: bool) {
        lock(&self.state).fail_texture_creation = fail;
    }

    /// Makes `texture_info` fail for every texture.
    pub fn fail_texture_info(&self, fail: bool) {
        lock(&self.state).fail_texture_info = fail;
    }

    /// Makes beginning any pass whose label contains `label` fail.
    pub fn fail_pass(&self, label: Option<&str>) {
        lock(&self.state).failing_pass = label.map(str::to_string);
    }

    /// Every pass recorded so far.
    pub fn passes(&self) -> Vec<RecordedPass> {
        lock(&self.state).passes.clone()
    }

    /// The labels of the recorded passes.
    pub fn pass_labels(&self) -> Vec<String> {
        lock(&self.state)
            .passes
            .iter()
            .map(|p| p.label.clone())
            .collect()
    }

    /// The draws of every pass labelled `label`.
    pub fn draws_in(&self, label: &str) -> Vec<RecordedDraw> {
        lock(&self.state)
            .passes
            .iter()
            .filter(|p| p.label == label)
            .flat_map(|p| p.draws.iter().cloned())
            .collect()
    }

    /// Forgets recorded passes.
    pub fn clear_log(&self) {
        lock(&self.state).passes.clear();
    }

    /// Number of textures created so far.
    pub fn created_texture_count(&self) -> usize {
        lock(&self.state).next_texture
    }

    /// Number of live textures.
    pub fn live_texture_count(&self) -> usize {
        lock(&self.state).textures.len()
    }

    /// Textures destroyed so far, in order.
    pub fn destroyed_textures(&self) -> Vec<TextureId> {
        lock(&self.state).destroyed_textures.clone()
    }

    /// The data last uploaded into a texture.
    pub fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        lock(&self.state).texture_data.get(&id).cloned()
    }

    /// Number of live buffers.
    pub fn live_buffer_count(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    /// The contents of a buffer.
    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        lock(&self.state).buffers.get(&id).cloned()
    }

    /// Number of submitted command buffers.
    pub fn submitted_count(&self) -> usize {
        lock(&self.state).submitted.len()
    }

    /// Marks `geometry` as hidden behind other geometry: queries whose draws
    /// are all occluded report no samples.
    pub fn set_occluded(&self, geometry: BufferId, occluded: bool) {
        let mut state = lock(&self.state);
        if occluded {
            state.occluded.insert(geometry);
        } else {
            state.occluded.remove(&geometry);
        }
    }

    /// Number of live occlusion queries.
    pub fn live_query_count(&self) -> usize {
        lock(&self.state).queries.len()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = lock(&self.state);
        if state.fail_texture_creation {
            return Err(ResourceError::BackendError(
                "texture creation disabled".to_string(),
            ));
        }
        let wants_npot = descriptor.flags.contains(TextureFlags::NPOTS);
        let (width, height, kind, flags) = if wants_npot && self.capabilities.supports_npot {
            (
                descriptor.width,
                descriptor.height,
                TextureKind::Normalized2D,
                descriptor.flags,
            )
        } else if wants_npot && self.capabilities.supports_rect_textures {
            (
                descriptor.width,
                descriptor.height,
                TextureKind::Rect,
                descriptor.flags,
            )
        } else {
            (
                descriptor.width.max(1).next_power_of_two(),
                descriptor.height.max(1).next_power_of_two(),
                TextureKind::Normalized2D,
                descriptor.flags.without(TextureFlags::NPOTS),
            )
        };
        let id = TextureId(state.next_texture);
        state.next_texture += 1;
        state.textures.insert(
            id,
            TextureInfo {
                width,
                height,
                format: descriptor.format,
                kind,
                flags,
            },
        );
        Ok(id)
    }

    fn texture_info(&self, id: TextureId) -> Result<TextureInfo, ResourceError> {
        let state = lock(&self.state);
        if state.fail_texture_info {
            return Err(ResourceError::NotFound);
        }
        state
            .textures
            .get(&id)
            .copied()
            .ok_or(ResourceError::InvalidHandle)
    }

    fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = lock(&self.state);
        if !state.textures.contains_key(&id) {
            return Err(ResourceError::InvalidHandle);
        }
        state.texture_data.insert(id, data.to_vec());
        Ok(())
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = lock(&self.state);
        state.texture_data.remove(&id);
        state
            .textures
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        state.destroyed_textures.push(id);
        Ok(())
    }

    fn create_buffer_with_data(
        &self,
        _descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let mut state = lock(&self.state);
        let id = BufferId(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(id, data.to_vec());
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = lock(&self.state);
        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        let start = offset as usize;
        if buffer.len() < start + data.len() {
            buffer.resize(start + data.len(), 0);
        }
        buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        lock(&self.state)
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn validate_render_targets(&self, targets: &RenderTargets) -> Result<(), ResourceError> {
        let state = lock(&self.state);
        if state.fail_validation {
            return Err(ResourceError::InvalidRenderTargets(
                "validation disabled".to_string(),
            ));
        }
        let requested = targets.color_count();
        if requested > self.capabilities.max_color_attachments {
            return Err(ResourceError::AttachmentLimitExceeded {
                requested,
                max: self.capabilities.max_color_attachments,
            });
        }
        let mut size = None;
        for (attachment, target) in targets.iter() {
            let info = state
                .textures
                .get(&target.texture)
                .ok_or(ResourceError::InvalidHandle)?;
            let dims = (info.width, info.height);
            if *size.get_or_insert(dims) != dims {
                return Err(ResourceError::InvalidRenderTargets(format!(
                    "{attachment:?} is {}x{}, expected {}x{}",
                    dims.0,
                    dims.1,
                    size.map_or(0, |s| s.0),
                    size.map_or(0, |s| s.1)
                )));
            }
        }
        Ok(())
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(RecordingEncoder {
            state: self.state.clone(),
        })
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) {
        lock(&self.state).submitted.push(command_buffer);
    }

    fn create_occlusion_query(&self) -> Result<OcclusionQueryId, ResourceError> {
        if !self.capabilities.supports_occlusion_queries {
            return Err(ResourceError::BackendError(
                "occlusion queries are not supported".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        let id = OcclusionQueryId(state.next_query);
        state.next_query += 1;
        state.queries.insert(id, None);
        Ok(id)
    }

    fn destroy_occlusion_query(&self, query: OcclusionQueryId) -> Result<(), ResourceError> {
        lock(&self.state)
            .queries
            .remove(&query)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn occlusion_query_result(&self, query: OcclusionQueryId) -> Option<bool> {
        lock(&self.state).queries.get(&query).copied().flatten()
    }
}

struct RecordingEncoder {
    state: Arc<Mutex<DeviceState>>,
}

impl CommandEncoder for RecordingEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn RenderPass + 'encoder>, ResourceError> {
        let label = descriptor.label.unwrap_or("").to_string();
        let mut state = lock(&self.state);
        if let Some(failing) = &state.failing_pass {
            if label.contains(failing.as_str()) {
                return Err(ResourceError::InvalidRenderTargets(format!(
                    "cannot attach targets of '{label}'"
                )));
            }
        }
        state.passes.push(RecordedPass {
            label,
            targets: descriptor.targets,
            color_load: descriptor.color_load,
            depth_load: descriptor.depth_load,
            world_to_camera: None,
            projection: None,
            copies: Vec::new(),
            draws: Vec::new(),
        });
        let index = state.passes.len() - 1;
        Ok(Box::new(RecordingPass {
            state: self.state.clone(),
            index,
            query: None,
        }))
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let mut state = lock(&self.state);
        state.next_command_buffer += 1;
        CommandBufferId(state.next_command_buffer)
    }
}

struct RecordingPass {
    state: Arc<Mutex<DeviceState>>,
    index: usize,
    // The running query and whether any of its draws was visible.
    query: Option<(OcclusionQueryId, bool)>,
}

impl RecordingPass {
    fn with_pass(&self, f: impl FnOnce(&mut RecordedPass)) {
        let mut state = lock(&self.state);
        if let Some(pass) = state.passes.get_mut(self.index) {
            f(pass);
        }
    }
}

impl RenderPass for RecordingPass {
    fn set_world_to_camera(&mut self, world_to_camera: &Transform) {
        self.with_pass(|p| p.world_to_camera = Some(*world_to_camera));
    }

    fn set_projection(&mut self, projection: &Mat4) {
        self.with_pass(|p| p.projection = Some(*projection));
    }

    fn copy_from_render_targets(&mut self, copies: &[PreCopy]) -> Result<(), ResourceError> {
        self.with_pass(|p| p.copies.extend_from_slice(copies));
        Ok(())
    }

    fn draw_mesh(&mut self, call: &DrawCall) {
        let draw = RecordedDraw {
            geometry: call.geometry,
            shader: call.shader,
            pass: call.pass,
            object_to_world: call.object_to_world,
            z_mode: call.z_mode,
            mix_mode: call.mix_mode,
            cull_mode: call.cull_mode,
            inputs: call
                .variables
                .iter()
                .filter_map(|v| match v.value {
                    ShaderValue::Texture(t) => Some((v.name, t)),
                    _ => None,
                })
                .collect(),
            variables: call
                .variables
                .iter()
                .map(|v| (v.name, v.value.clone()))
                .collect(),
            query: self.query.map(|(id, _)| id),
        };
        if let Some((_, visible)) = &mut self.query {
            *visible |= !lock(&self.state).occluded.contains(&call.geometry);
        }
        self.with_pass(|p| p.draws.push(draw));
    }

    fn begin_occlusion_query(&mut self, query: OcclusionQueryId) {
        self.query = Some((query, false));
    }

    fn end_occlusion_query(&mut self) {
        if let Some((id, visible)) = self.query.take() {
            if let Some(result) = lock(&self.state).queries.get_mut(&id) {
                *result = Some(visible);
            }
        }
    }
}

/// A culler reporting a fixed list of objects, all fully inside the frustum.
#[derive(Debug, Default)]
pub struct ListCuller {
    objects: std::cell::RefCell<Vec<Rc<MeshWrapper>>>,
}

impl ListCuller {
    /// Adds an object to report.
    pub fn push(&self, mesh: Rc<MeshWrapper>) {
        self.objects.borrow_mut().push(mesh);
    }
}

impl VisCuller for ListCuller {
    fn vis_test(
        &self,
        _view: &RenderView,
        callback: &mut dyn VisCallback,
        _width: u32,
        _height: u32,
    ) -> bool {
        for mesh in self.objects.borrow().iter() {
            if !mesh.invisible {
                callback.object_visible(mesh, 0);
            }
        }
        true
    }
}

/// A sector culled by `culler`.
pub fn sector_with(id: u32, culler: Rc<dyn VisCuller>) -> Rc<Sector> {
    Rc::new(Sector::new(SectorId(id), format!("sector{id}"), culler))
}

/// A sector with an empty [`ListCuller`].
pub fn sector(id: u32) -> Rc<Sector> {
    sector_with(id, Rc::new(ListCuller::default()))
}

/// A camera at the origin looking down -Z with a 90° field of view.
pub fn camera() -> Camera {
    Camera::new(
        Transform::IDENTITY,
        Mat4::perspective_rh_zo(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0),
    )
}

/// A `width` × `height` view of `sector` from [`camera`].
pub fn view(sector: Rc<Sector>, width: u32, height: u32) -> Rc<RenderView> {
    Rc::new(RenderView::new(camera(), sector, width, height))
}

/// A material using `shader` for the standard and G-buffer fill passes.
pub fn material(shader: ShaderId) -> Rc<Material> {
    Rc::new(
        Material::new("test material")
            .with_shader(SHADER_TYPE_STANDARD, shader)
            .with_shader(SHADER_TYPE_GBUFFER_FILL, shader),
    )
}

/// A render mesh drawing buffer `geometry` with `material`.
pub fn render_mesh(geometry: usize, material: Rc<Material>) -> Rc<RenderMesh> {
    Rc::new(RenderMesh::new(BufferId(geometry), material))
}

/// A unit cube at `position` with one render mesh.
pub fn mesh_wrapper(
    id: u32,
    priority: RenderPriority,
    position: Vec3,
    mesh: Rc<RenderMesh>,
) -> MeshWrapper {
    let mut wrapper = MeshWrapper::new(MeshWrapperId(id), format!("mesh{id}"), priority);
    wrapper.transform = Transform::from_translation(position);
    wrapper.bbox = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE * 0.5);
    wrapper.render_meshes.push(mesh);
    wrapper
}
