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
//! Hardware occlusion culling on top of the frustum test.

use super::frustum::FrustumVisCuller;
use ahash::AHashMap;
use lumen_core::renderer::{
    CullMode, DrawCall, GraphicsDevice, LoadOp, MixMode, OcclusionQueryId,
    RenderPassDescriptor, RenderTargets, ShaderId, ShaderTicket, ZBufMode,
};
use lumen_core::scene::{MeshWrapper, MeshWrapperId, RenderView, VisCallback, VisCuller};
use std::cell::{Cell, RefCell};
use std::collections::hash_map::Entry;
use std::rc::Rc;
use std::sync::Arc;

/// Shader drawing query geometry into the depth buffer only.
pub const OCCLUSION_SHADER: &str = "z_only";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryResult {
    Unknown,
    Visible,
    Invisible,
}

#[derive(Debug)]
struct QueryState {
    query: OcclusionQueryId,
    result: QueryResult,
    issued_frame: Option<u64>,
    next_check: u64,
}

impl QueryState {
    fn new(query: OcclusionQueryId) -> Self {
        Self {
            query,
            result: QueryResult::Unknown,
            issued_frame: None,
            next_check: 0,
        }
    }

    /// Whether the object counts as visible in `frame`. Only a query issued
    /// in the previous frame can hide it; a pending result is polled once.
    fn poll(&mut self, device: &dyn GraphicsDevice, frame: u64) -> bool {
        if self.issued_frame.map(|issued| issued + 1) != Some(frame) {
            return true;
        }
        if self.result == QueryResult::Unknown {
            self.result = match device.occlusion_query_result(self.query) {
                Some(true) => QueryResult::Visible,
                Some(false) => QueryResult::Invisible,
                None => return true,
            };
        }
        self.result == QueryResult::Visible
    }
}

/// A culler that hides frustum-visible objects whose last occlusion query
/// drew no samples.
///
/// Queries run one frame behind: the objects of a frame are tested in an
/// `Occlusion-Query` pass and the answers are read the next frame, so a
/// frame never waits on the device. Objects that were visible are tested
/// again every `frame_skip` frames; hidden ones every frame. Previously
/// visible objects are drawn as occluders (depth test and write), hidden
/// ones only test depth.
///
/// Views seen through a portal, and frames before a device is attached,
/// fall back to the plain frustum result.
#[derive(Debug)]
pub struct OcclusionVisCuller {
    objects: Rc<FrustumVisCuller>,
    depth_shader: ShaderId,
    frame_skip: u64,
    device: RefCell<Option<Arc<dyn GraphicsDevice>>>,
    frame: Cell<u64>,
    states: RefCell<AHashMap<MeshWrapperId, QueryState>>,
}

impl OcclusionVisCuller {
    /// Culls the objects registered with `objects`.
    pub fn new(objects: Rc<FrustumVisCuller>, depth_shader: ShaderId, frame_skip: u32) -> Self {
        Self {
            objects,
            depth_shader,
            frame_skip: u64::from(frame_skip),
            device: RefCell::new(None),
            frame: Cell::new(0),
            states: RefCell::new(AHashMap::new()),
        }
    }

    /// The object set, shared with the frustum test.
    pub fn objects(&self) -> &Rc<FrustumVisCuller> {
        &self.objects
    }

    /// Starts frame `frame` on `device`. Switching devices drops every
    /// query of the previous one.
    pub fn begin_frame(&self, frame: u64, device: &Arc<dyn GraphicsDevice>) {
        let same = self
            .device
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, device));
        if !same {
            self.release();
            *self.device.borrow_mut() = Some(device.clone());
        }
        self.frame.set(frame);
    }

    /// Number of live queries.
    pub fn query_count(&self) -> usize {
        self.states.borrow().len()
    }

    /// Destroys every query. Unregistered objects lose theirs here too.
    pub fn release(&self) {
        let Some(device) = self.device.borrow().clone() else {
            return;
        };
        for (id, state) in self.states.borrow_mut().drain() {
            if let Err(e) = device.destroy_occlusion_query(state.query) {
                log::warn!("OcclusionVisCuller: failed to destroy the query of {id:?}: {e}");
            }
        }
    }

    fn issue_queries(
        &self,
        device: &dyn GraphicsDevice,
        view: &RenderView,
        queried: &[(Rc<MeshWrapper>, OcclusionQueryId, bool)],
    ) -> bool {
        let cull_mode = if view.camera.mirrored {
            CullMode::Reverse
        } else {
            CullMode::Normal
        };
        let descriptor = RenderPassDescriptor {
            label: Some("Occlusion-Query"),
            targets: RenderTargets::SCREEN,
            color_load: LoadOp::Load,
            depth_load: LoadOp::Clear(1.0),
        };
        let mut encoder = device.create_command_encoder(Some("Occlusion Queries"));
        let issued = match encoder.begin_render_pass(&descriptor) {
            Ok(mut pass) => {
                pass.set_world_to_camera(&view.camera.world_to_camera());
                pass.set_projection(&view.camera.projection);
                for (mesh, query, occluder) in queried {
                    pass.begin_occlusion_query(*query);
                    for render_mesh in &mesh.render_meshes {
                        pass.draw_mesh(&DrawCall {
                            geometry: render_mesh.geometry,
                            shader: self.depth_shader,
                            ticket: ShaderTicket(0),
                            pass: 0,
                            object_to_world: mesh.transform,
                            z_mode: if *occluder { ZBufMode::Use } else { ZBufMode::Test },
                            mix_mode: MixMode::Copy,
                            cull_mode,
                            variables: Vec::new(),
                        });
                    }
                    pass.end_occlusion_query();
                }
                true
            }
            Err(e) => {
                log::warn!("OcclusionVisCuller: cannot begin the query pass: {e}");
                false
            }
        };
        device.submit_command_buffer(encoder.finish());
        issued
    }
}

impl Drop for OcclusionVisCuller {
    fn drop(&mut self) {
        self.release();
    }
}

impl VisCuller for OcclusionVisCuller {
    fn vis_test(
        &self,
        view: &RenderView,
        callback: &mut dyn VisCallback,
        _width: u32,
        _height: u32,
    ) -> bool {
        let candidates = self.objects.visible_front_to_back(view);
        let device = self.device.borrow().clone();
        let Some(device) = device.filter(|_| view.clip_rect.is_none()) else {
            for (mesh, mask) in &candidates {
                callback.object_visible(mesh, *mask);
            }
            return true;
        };

        let frame = self.frame.get();
        let mut queried = Vec::new();
        {
            let mut states = self.states.borrow_mut();
            for (mesh, mask) in &candidates {
                let state = match states.entry(mesh.id) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => match device.create_occlusion_query() {
                        Ok(query) => entry.insert(QueryState::new(query)),
                        Err(e) => {
                            log::debug!("OcclusionVisCuller: no query for '{}': {e}", mesh.name);
                            callback.object_visible(mesh, *mask);
                            continue;
                        }
                    },
                };
                let visible = state.poll(device.as_ref(), frame);
                if visible {
                    callback.object_visible(mesh, *mask);
                }
                if frame >= state.next_check && state.issued_frame != Some(frame) {
                    if visible {
                        state.next_check = frame + self.frame_skip;
                    }
                    state.issued_frame = Some(frame);
                    state.result = QueryResult::Unknown;
                    queried.push((mesh.clone(), state.query, visible));
                }
            }
        }

        if !queried.is_empty() && !self.issue_queries(device.as_ref(), view, &queried) {
            let mut states = self.states.borrow_mut();
            for (mesh, _, _) in &queried {
                if let Some(state) = states.get_mut(&mesh.id) {
                    state.issued_frame = None;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, material, mesh_wrapper, render_mesh, sector, RecordingDevice};
    use lumen_core::math::{Box2, Vec2, Vec3};
    use lumen_core::renderer::{BufferId, DeviceCapabilities};
    use lumen_core::scene::RenderPriority;

    #[derive(Default)]
    struct Seen(Vec<u32>);

    impl VisCallback for Seen {
        fn object_visible(&mut self, mesh: &Rc<MeshWrapper>, _frustum_mask: u32) {
            self.0.push(mesh.id.0);
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

    fn culler_with(
        objects: &[Rc<MeshWrapper>],
        frame_skip: u32,
    ) -> (OcclusionVisCuller, RecordingDevice, Arc<dyn GraphicsDevice>) {
        let frustum = Rc::new(FrustumVisCuller::new());
        for object in objects {
            frustum.register(object.clone());
        }
        let device = RecordingDevice::default();
        let shared: Arc<dyn GraphicsDevice> = Arc::new(device.clone());
        (OcclusionVisCuller::new(frustum, ShaderId(9), frame_skip), device, shared)
    }

    fn run_frame(
        culler: &OcclusionVisCuller,
        device: &Arc<dyn GraphicsDevice>,
        frame: u64,
        view: &RenderView,
    ) -> Vec<u32> {
        culler.begin_frame(frame, device);
        let mut seen = Seen::default();
        assert!(culler.vis_test(view, &mut seen, 100, 100));
        seen.0
    }

    #[test]
    fn occluded_objects_disappear_one_frame_after_their_query() {
        let (culler, device, shared) = culler_with(&[cube(1, -5.0), cube(2, -20.0)], 0);
        device.set_occluded(BufferId(2), true);
        let view = RenderView::new(camera(), sector(0), 100, 100);

        // Nothing is known yet: everything in the frustum is visible.
        assert_eq!(run_frame(&culler, &shared, 1, &view), vec![1, 2]);
        let draws = device.draws_in("Occlusion-Query");
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].geometry, BufferId(1));
        assert_eq!(draws[0].shader, ShaderId(9));
        assert!(draws.iter().all(|d| d.query.is_some()));
        assert_eq!(culler.query_count(), 2);

        assert_eq!(run_frame(&culler, &shared, 2, &view), vec![1]);
        // The hidden object is tested again without occluding anything.
        let frame2 = device.passes().last().cloned().expect("query pass");
        assert_eq!(frame2.draws.len(), 2);
        assert_eq!(frame2.draws[1].z_mode, ZBufMode::Test);

        device.set_occluded(BufferId(2), false);
        // Frame 2 tested object 2 while it was still hidden.
        assert_eq!(run_frame(&culler, &shared, 3, &view), vec![1]);
        assert_eq!(run_frame(&culler, &shared, 4, &view), vec![1, 2]);
    }

    #[test]
    fn visible_objects_are_retested_every_frame_skip_frames() {
        let (culler, device, shared) = culler_with(&[cube(1, -5.0)], 3);
        let view = RenderView::new(camera(), sector(0), 100, 100);

        for frame in 1..=4 {
            assert_eq!(run_frame(&culler, &shared, frame, &view), vec![1]);
        }
        // Tested in frames 1 and 4.
        assert_eq!(device.draws_in("Occlusion-Query").len(), 2);
        assert!(device
            .draws_in("Occlusion-Query")
            .iter()
            .all(|d| d.z_mode == ZBufMode::Use));
    }

    #[test]
    fn stale_results_never_hide_objects() {
        let (culler, device, shared) = culler_with(&[cube(1, -5.0)], 0);
        device.set_occluded(BufferId(1), true);
        let view = RenderView::new(camera(), sector(0), 100, 100);

        assert_eq!(run_frame(&culler, &shared, 1, &view), vec![1]);
        // Frames 2 to 4 are skipped: the frame-1 answer is too old.
        assert_eq!(run_frame(&culler, &shared, 5, &view), vec![1]);
        assert_eq!(run_frame(&culler, &shared, 6, &view), Vec::<u32>::new());
    }

    #[test]
    fn portal_views_and_unsupported_devices_use_the_frustum_result() {
        let (culler, device, shared) = culler_with(&[cube(1, -10.0)], 0);
        let mut portal_view = RenderView::new(camera(), sector(0), 100, 100);
        portal_view.clip_rect = Some(Box2 {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(100.0, 100.0),
        });
        assert_eq!(run_frame(&culler, &shared, 1, &portal_view), vec![1]);
        assert!(device.passes().is_empty());

        let no_queries = RecordingDevice::new(DeviceCapabilities {
            supports_occlusion_queries: false,
            ..DeviceCapabilities::default()
        });
        let no_queries: Arc<dyn GraphicsDevice> = Arc::new(no_queries);
        let view = RenderView::new(camera(), sector(0), 100, 100);
        assert_eq!(run_frame(&culler, &no_queries, 2, &view), vec![1]);
        assert_eq!(culler.query_count(), 0);
    }

    #[test]
    fn dropping_the_culler_destroys_its_queries() {
        let (culler, device, shared) = culler_with(&[cube(1, -5.0), cube(2, -8.0)], 0);
        let view = RenderView::new(camera(), sector(0), 100, 100);
        run_frame(&culler, &shared, 1, &view);
        assert_eq!(device.live_query_count(), 2);
        drop(culler);
        assert_eq!(device.live_query_count(), 0);
    }
}
