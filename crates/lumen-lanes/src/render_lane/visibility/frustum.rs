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
use lumen_core::math::{Frustum, FrustumTest, Plane, Vec4};
use lumen_core::scene::{MeshWrapper, MeshWrapperId, RenderView, VisCallback, VisCuller};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// A culler testing each registered object's world bounds against the view
/// frustum.
///
/// Objects are reported front to back. Views seen through a portal are
/// further clipped to their screen rectangle. An object whose bounds hold
/// the camera is always visible and reported with the full plane mask.
#[derive(Debug, Default)]
pub struct FrustumVisCuller {
    objects: RefCell<Vec<Rc<MeshWrapper>>>,
}

impl FrustumVisCuller {
    /// An empty culler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object. Registering the same wrapper id twice replaces it.
    pub fn register(&self, mesh: Rc<MeshWrapper>) {
        let mut objects = self.objects.borrow_mut();
        match objects.iter_mut().find(|o| o.id == mesh.id) {
            Some(slot) => *slot = mesh,
            None => objects.push(mesh),
        }
    }

    /// Removes an object. Returns `false` if it was not registered.
    pub fn unregister(&self, id: MeshWrapperId) -> bool {
        let mut objects = self.objects.borrow_mut();
        let before = objects.len();
        objects.retain(|o| o.id != id);
        objects.len() != before
    }

    /// The registered objects.
    pub fn objects(&self) -> Vec<Rc<MeshWrapper>> {
        self.objects.borrow().clone()
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }
}

/// The frustum of a view, including the clip planes of its screen
/// rectangle.
pub fn view_frustum(view: &RenderView) -> Frustum {
    let view_projection = view.camera.view_projection();
    let base = Frustum::from_view_projection(&view_projection);
    let Some(clip) = view.clip_rect else {
        return base;
    };
    let (w, h) = (view.width.max(1) as f32, view.height.max(1) as f32);
    let ndc = |p: f32, size: f32| p / size * 2.0 - 1.0;
    let r0 = view_projection.get_row(0);
    let r1 = view_projection.get_row(1);
    let r3 = view_projection.get_row(3);
    // row · p >= k * (row3 · p) for the lower bounds, the reverse for the upper ones
    let lower = |row: Vec4, k: f32| Plane::from_vec4(row + r3 * -k);
    let upper = |row: Vec4, k: f32| Plane::from_vec4(r3 * k + row * -1.0);
    let mut planes = base.planes().to_vec();
    planes.extend([
        lower(r0, ndc(clip.min.x, w)),
        upper(r0, ndc(clip.max.x, w)),
        lower(r1, ndc(clip.min.y, h)),
        upper(r1, ndc(clip.max.y, h)),
    ]);
    Frustum::from_planes(planes)
}

impl FrustumVisCuller {
    /// The visible objects of `view` with their frustum masks, nearest
    /// first.
    pub fn visible_front_to_back(&self, view: &RenderView) -> Vec<(Rc<MeshWrapper>, u32)> {
        let frustum = view_frustum(view);
        let full_mask = frustum.full_mask();
        let eye = view.camera.position();

        let mut visible: Vec<(f32, Rc<MeshWrapper>, u32)> = Vec::new();
        for mesh in self.objects.borrow().iter() {
            if mesh.invisible {
                continue;
            }
            let bbox = mesh.world_bbox();
            let mask = if bbox.contains_point(eye) {
                full_mask
            } else {
                match frustum.test_aabb(&bbox, full_mask) {
                    FrustumTest::Outside => continue,
                    FrustumTest::Visible(mask) => mask,
                }
            };
            let distance = (bbox.center() - eye).length_squared();
            visible.push((distance, mesh.clone(), mask));
        }
        visible.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        visible
            .into_iter()
            .map(|(_, mesh, mask)| (mesh, mask))
            .collect()
    }
}

impl VisCuller for FrustumVisCuller {
    fn vis_test(
        &self,
        view: &RenderView,
        callback: &mut dyn VisCallback,
        _width: u32,
        _height: u32,
    ) -> bool {
        for (mesh, mask) in &self.visible_front_to_back(view) {
            callback.object_visible(mesh, *mask);
        }
        true
    }
}
