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

//! Drives whole frames of the deferred render manager against a recording
//! device.

use lumen_agents::{DeferredRenderManager, RenderManagerConfig, RenderManagerError};
use lumen_core::math::{LinearRgba, Vec3};
use lumen_core::renderer::{
    BufferId, DeviceCapabilities, GraphicsDevice, Light, RenderTargetAttachment, RenderTarget,
    ResourceError, ShaderId, ShaderRegistry, TextureDescriptor, TextureFlags, TextureFormat,
};
use lumen_core::scene::{RenderPriority, RenderView, Sector, SectorId};
use lumen_lanes::render_lane::deferred::DeferredError;
use lumen_lanes::render_lane::setup::TargetFlags;
use lumen_lanes::render_lane::visibility::OCCLUSION_SHADER;
use lumen_lanes::testing::{material, mesh_wrapper, render_mesh, view, RecordingDevice};
use std::rc::Rc;
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn manager(device: &Arc<RecordingDevice>) -> (DeferredRenderManager, ShaderId) {
    let mut registry = ShaderRegistry::new();
    let surface = registry.register("surface");
    let mut config = RenderManagerConfig::default();
    config.global_illum.enable = false;
    let mut manager = DeferredRenderManager::new(config, registry);
    manager.initialize(device.clone()).expect("initialize");
    (manager, surface)
}

/// An opaque mesh (geometry 1), an alpha mesh (geometry 2) and a light in
/// front of the camera.
fn scene(manager: &DeferredRenderManager, shader: ShaderId) -> Rc<RenderView> {
    let mut sector = Sector::new(SectorId(0), "hall", manager.vis_culler());
    sector.ambient = LinearRgba::rgb(0.1, 0.1, 0.1);
    sector.lights.push(Light::point(
        Vec3::new(0.0, 0.0, -5.0),
        10.0,
        LinearRgba::WHITE,
    ));
    let culler = manager.frustum_culler();
    for (id, priority, z) in [(1, 6, -5.0), (2, 9, -8.0)] {
        culler.register(Rc::new(mesh_wrapper(
            id,
            RenderPriority(priority),
            Vec3::new(0.0, 0.0, z),
            render_mesh(id as usize, material(shader)),
        )));
    }
    view(Rc::new(sector), 64, 64)
}

#[test]
fn a_frame_fills_the_gbuffer_lights_and_composites() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let (mut manager, surface) = manager(&device);
    let view = scene(&manager, surface);

    let stats = manager.render_view(&view).expect("frame");
    assert_eq!(
        device.pass_labels(),
        vec!["Fill-GBuffer", "Light-Accumulate", "Forward-Composite"]
    );
    assert_eq!(stats.stacks, 1);
    assert_eq!(stats.gbuffer_draws, 1);
    assert_eq!(stats.light_draws, 2);
    assert_eq!(stats.forward_draws, 1);
    assert_eq!(device.draws_in("Fill-GBuffer")[0].geometry, BufferId(1));
    assert_eq!(device.draws_in("Forward-Composite")[0].geometry, BufferId(2));
    assert_eq!(device.submitted_count(), 1);
    assert_eq!(manager.frame_count(), 1);
    assert_eq!(manager.last_stats(), stats);
    assert!(!manager.gbuffer().is_attached());
    assert_eq!(manager.gbuffer().size(), (64, 64));
}

#[test]
fn routing_is_stable_across_frames_and_follows_reconfiguration() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let (mut manager, surface) = manager(&device);
    let view = scene(&manager, surface);

    let first = manager.render_view(&view).expect("first frame");
    let first_draws = device.draws_in("Forward-Composite");
    device.clear_log();
    let second = manager.render_view(&view).expect("second frame");
    assert_eq!(first, second);
    assert_eq!(device.draws_in("Forward-Composite"), first_draws);

    manager.set_forward_priorities("object, alpha");
    device.clear_log();
    let stats = manager.render_view(&view).expect("third frame");
    assert_eq!(stats.gbuffer_draws, 0);
    assert_eq!(stats.forward_draws, 2);
    let geometry: Vec<_> = device
        .draws_in("Forward-Composite")
        .iter()
        .map(|d| d.geometry)
        .collect();
    assert_eq!(geometry, vec![BufferId(1), BufferId(2)]);
}

#[test]
fn occlusion_culling_hides_meshes_that_failed_their_query() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let mut registry = ShaderRegistry::new();
    let surface = registry.register("surface");
    let mut config = RenderManagerConfig::default();
    config.global_illum.enable = false;
    config.occlusion_culling = true;
    config.occlusion_frame_skip = 0;
    let mut manager = DeferredRenderManager::new(config, registry);
    manager.initialize(device.clone()).expect("initialize");
    assert!(manager.occlusion_culler().is_some());
    let z_only = manager.registry().find(OCCLUSION_SHADER).expect("depth shader");
    let view = scene(&manager, surface);
    device.set_occluded(BufferId(1), true);

    let first = manager.render_view(&view).expect("first frame");
    assert_eq!(first.gbuffer_draws, 1);
    assert_eq!(device.pass_labels()[0], "Occlusion-Query");
    assert!(device
        .draws_in("Occlusion-Query")
        .iter()
        .all(|d| d.shader == z_only));

    device.clear_log();
    let second = manager.render_view(&view).expect("second frame");
    assert_eq!(second.gbuffer_draws, 0);
    assert_eq!(second.forward_draws, 1);
    assert_eq!(manager.occlusion_culler().map(|c| c.query_count()), Some(2));
}

#[test]
fn light_volumes_follow_the_debug_toggle() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let (mut manager, surface) = manager(&device);
    let view = scene(&manager, surface);

    manager.set_show_light_volumes(true);
    assert_eq!(manager.render_view(&view).expect("frame").volume_draws, 1);
    manager.set_show_light_volumes(false);
    assert_eq!(manager.render_view(&view).expect("frame").volume_draws, 0);
}

#[test]
fn shadow_maps_render_before_the_scene_and_reach_the_light() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let mut registry = ShaderRegistry::new();
    let surface = registry.register("surface");
    let mut config = RenderManagerConfig::default();
    config.global_illum.enable = false;
    config.shadows.enable = true;
    config.shadows.far = 30.0;
    let mut manager = DeferredRenderManager::new(config, registry);
    manager.initialize(device.clone()).expect("initialize");
    let view = scene(&manager, surface);

    manager.render_view(&view).expect("frame");
    assert_eq!(device.pass_labels()[0], "Shadow-Map");
    let map = manager
        .shadows()
        .and_then(|s| s.maps().first().map(|m| m.texture))
        .expect("a shadow map");
    let light = &device.draws_in("Light-Accumulate")[1];
    assert!(light.inputs.iter().any(|(_, t)| *t == map));
}

#[test]
fn registered_targets_render_before_the_view() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let (mut manager, surface) = manager(&device);
    let view = scene(&manager, surface);
    let texture = device
        .create_texture(&TextureDescriptor {
            label: None,
            width: 64,
            height: 64,
            format: TextureFormat::Rgba16Float,
            flags: TextureFlags::RENDER_TARGET,
        })
        .expect("texture");
    manager.register_render_target(view.clone(), texture, 0, TargetFlags::UPDATE_ONCE);
    assert!(manager.mark_as_used(texture));

    let stats = manager.render_view(&view).expect("frame");
    assert_eq!(stats.stacks, 2);
    let passes = device.passes();
    assert_eq!(passes.len(), 6);
    assert_eq!(passes[1].label, "Light-Accumulate");
    assert_eq!(
        passes[1].targets.get(RenderTargetAttachment::Color0),
        Some(RenderTarget::new(texture))
    );
    assert_eq!(
        passes[1].targets.get(RenderTargetAttachment::Depth),
        manager.gbuffer().depth_buffer().map(RenderTarget::new)
    );
    assert!(passes[4].targets.is_screen());

    // One-shot targets are dropped once rendered.
    device.clear_log();
    manager.render_view(&view).expect("second frame");
    assert_eq!(device.passes().len(), 3);
    assert!(!manager.unregister_render_target(texture));
}

#[test]
fn frames_need_an_initialized_capable_device() {
    init_logger();
    let mut registry = ShaderRegistry::new();
    let surface = registry.register("surface");
    let mut manager = DeferredRenderManager::new(RenderManagerConfig::default(), registry);
    let view = scene(&manager, surface);
    assert_eq!(
        manager.render_view(&view),
        Err(RenderManagerError::NotInitialized)
    );

    let small = Arc::new(RecordingDevice::new(DeviceCapabilities {
        max_color_attachments: 2,
        ..DeviceCapabilities::default()
    }));
    assert_eq!(
        manager.initialize(small),
        Err(RenderManagerError::Resource(
            ResourceError::AttachmentLimitExceeded {
                requested: 3,
                max: 2
            }
        ))
    );
}

#[test]
fn a_failing_pass_aborts_only_its_frame() {
    init_logger();
    let device = Arc::new(RecordingDevice::default());
    let (mut manager, surface) = manager(&device);
    let view = scene(&manager, surface);

    device.fail_pass(Some("Light-Accumulate"));
    assert!(matches!(
        manager.render_view(&view),
        Err(RenderManagerError::Deferred(DeferredError::Resource(_)))
    ));
    assert_eq!(device.submitted_count(), 0);
    assert!(!manager.gbuffer().is_attached());

    device.fail_pass(None);
    assert!(manager.render_view(&view).is_ok());
    assert_eq!(device.submitted_count(), 1);
}
