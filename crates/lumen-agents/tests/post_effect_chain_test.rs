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

//! Post effects run after the deferred pipeline, reading the scene it
//! rendered.

use lumen_agents::{DeferredRenderManager, RenderManagerConfig};
use lumen_core::math::Vec3;
use lumen_core::renderer::{RenderTargetAttachment, RenderTargets, ShaderRegistry};
use lumen_core::scene::RenderPriority;
use lumen_lanes::render_lane::post_effect::{LayerId, DEFAULT_INPUT_SV, POST_EFFECT_PASS};
use lumen_lanes::testing::{material, mesh_wrapper, render_mesh, sector_with, view, RecordingDevice};
use std::rc::Rc;
use std::sync::Arc;

const CHAIN: &str = r#"
    PostEffect(layers: [
        Layer(name: "blur", shader: "blur"),
        Layer(name: "tint", shader: "tint"),
        Layer(name: "final", shader: "final"),
    ])
"#;

#[test]
fn the_scene_feeds_a_ping_pong_chain() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Arc::new(RecordingDevice::default());
    let mut registry = ShaderRegistry::new();
    let surface = registry.register("surface");
    for shader in ["blur", "tint", "final"] {
        registry.register(shader);
    }
    let mut manager = DeferredRenderManager::new(RenderManagerConfig::default(), registry);
    manager.initialize(device.clone()).expect("initialize");
    let layers = manager.add_layers_from_document(CHAIN).expect("layers");
    assert_eq!(layers.len(), 3);

    manager.frustum_culler().register(Rc::new(mesh_wrapper(
        1,
        RenderPriority(6),
        Vec3::new(0.0, 0.0, -4.0),
        render_mesh(1, material(surface)),
    )));
    let view = view(sector_with(0, manager.vis_culler()), 32, 32);
    let stats = manager.render_view(&view).expect("frame");
    assert_eq!(stats.gbuffer_draws, 1);
    assert_eq!(stats.global_illum_draws, 4);

    let effects = manager.post_effects();
    let scene = effects.screen_target().expect("scene texture");
    let passes = device.passes();
    let accumulate = passes
        .iter()
        .find(|p| p.label == "Light-Accumulate")
        .expect("accumulation pass");
    assert_eq!(
        accumulate.targets.get(RenderTargetAttachment::Color0),
        Some(scene)
    );

    let post: Vec<_> = passes
        .iter()
        .filter(|p| p.label == POST_EFFECT_PASS)
        .collect();
    assert_eq!(post.len(), 3);
    let output = |l: usize| effects.layer_output(LayerId(l)).map(RenderTargets::color);
    assert_eq!(Some(post[0].targets), output(1));
    assert_eq!(Some(post[1].targets), output(2));
    assert_eq!(effects.layer_output(LayerId(2)), Some(scene));
    assert!(post[2].targets.is_screen());

    let input = manager.names().lookup(DEFAULT_INPUT_SV).expect("interned");
    assert!(post[0].draws[0].inputs.contains(&(input, scene.texture)));
    assert_eq!(device.submitted_count(), 2);
}
