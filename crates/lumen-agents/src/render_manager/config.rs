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

//! Settings of the deferred render manager.

use lumen_core::config::ConfigStore;
use lumen_core::renderer::TextureFormat;
use lumen_lanes::render_lane::deferred::{
    GBufferDescription, GlobalIllumConfig, LightRenderConfig, ShadowConfig,
    DEFAULT_FORWARD_PRIORITIES,
};
use lumen_lanes::render_lane::setup::DEFAULT_RECURSION_LIMIT;
use std::fmt;
use std::str::FromStr;

/// Settings read from the `RenderManager.Deferred.*` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderManagerConfig {
    /// Comma separated priority names drawn forward.
    pub forward_priorities: String,
    /// Hides objects that failed their last occlusion query.
    pub occlusion_culling: bool,
    /// Frames between two queries of an object that passed its last one.
    pub occlusion_frame_skip: u32,
    /// Outlines light volumes over the final image.
    pub show_light_volumes: bool,
    /// Maximum portal nesting depth.
    pub portal_recursion_limit: u32,
    /// Format of heavy portal textures.
    pub portal_texture_format: TextureFormat,
    /// Tesselation of the light volumes.
    pub lights: LightRenderConfig,
    /// Layout of the G-buffer. The size follows the rendered view.
    pub gbuffer: GBufferDescription,
    /// Screen-space global illumination.
    pub global_illum: GlobalIllumConfig,
    /// Parallel-split shadow maps.
    pub shadows: ShadowConfig,
    /// A post-effect layer document loaded at initialization.
    pub effects: Option<String>,
}

impl Default for RenderManagerConfig {
    fn default() -> Self {
        Self {
            forward_priorities: DEFAULT_FORWARD_PRIORITIES.to_string(),
            occlusion_culling: false,
            occlusion_frame_skip: 4,
            show_light_volumes: false,
            portal_recursion_limit: DEFAULT_RECURSION_LIMIT,
            portal_texture_format: TextureFormat::Rgba8,
            lights: LightRenderConfig::default(),
            gbuffer: GBufferDescription::default(),
            global_illum: GlobalIllumConfig::default(),
            shadows: ShadowConfig::default(),
            effects: None,
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
            log::warn!("RenderManagerConfig: {key}: {e}, using {default}");
            default
        }),
    }
}

impl RenderManagerConfig {
    /// The standard key prefix.
    pub const PREFIX: &'static str = "RenderManager.Deferred";

    /// Reads the settings under `prefix`; missing keys keep their defaults.
    pub fn from_config(store: &ConfigStore, prefix: &str) -> Self {
        let d = Self::default();
        let key = |name: &str| format!("{prefix}.{name}");
        let count = |name: &str, default: u32| {
            store
                .get_int(&key(name), i64::from(default))
                .clamp(0, i64::from(u32::MAX)) as u32
        };
        let gbuffer = GBufferDescription {
            color_buffer_count: count("GBuffer.BufferCount", d.gbuffer.color_buffer_count as u32)
                as usize,
            has_depth: store.get_bool(&key("GBuffer.DepthBuffer"), d.gbuffer.has_depth),
            color_format: parse_or(store, &key("GBuffer.BufferFormat"), d.gbuffer.color_format),
            depth_format: parse_or(
                store,
                &key("GBuffer.DepthBufferFormat"),
                d.gbuffer.depth_format,
            ),
            ..d.gbuffer
        };
        Self {
            forward_priorities: store.get_str(&key("ForwardPriorities"), &d.forward_priorities),
            occlusion_culling: store.get_bool(&key("OcclusionCulling"), d.occlusion_culling),
            occlusion_frame_skip: count("OcclusionCulling.FrameSkip", d.occlusion_frame_skip),
            show_light_volumes: store.get_bool(&key("ShowLightVolumes"), d.show_light_volumes),
            portal_recursion_limit: count("PortalRecursionLimit", d.portal_recursion_limit),
            portal_texture_format: parse_or(
                store,
                &key("PortalTextureFormat"),
                d.portal_texture_format,
            ),
            lights: LightRenderConfig {
                sphere_detail: count("SphereDetail", d.lights.sphere_detail),
                cone_detail: count("ConeDetail", d.lights.cone_detail),
            },
            gbuffer,
            global_illum: GlobalIllumConfig::from_config(store, &key("GlobalIllum")),
            shadows: ShadowConfig::from_config(store, &key("Shadows")),
            effects: store
                .raw(&key("Effects"))
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_lanes::render_lane::deferred::BufferResolution;

    #[test]
    fn missing_keys_keep_their_defaults() {
        let config = RenderManagerConfig::from_config(&ConfigStore::new(), "RenderManager.Deferred");
        assert_eq!(config, RenderManagerConfig::default());
        assert_eq!(config.forward_priorities, "alpha, transp, portal");
        assert_eq!(config.portal_recursion_limit, 30);
        assert_eq!(config.gbuffer.color_buffer_count, 3);
    }

    #[test]
    fn keys_are_read_under_the_prefix() {
        let store = ConfigStore::from_ron_str(
            r#"{
                "RenderManager.Deferred.ForwardPriorities": "alpha",
                "RenderManager.Deferred.ShowLightVolumes": true,
                "RenderManager.Deferred.OcclusionCulling": true,
                "RenderManager.Deferred.OcclusionCulling.FrameSkip": 2,
                "RenderManager.Deferred.PortalRecursionLimit": 4,
                "RenderManager.Deferred.GBuffer.BufferCount": 4,
                "RenderManager.Deferred.GBuffer.BufferFormat": "rgba32_f",
                "RenderManager.Deferred.GBuffer.DepthBufferFormat": "bogus",
                "RenderManager.Deferred.GlobalIllum.Enable": false,
                "RenderManager.Deferred.GlobalIllum.BufferResolution": "quarter",
                "RenderManager.Deferred.Effects": "effects.ron",
                "RenderManager.Deferred.Shadows.Enable": true,
                "RenderManager.Deferred.Shadows.SplitCount": 0,
                "RenderManager.Other.ShowLightVolumes": false,
            }"#,
        )
        .expect("valid document");
        let config = RenderManagerConfig::from_config(&store, RenderManagerConfig::PREFIX);
        assert_eq!(config.forward_priorities, "alpha");
        assert!(config.show_light_volumes);
        assert!(config.occlusion_culling);
        assert_eq!(config.occlusion_frame_skip, 2);
        assert_eq!(config.portal_recursion_limit, 4);
        assert_eq!(config.gbuffer.color_buffer_count, 4);
        assert_eq!(config.gbuffer.color_format, TextureFormat::Rgba32Float);
        assert_eq!(config.gbuffer.depth_format, TextureFormat::Depth24Stencil8);
        assert!(!config.global_illum.enable);
        assert_eq!(
            config.global_illum.buffer_resolution,
            BufferResolution::Quarter
        );
        assert_eq!(config.effects.as_deref(), Some("effects.ron"));
        assert!(config.shadows.enable);
        assert_eq!(config.shadows.split_count, 1);
        assert_eq!(config.shadows.map_size, 1024);
    }
}
