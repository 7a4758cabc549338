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
//! Drawing helpers shared by the tree renderers, the deferred pipeline and
//! the post-effect manager.

use lumen_core::math::{Mat4, Transform, Vec2};
use lumen_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CullMode, DrawCall, GraphicsDevice, MixMode,
    RenderPass, ResourceError, ShaderId, ShaderTicket, ShaderVarRef, ZBufMode,
};
use std::borrow::Cow;

/// Flattens a variable stack into the list bound to a draw call.
///
/// Empty slots are skipped. Variables in `extra` replace stack entries of
/// the same name and are appended otherwise.
pub fn resolve_variables(
    stack: &[Option<ShaderVarRef>],
    extra: &[ShaderVarRef],
) -> Vec<ShaderVarRef> {
    let mut variables: Vec<ShaderVarRef> = stack.iter().flatten().cloned().collect();
    for var in extra {
        match variables.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var.clone(),
            None => variables.push(var.clone()),
        }
    }
    variables
}

/// A vertex of a screen-space quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    /// Pixel-space position.
    pub position: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

/// The four corners of a `width` × `height` pixel quad, counter-clockwise
/// from the bottom-left corner. Texture coordinates span `offset` to
/// `offset + extent`.
pub fn quad_vertices(width: u32, height: u32, extent: Vec2, offset: Vec2) -> [QuadVertex; 4] {
    let (w, h) = (width as f32, height as f32);
    [
        QuadVertex {
            position: [0.0, 0.0, 0.0],
            uv: [offset.x, offset.y],
        },
        QuadVertex {
            position: [w, 0.0, 0.0],
            uv: [offset.x + extent.x, offset.y],
        },
        QuadVertex {
            position: [w, h, 0.0],
            uv: [offset.x + extent.x, offset.y + extent.y],
        },
        QuadVertex {
            position: [0.0, h, 0.0],
            uv: [offset.x, offset.y + extent.y],
        },
    ]
}

/// A screen-covering quad in pixel space, drawn with an orthographic
/// projection.
///
/// When the target is larger than the quad (a power-of-two texture holding a
/// smaller image), the quad covers the top-left corner of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct FullscreenQuad {
    geometry: BufferId,
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
}

impl FullscreenQuad {
    /// Uploads a quad covering `width` × `height` pixels.
    pub fn new(
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        extent: Vec2,
        offset: Vec2,
    ) -> Result<Self, ResourceError> {
        let vertices = quad_vertices(width, height, extent, offset);
        let data: &[u8] = bytemuck::cast_slice(&vertices);
        let geometry = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("Fullscreen Quad")),
                size: data.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            data,
        )?;
        Ok(Self {
            geometry,
            width,
            height,
            target_width: width,
            target_height: height,
        })
    }

    /// Draws into a `width` × `height` target instead of one matching the
    /// quad.
    #[must_use]
    pub fn in_target(mut self, width: u32, height: u32) -> Self {
        self.target_width = width.max(self.width);
        self.target_height = height.max(self.height);
        self
    }

    /// The vertex buffer.
    pub fn geometry(&self) -> BufferId {
        self.geometry
    }

    /// The covered size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The projection mapping the quad onto its target.
    pub fn projection(&self) -> Mat4 {
        let h = self.height as f32;
        Mat4::orthographic_rh_zo(
            0.0,
            self.target_width as f32,
            h - self.target_height as f32,
            h,
            -1.0,
            10.0,
        )
    }

    /// Draws the quad with `shader`. The pass camera is left in screen space.
    pub fn draw(
        &self,
        pass: &mut dyn RenderPass,
        shader: ShaderId,
        mix_mode: MixMode,
        variables: Vec<ShaderVarRef>,
    ) {
        pass.set_world_to_camera(&Transform::IDENTITY);
        pass.set_projection(&self.projection());
        pass.draw_mesh(&DrawCall {
            geometry: self.geometry,
            shader,
            ticket: ShaderTicket::default(),
            pass: 0,
            object_to_world: Transform::IDENTITY,
            z_mode: ZBufMode::None,
            mix_mode,
            cull_mode: CullMode::None,
            variables,
        });
    }

    /// Releases the vertex buffer.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_buffer(self.geometry) {
            log::warn!("FullscreenQuad: failed to release geometry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDevice;
    use lumen_core::renderer::{ShaderValue, ShaderVarName, ShaderVariable};

    #[test]
    fn extra_variables_override_the_stack() {
        let a = ShaderVariable::new(ShaderVarName(0), ShaderValue::Float(1.0));
        let b = ShaderVariable::new(ShaderVarName(2), ShaderValue::Float(2.0));
        let b2 = ShaderVariable::new(ShaderVarName(2), ShaderValue::Float(3.0));
        let c = ShaderVariable::new(ShaderVarName(5), ShaderValue::Int(4));
        let stack = vec![Some(a), None, Some(b)];
        let resolved = resolve_variables(&stack, &[b2, c]);
        let values: Vec<_> = resolved.iter().map(|v| (v.name.0, v.value.clone())).collect();
        assert_eq!(
            values,
            vec![
                (0, ShaderValue::Float(1.0)),
                (2, ShaderValue::Float(3.0)),
                (5, ShaderValue::Int(4)),
            ]
        );
    }

    #[test]
    fn quad_uploads_corrected_texture_coordinates() {
        let device = RecordingDevice::default();
        let quad = FullscreenQuad::new(
            &device,
            300,
            200,
            Vec2::new(0.5, 0.25),
            Vec2::new(0.0, 0.75),
        )
        .expect("buffer");
        let data = device.buffer_data(quad.geometry()).expect("uploaded");
        let vertices: Vec<QuadVertex> = bytemuck::pod_collect_to_vec(&data);
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[0].uv, [0.0, 0.75]);
        assert_eq!(vertices[2].position, [300.0, 200.0, 0.0]);
        assert_eq!(vertices[2].uv, [0.5, 1.0]);

        let corner = quad
            .projection()
            .project_point(lumen_core::math::Vec3::new(300.0, 200.0, 0.0));
        assert!((corner.x - 1.0).abs() < 1e-5 && (corner.y - 1.0).abs() < 1e-5);

        // In a 512x256 target the quad covers the top-left corner.
        let quad = quad.in_target(512, 256);
        let top_right = quad
            .projection()
            .project_point(lumen_core::math::Vec3::new(300.0, 200.0, 0.0));
        assert!((top_right.y - 1.0).abs() < 1e-5);
        assert!((top_right.x - (600.0 / 512.0 - 1.0)).abs() < 1e-5);
        let bottom_left = quad
            .projection()
            .project_point(lumen_core::math::Vec3::ZERO);
        assert!((bottom_left.y - (2.0 * 56.0 / 256.0 - 1.0)).abs() < 1e-5);

        quad.destroy(&device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
