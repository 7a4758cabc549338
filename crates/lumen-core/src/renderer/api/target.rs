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

//! Render target attachments.
//!
//! A [`RenderTargets`] set with no attachment at all stands for the screen
//! (the device's default framebuffer).

use super::texture::TextureId;

/// An attachment point of a render target set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderTargetAttachment {
    /// The depth (or depth/stencil) attachment.
    Depth,
    /// The first color attachment.
    Color0,
    /// The second color attachment.
    Color1,
    /// The third color attachment.
    Color2,
    /// The fourth color attachment.
    Color3,
}

/// The number of attachment points.
pub const ATTACHMENT_COUNT: usize = 5;

/// The number of color attachment points.
pub const MAX_COLOR_ATTACHMENTS: usize = ATTACHMENT_COUNT - 1;

impl RenderTargetAttachment {
    /// All attachments in index order.
    pub const ALL: [RenderTargetAttachment; ATTACHMENT_COUNT] = [
        RenderTargetAttachment::Depth,
        RenderTargetAttachment::Color0,
        RenderTargetAttachment::Color1,
        RenderTargetAttachment::Color2,
        RenderTargetAttachment::Color3,
    ];

    /// Returns the `n`-th color attachment, if it exists.
    pub fn color(n: usize) -> Option<Self> {
        Self::ALL.get(n + 1).copied()
    }

    /// Returns the slot index of the attachment.
    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// A texture (and subtexture, e.g. a cube face) bound to an attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    /// The target texture.
    pub texture: TextureId,
    /// The subtexture index.
    pub subtexture: u32,
}

impl RenderTarget {
    /// Creates a render target on subtexture 0.
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            subtexture: 0,
        }
    }
}

/// The targets bound to every attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderTargets {
    slots: [Option<RenderTarget>; ATTACHMENT_COUNT],
}

impl RenderTargets {
    /// An empty set, rendering to the screen.
    pub const SCREEN: Self = Self {
        slots: [None; ATTACHMENT_COUNT],
    };

    /// Creates a set with a single color target on `Color0`.
    pub fn color(target: RenderTarget) -> Self {
        let mut targets = Self::SCREEN;
        targets.set(RenderTargetAttachment::Color0, Some(target));
        targets
    }

    /// Returns the target bound to `attachment`.
    #[inline]
    pub fn get(&self, attachment: RenderTargetAttachment) -> Option<RenderTarget> {
        self.slots[attachment.index()]
    }

    /// Binds (or unbinds) a target.
    #[inline]
    pub fn set(&mut self, attachment: RenderTargetAttachment, target: Option<RenderTarget>) {
        self.slots[attachment.index()] = target;
    }

    /// Returns `true` when nothing is bound, i.e. rendering goes to the screen.
    pub fn is_screen(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The number of bound color attachments.
    pub fn color_count(&self) -> usize {
        self.slots[1..].iter().filter(|s| s.is_some()).count()
    }

    /// Iterates over the bound attachments.
    pub fn iter(&self) -> impl Iterator<Item = (RenderTargetAttachment, RenderTarget)> + '_ {
        RenderTargetAttachment::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(a, s)| s.map(|t| (*a, t)))
    }
}

/// A copy from a currently bound attachment into a texture, performed before a
/// mesh that samples the framebuffer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreCopy {
    /// The attachment to read from.
    pub source: RenderTargetAttachment,
    /// The texture receiving the copy.
    pub destination: TextureId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_screen() {
        assert!(RenderTargets::SCREEN.is_screen());
        assert!(RenderTargets::default().is_screen());
        let t = RenderTargets::color(RenderTarget::new(TextureId(3)));
        assert!(!t.is_screen());
        assert_eq!(t.color_count(), 1);
    }

    #[test]
    fn iteration_follows_attachment_order() {
        let mut t = RenderTargets::SCREEN;
        t.set(RenderTargetAttachment::Color1, Some(RenderTarget::new(TextureId(2))));
        t.set(RenderTargetAttachment::Depth, Some(RenderTarget::new(TextureId(9))));
        let order: Vec<_> = t.iter().map(|(a, _)| a).collect();
        assert_eq!(
            order,
            vec![RenderTargetAttachment::Depth, RenderTargetAttachment::Color1]
        );
        assert_eq!(RenderTargetAttachment::color(3), Some(RenderTargetAttachment::Color3));
        assert_eq!(RenderTargetAttachment::color(4), None);
    }
}
