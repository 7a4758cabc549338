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
use ahash::AHashSet;
use lumen_core::lumen_bitflags;
use lumen_core::renderer::{RenderTarget, TextureId};
use lumen_core::scene::RenderView;
use std::rc::Rc;

lumen_bitflags! {
    /// How a registered target is refreshed.
    pub struct TargetFlags: u32 {
        /// Render the target once, then forget it.
        const UPDATE_ONCE = 1 << 0;
        /// Render the target every frame, used or not.
        const ALWAYS_USED = 1 << 1;
    }
}

/// A texture kept up to date by rendering a view into it.
#[derive(Debug, Clone)]
pub struct RegisteredTarget {
    /// The view rendered into the texture.
    pub view: Rc<RenderView>,
    /// The texture and subtexture written.
    pub target: RenderTarget,
    /// Refresh flags.
    pub flags: TargetFlags,
}

/// Textures rendered automatically from views (security cameras, dynamic
/// environment maps and so on).
///
/// A target is rendered in a frame when it is [`TargetFlags::ALWAYS_USED`]
/// or has been marked as used since the previous frame.
#[derive(Debug, Default)]
pub struct RenderTargetRegistry {
    targets: Vec<RegisteredTarget>,
    used: AHashSet<TextureId>,
}

impl RenderTargetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `view` to be rendered into `texture`. Registering the same
    /// texture and subtexture again replaces the previous view.
    pub fn register(
        &mut self,
        view: Rc<RenderView>,
        texture: TextureId,
        subtexture: u32,
        flags: TargetFlags,
    ) {
        let target = RenderTarget {
            texture,
            subtexture,
        };
        let entry = RegisteredTarget {
            view,
            target,
            flags,
        };
        match self.targets.iter_mut().find(|t| t.target == target) {
            Some(existing) => *existing = entry,
            None => self.targets.push(entry),
        }
        log::debug!("RenderTargetRegistry: registered {texture:?}/{subtexture}");
    }

    /// Removes every registration of `texture`. Returns `false` when there was
    /// none.
    pub fn unregister(&mut self, texture: TextureId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.target.texture != texture);
        self.used.remove(&texture);
        before != self.targets.len()
    }

    /// Requests `texture` to be rendered in the next frame. Returns `false`
    /// when the texture is not registered.
    pub fn mark_as_used(&mut self, texture: TextureId) -> bool {
        if self.targets.iter().any(|t| t.target.texture == texture) {
            self.used.insert(texture);
            true
        } else {
            false
        }
    }

    /// The targets to render this frame. Clears the used marks and drops
    /// yielded one-shot targets.
    pub fn prepare_frame(&mut self) -> Vec<RegisteredTarget> {
        let used = std::mem::take(&mut self.used);
        let due = |t: &RegisteredTarget| {
            t.flags.contains(TargetFlags::ALWAYS_USED) || used.contains(&t.target.texture)
        };
        let frame: Vec<_> = self.targets.iter().filter(|t| due(t)).cloned().collect();
        self.targets
            .retain(|t| !(due(t) && t.flags.contains(TargetFlags::UPDATE_ONCE)));
        frame
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sector, view};

    #[test]
    fn only_always_used_or_marked_targets_are_due() {
        let mut registry = RenderTargetRegistry::new();
        let v = view(sector(0), 32, 32);
        registry.register(v.clone(), TextureId(1), 0, TargetFlags::ALWAYS_USED);
        registry.register(v.clone(), TextureId(2), 0, TargetFlags::EMPTY);
        registry.register(v, TextureId(3), 0, TargetFlags::UPDATE_ONCE);
        assert_eq!(registry.len(), 3);

        let due: Vec<_> = registry.prepare_frame().iter().map(|t| t.target.texture).collect();
        assert_eq!(due, vec![TextureId(1)]);

        assert!(registry.mark_as_used(TextureId(2)));
        assert!(registry.mark_as_used(TextureId(3)));
        assert!(!registry.mark_as_used(TextureId(9)));
        let due: Vec<_> = registry.prepare_frame().iter().map(|t| t.target.texture).collect();
        assert_eq!(due, vec![TextureId(1), TextureId(2), TextureId(3)]);

        // Marks are consumed and one-shot targets are gone.
        assert_eq!(registry.len(), 2);
        let due: Vec<_> = registry.prepare_frame().iter().map(|t| t.target.texture).collect();
        assert_eq!(due, vec![TextureId(1)]);
    }

    #[test]
    fn registering_twice_replaces_and_unregister_removes() {
        let mut registry = RenderTargetRegistry::new();
        registry.register(view(sector(0), 32, 32), TextureId(1), 0, TargetFlags::EMPTY);
        registry.register(view(sector(1), 32, 32), TextureId(1), 0, TargetFlags::ALWAYS_USED);
        registry.register(view(sector(2), 32, 32), TextureId(1), 1, TargetFlags::EMPTY);
        assert_eq!(registry.len(), 2);

        let due = registry.prepare_frame();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].view.sector.name, "sector1");

        assert!(registry.unregister(TextureId(1)));
        assert!(!registry.unregister(TextureId(1)));
        assert!(registry.is_empty());
    }
}
