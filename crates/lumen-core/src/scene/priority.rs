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

//! Render priorities: named draw-order buckets.

/// A render priority. Lower priorities draw first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RenderPriority(pub u32);

/// How meshes sharing a priority are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SortMode {
    /// Insertion order.
    #[default]
    None,
    /// Farthest first.
    BackToFront,
    /// Nearest first.
    FrontToBack,
}

/// Resolves priority names to priorities.
#[derive(Debug, Clone)]
pub struct RenderPriorities {
    entries: Vec<(String, SortMode)>,
}

impl RenderPriorities {
    /// Creates an empty table.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a priority, or returns the existing one for `name`.
    pub fn add(&mut self, name: &str, sort_mode: SortMode) -> RenderPriority {
        if let Some(p) = self.resolve(name) {
            return p;
        }
        self.entries.push((name.to_string(), sort_mode));
        RenderPriority(self.entries.len() as u32 - 1)
    }

    /// Looks a priority up by name.
    pub fn resolve(&self, name: &str) -> Option<RenderPriority> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| RenderPriority(i as u32))
    }

    /// The name of a priority.
    pub fn name(&self, priority: RenderPriority) -> Option<&str> {
        self.entries
            .get(priority.0 as usize)
            .map(|(n, _)| n.as_str())
    }

    /// The sorting mode of a priority; unknown priorities are unsorted.
    pub fn sort_mode(&self, priority: RenderPriority) -> SortMode {
        self.entries
            .get(priority.0 as usize)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// The number of priorities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RenderPriorities {
    /// The engine's standard priorities, `init` (0) through `final` (10).
    fn default() -> Self {
        let mut p = Self::empty();
        for (name, sort) in [
            ("init", SortMode::None),
            ("sky", SortMode::None),
            ("sky2", SortMode::None),
            ("portal", SortMode::None),
            ("wall", SortMode::None),
            ("wall2", SortMode::None),
            ("object", SortMode::None),
            ("object2", SortMode::None),
            ("transp", SortMode::BackToFront),
            ("alpha", SortMode::BackToFront),
            ("final", SortMode::None),
        ] {
            p.add(name, sort);
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priorities_resolve_in_order() {
        let p = RenderPriorities::default();
        assert_eq!(p.len(), 11);
        assert_eq!(p.resolve("init"), Some(RenderPriority(0)));
        assert_eq!(p.resolve("portal"), Some(RenderPriority(3)));
        assert_eq!(p.resolve("alpha"), Some(RenderPriority(9)));
        assert_eq!(p.resolve("final"), Some(RenderPriority(10)));
        assert_eq!(p.resolve("nope"), None);
        assert_eq!(p.sort_mode(RenderPriority(8)), SortMode::BackToFront);
        assert_eq!(p.sort_mode(RenderPriority(4)), SortMode::None);
        assert_eq!(p.name(RenderPriority(6)), Some("object"));
    }
}
