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
//! The flattened shader-variable array of a render context.
//!
//! Slots are addressed as `[layer][set][name]` and stored in one buffer at
//! `(layer * num_sets + set) * num_sv_names + name`. A set is the variable
//! stack of one mesh; a layer is one render layer (pass group).

use lumen_core::renderer::ShaderVarRef;
use thiserror::Error;

/// Contract violations reported by [`SvArrayHolder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SvArrayError {
    /// `setup` was called on a holder that is already set up.
    #[error("SV array is already set up")]
    AlreadySetup,
    /// A layer or set index is outside the holder's dimensions.
    #[error("SV array index out of range: layer {layer}/{num_layers}, set {set}/{num_sets}")]
    OutOfRange {
        /// The requested layer.
        layer: usize,
        /// The requested set.
        set: usize,
        /// Number of layers.
        num_layers: usize,
        /// Number of sets.
        num_sets: usize,
    },
    /// The replication source lies inside the destination range.
    #[error("cannot replicate set {from} into the range {start}..={end} containing it")]
    OverlappingReplication {
        /// The source set.
        from: usize,
        /// First destination set.
        start: usize,
        /// Last destination set.
        end: usize,
    },
}

/// A dense `layers × sets × names` array of optional shader variables.
///
/// The holder does not own the variables' lifetimes beyond the shared
/// reference each slot keeps. `Clone` deep-copies the slot array.
#[derive(Debug, Clone, Default)]
pub struct SvArrayHolder {
    svs: Vec<Option<ShaderVarRef>>,
    num_layers: usize,
    num_sets: usize,
    num_sv_names: usize,
}

impl SvArrayHolder {
    /// Creates an empty, not yet set up holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `num_layers * num_sv_names * num_sets` empty slots.
    pub fn setup(
        &mut self,
        num_layers: usize,
        num_sv_names: usize,
        num_sets: usize,
    ) -> Result<(), SvArrayError> {
        if self.is_setup() {
            return Err(SvArrayError::AlreadySetup);
        }
        self.num_layers = num_layers;
        self.num_sv_names = num_sv_names;
        self.num_sets = num_sets;
        self.svs = vec![None; num_layers * num_sv_names * num_sets];
        Ok(())
    }

    /// Returns `true` once [`SvArrayHolder::setup`] has run.
    pub fn is_setup(&self) -> bool {
        self.num_layers != 0 || self.num_sets != 0 || self.num_sv_names != 0
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Number of sets per layer.
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Number of name slots per set.
    pub fn num_sv_names(&self) -> usize {
        self.num_sv_names
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.svs.len()
    }

    /// Returns `true` if the holder has no slots.
    pub fn is_empty(&self) -> bool {
        self.svs.is_empty()
    }

    fn check(&self, layer: usize, set: usize) -> Result<usize, SvArrayError> {
        if layer >= self.num_layers || set >= self.num_sets {
            return Err(SvArrayError::OutOfRange {
                layer,
                set,
                num_layers: self.num_layers,
                num_sets: self.num_sets,
            });
        }
        Ok((layer * self.num_sets + set) * self.num_sv_names)
    }

    /// The variable stack of `set` in `layer`, one slot per name.
    pub fn sv_stack(
        &self,
        layer: usize,
        set: usize,
    ) -> Result<&[Option<ShaderVarRef>], SvArrayError> {
        let start = self.check(layer, set)?;
        Ok(&self.svs[start..start + self.num_sv_names])
    }

    /// Mutable form of [`SvArrayHolder::sv_stack`].
    pub fn sv_stack_mut(
        &mut self,
        layer: usize,
        set: usize,
    ) -> Result<&mut [Option<ShaderVarRef>], SvArrayError> {
        let start = self.check(layer, set)?;
        Ok(&mut self.svs[start..start + self.num_sv_names])
    }

    /// Copies the stack of set `from` into sets `start..=end` of `layer`.
    /// `end` defaults to the last set.
    pub fn replicate_set(
        &mut self,
        layer: usize,
        from: usize,
        start: usize,
        end: Option<usize>,
    ) -> Result<(), SvArrayError> {
        if self.num_sets == 1 {
            return Ok(());
        }
        let end = end.unwrap_or(self.num_sets.saturating_sub(1));
        if (start..=end).contains(&from) {
            return Err(SvArrayError::OverlappingReplication { from, start, end });
        }
        let src = self.check(layer, from)?;
        self.check(layer, start)?;
        self.check(layer, end)?;
        let n = self.num_sv_names;
        for set in start..=end {
            let dst = (layer * self.num_sets + set) * n;
            for i in 0..n {
                self.svs[dst + i] = self.svs[src + i].clone();
            }
        }
        Ok(())
    }

    /// Copies layer 0 into every other layer.
    pub fn replicate_layer_zero(&mut self) {
        if self.num_layers <= 1 {
            return;
        }
        let stride = self.num_sets * self.num_sv_names;
        if stride == 0 {
            return;
        }
        let (first, rest) = self.svs.split_at_mut(stride);
        for layer in rest.chunks_mut(stride) {
            layer.clone_from_slice(first);
        }
    }

    /// Inserts an empty layer after `after`, shifting later layers up.
    pub fn insert_layer(&mut self, after: usize) -> Result<(), SvArrayError> {
        if after >= self.num_layers {
            return Err(SvArrayError::OutOfRange {
                layer: after,
                set: 0,
                num_layers: self.num_layers,
                num_sets: self.num_sets,
            });
        }
        let stride = self.num_sets * self.num_sv_names;
        let at = (after + 1) * stride;
        self.svs.splice(at..at, std::iter::repeat(None).take(stride));
        self.num_layers += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::{ShaderValue, ShaderVarName, ShaderVariable};
    use std::rc::Rc;

    fn sv(n: u32) -> ShaderVarRef {
        ShaderVariable::new(ShaderVarName(n), ShaderValue::Int(n as i32))
    }

    fn same(a: &Option<ShaderVarRef>, b: &Option<ShaderVarRef>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    #[test]
    fn every_slot_reads_back_through_its_stack() {
        let (layers, names, sets) = (3, 4, 5);
        let mut holder = SvArrayHolder::new();
        holder.setup(layers, names, sets).unwrap();
        assert_eq!(holder.len(), layers * names * sets);

        let mut written = Vec::new();
        for l in 0..layers {
            for s in 0..sets {
                for n in 0..names {
                    let v = sv((l * 100 + s * 10 + n) as u32);
                    holder.sv_stack_mut(l, s).unwrap()[n] = Some(v.clone());
                    written.push((l, s, n, v));
                }
            }
        }
        for (l, s, n, v) in written {
            let slot = &holder.sv_stack(l, s).unwrap()[n];
            assert!(same(slot, &Some(v)));
        }
    }

    #[test]
    fn setup_twice_and_out_of_range_are_errors() {
        let mut holder = SvArrayHolder::new();
        holder.setup(1, 2, 2).unwrap();
        assert_eq!(holder.setup(1, 2, 2), Err(SvArrayError::AlreadySetup));
        assert!(matches!(
            holder.sv_stack(1, 0),
            Err(SvArrayError::OutOfRange { layer: 1, .. })
        ));
        assert!(holder.sv_stack(0, 2).is_err());
    }

    #[test]
    fn replicate_layer_zero_is_idempotent() {
        let mut holder = SvArrayHolder::new();
        holder.setup(3, 2, 2).unwrap();
        holder.sv_stack_mut(0, 1).unwrap()[1] = Some(sv(7));
        holder.replicate_layer_zero();
        let once: Vec<_> = (0..3)
            .map(|l| holder.sv_stack(l, 1).unwrap().to_vec())
            .collect();
        holder.replicate_layer_zero();
        for l in 0..3 {
            let layer = holder.sv_stack(l, 1).unwrap();
            let zero = holder.sv_stack(0, 1).unwrap();
            assert!(layer.iter().zip(zero).all(|(a, b)| same(a, b)));
            assert!(layer.iter().zip(&once[l]).all(|(a, b)| same(a, b)));
        }
    }

    #[test]
    fn empty_layers_replicate_and_grow_without_slots() {
        let mut holder = SvArrayHolder::new();
        holder.setup(2, 1, 0).unwrap();
        holder.replicate_layer_zero();
        assert_eq!(holder.len(), 0);
        holder.insert_layer(1).unwrap();
        assert_eq!(holder.num_layers(), 3);
        assert_eq!(holder.len(), 0);
    }

    #[test]
    fn replicate_set_copies_into_the_range() {
        let mut holder = SvArrayHolder::new();
        holder.setup(1, 2, 4).unwrap();
        let v = sv(1);
        holder.sv_stack_mut(0, 0).unwrap()[0] = Some(v.clone());
        holder.replicate_set(0, 0, 1, None).unwrap();
        for s in 1..4 {
            assert!(same(&holder.sv_stack(0, s).unwrap()[0], &Some(v.clone())));
        }
        assert_eq!(
            holder.replicate_set(0, 2, 1, Some(3)),
            Err(SvArrayError::OverlappingReplication {
                from: 2,
                start: 1,
                end: 3
            })
        );
    }

    #[test]
    fn replicate_set_is_a_no_op_with_one_set() {
        let mut holder = SvArrayHolder::new();
        holder.setup(1, 1, 1).unwrap();
        assert_eq!(holder.replicate_set(0, 0, 0, None), Ok(()));
    }

    #[test]
    fn insert_layer_shifts_later_layers() {
        let mut holder = SvArrayHolder::new();
        holder.setup(3, 1, 2).unwrap();
        let marks: Vec<_> = (0..3).map(|l| sv(l as u32)).collect();
        for (l, m) in marks.iter().enumerate() {
            holder.sv_stack_mut(l, 0).unwrap()[0] = Some(m.clone());
        }
        holder.insert_layer(0).unwrap();
        assert_eq!(holder.num_layers(), 4);
        assert!(same(&holder.sv_stack(0, 0).unwrap()[0], &Some(marks[0].clone())));
        assert!(holder.sv_stack(1, 0).unwrap().iter().all(Option::is_none));
        assert!(holder.sv_stack(1, 1).unwrap().iter().all(Option::is_none));
        assert!(same(&holder.sv_stack(2, 0).unwrap()[0], &Some(marks[1].clone())));
        assert!(same(&holder.sv_stack(3, 0).unwrap()[0], &Some(marks[2].clone())));
    }
}
