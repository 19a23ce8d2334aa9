//! Per-processor slot models
//!
//! A slot binds one processor index to at most one probe for a single test.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::probe::ProbeHandle;

/// Binding state of one processor slot
#[derive(Clone, Default)]
pub enum SlotBinding {
    #[default]
    Unassigned,
    Bound(ProbeHandle),
}

impl SlotBinding {
    /// Bound probe, if any
    pub fn probe(&self) -> Option<&ProbeHandle> {
        match self {
            SlotBinding::Unassigned => None,
            SlotBinding::Bound(probe) => Some(probe),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, SlotBinding::Bound(_))
    }
}

impl fmt::Debug for SlotBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotBinding::Unassigned => write!(f, "Unassigned"),
            SlotBinding::Bound(probe) => write!(f, "Bound({})", probe.name()),
        }
    }
}

/// Dense processor-slot table for one test
#[derive(Clone, Debug)]
pub struct SlotMap {
    slots: Vec<SlotBinding>,
}

impl SlotMap {
    /// Create a map with every slot unassigned
    pub fn new(processor_count: usize) -> Self {
        Self {
            slots: vec![SlotBinding::Unassigned; processor_count],
        }
    }

    /// Number of processor slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Bind a slot, replacing any earlier binding
    ///
    /// The caller validates the index.
    pub fn bind(&mut self, slot: usize, probe: ProbeHandle) {
        self.slots[slot] = SlotBinding::Bound(probe);
    }

    /// Probe bound to a slot
    pub fn probe(&self, slot: usize) -> Option<&ProbeHandle> {
        self.slots.get(slot).and_then(SlotBinding::probe)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotBinding> {
        self.slots.iter()
    }

    /// Indices of bound slots in ascending order
    #[cfg(test)]
    pub fn bound_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, binding)| binding.is_bound())
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|b| b.is_bound()).count()
    }
}

/// Outcome of one probe run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotResult {
    /// Average nanoseconds per repetition
    pub duration_ns: u64,
    /// Probe return code, or the negative status of a failed run call
    pub return_code: i32,
}

impl SlotResult {
    pub fn new(duration_ns: u64, return_code: i32) -> Self {
        Self {
            duration_ns,
            return_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

impl fmt::Display for SlotResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns (rc {})", self.duration_ns, self.return_code)
    }
}
