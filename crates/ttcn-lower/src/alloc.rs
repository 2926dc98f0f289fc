//! Fresh names for one compilation request.

use crate::machine::{Label, StateVar, StatusSlot};

/// Hands out labels, interleave state variables and branch status slots.
///
/// One allocator serves one function-level compilation and is threaded
/// through the recursive lowering by `&mut`; names never repeat within it.
#[derive(Debug, Default)]
pub struct Allocator {
    next_label: u32,
    next_state_var: u32,
    next_slot: u32,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn new_state_variable(&mut self) -> StateVar {
        let var = StateVar(self.next_state_var);
        self.next_state_var += 1;
        var
    }

    pub fn new_status_slot(&mut self) -> StatusSlot {
        let slot = StatusSlot(self.next_slot);
        self.next_slot += 1;
        slot
    }

    pub fn labels_allocated(&self) -> u32 {
        self.next_label
    }

    pub fn state_variables_allocated(&self) -> u32 {
        self.next_state_var
    }

    pub fn status_slots_allocated(&self) -> u32 {
        self.next_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_independent() {
        let mut alloc = Allocator::new();
        let labels: HashSet<_> = (0..100).map(|_| alloc.new_label()).collect();
        assert_eq!(labels.len(), 100);
        assert_eq!(alloc.new_state_variable(), StateVar(0));
        assert_eq!(alloc.new_state_variable(), StateVar(1));
        assert_eq!(alloc.new_status_slot(), StatusSlot(0));
        assert_eq!(alloc.labels_allocated(), 100);
        assert_eq!(alloc.state_variables_allocated(), 2);
        assert_eq!(alloc.status_slots_allocated(), 1);
    }
}
