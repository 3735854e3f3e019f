//! Instruction arena used while compiling.

use peg_ir::ExprId;

use crate::{InstrId, Instruction, Opcode};

/// Instructions in creation order, plus the placement order assigned so
/// far.
#[derive(Default)]
pub(crate) struct CodeBuilder {
    instrs: Vec<Instruction>,
    /// Arena ids in placement order.
    order: Vec<InstrId>,
    placed: Vec<bool>,
}

impl CodeBuilder {
    /// Append an unplaced instruction.
    ///
    /// # Panics
    /// Panics if the arena already holds `u32::MAX` instructions.
    pub(crate) fn emit(&mut self, op: Opcode, next: Option<InstrId>, origin: ExprId) -> InstrId {
        let Ok(index) = u32::try_from(self.instrs.len()) else {
            panic!("instruction arena exceeded capacity: {} instructions", self.instrs.len());
        };
        let id = InstrId::new(index);
        self.instrs.push(Instruction {
            op,
            next,
            origin,
            label: false,
        });
        self.placed.push(false);
        id
    }

    /// Close a loop: `id` falls through to `next`.
    pub(crate) fn patch_next(&mut self, id: InstrId, next: InstrId) {
        self.instrs[id.index()].next = Some(next);
    }

    pub(crate) fn op_mut(&mut self, id: InstrId) -> &mut Opcode {
        &mut self.instrs[id.index()].op
    }

    /// Number of instructions placed so far.
    pub(crate) fn placed_len(&self) -> usize {
        self.order.len()
    }

    /// Placed arena ids from `start` on.
    pub(crate) fn placed_since(&self, start: usize) -> &[InstrId] {
        &self.order[start..]
    }

    /// Assign placement indices to everything reachable from `head` that is
    /// not yet placed, depth first: fallthrough, then branches, then table
    /// entries. Already placed instructions are skipped, so shared tails are
    /// placed once.
    pub(crate) fn place(&mut self, head: InstrId) {
        let mut stack = vec![head];
        while let Some(id) = stack.pop() {
            if self.placed[id.index()] {
                continue;
            }
            self.placed[id.index()] = true;
            self.order.push(id);
            let instr = &self.instrs[id.index()];
            let successors = instr.successors();
            stack.extend(successors.iter().rev().copied());
        }
    }

    /// Renumber placed instructions densely in placement order, drop the
    /// rest, and mark labels.
    ///
    /// Returns the instructions and the arena-to-placement mapping.
    pub(crate) fn finish(self) -> (Vec<Instruction>, Vec<Option<InstrId>>) {
        let mut slot = vec![None; self.instrs.len()];
        for (new, old) in self.order.iter().enumerate() {
            slot[old.index()] = Some(InstrId::new(new as u32));
        }
        let remap = |id: &mut InstrId| {
            debug_assert!(slot[id.index()].is_some(), "reference to unplaced {id:?}");
            if let Some(new) = slot[id.index()] {
                *id = new;
            }
        };

        let mut arena: Vec<Option<Instruction>> = self.instrs.into_iter().map(Some).collect();
        let mut code: Vec<Instruction> = self
            .order
            .iter()
            .filter_map(|old| arena[old.index()].take())
            .collect();
        for instr in &mut code {
            if let Some(next) = &mut instr.next {
                remap(next);
            }
            instr.op.for_each_target_mut(remap);
        }

        let mut labels = vec![false; code.len()];
        for (i, instr) in code.iter().enumerate() {
            if let Some(next) = instr.next {
                if next.index() != i + 1 {
                    labels[next.index()] = true;
                }
            }
            for target in instr.op.branches() {
                labels[target.index()] = true;
            }
        }
        for (instr, label) in code.iter_mut().zip(labels) {
            instr.label = label;
        }
        (code, slot)
    }
}
