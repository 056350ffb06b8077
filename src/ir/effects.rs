//! Side-effect summaries for sub-trees and single nodes.

use rustc_hash::FxHashSet;

use crate::ir::expr::{ExprArena, ExprId, ExprKind, LocalIndex};
use crate::ir::visit::walk_ref;

/// What a piece of code may observably do. Used to decide whether two pieces
/// can swap execution order.
#[derive(Debug, Clone, Default)]
pub struct EffectSummary {
    /// Contains a break, switch, or return, or reaches an unreachable.
    pub branches: bool,
    /// Contains a direct, imported, or indirect call.
    pub calls: bool,
    pub reads_memory: bool,
    pub writes_memory: bool,
    pub reads_globals: bool,
    pub writes_globals: bool,
    pub locals_read: FxHashSet<LocalIndex>,
    pub locals_written: FxHashSet<LocalIndex>,
    /// May trap: division and remainder, float-to-int truncation, memory
    /// access.
    pub may_trap: bool,
}

impl EffectSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep summary of a whole subtree.
    pub fn analyze(arena: &ExprArena, root: ExprId) -> Self {
        let mut effects = Self::default();
        effects.walk(arena, root);
        effects
    }

    /// Accumulates a whole subtree into this summary.
    pub fn walk(&mut self, arena: &ExprArena, root: ExprId) {
        walk_ref(arena, root, &mut |id| {
            self.check(arena, id);
        });
    }

    /// Accumulates the node's own operation only, ignoring children.
    /// Returns whether anything was recorded. The rewriting passes call
    /// this both before and after a node's children are processed, since a
    /// rewrite may have replaced the node in between.
    pub fn check(&mut self, arena: &ExprArena, id: ExprId) -> bool {
        match &arena[id].kind {
            ExprKind::Break { .. }
            | ExprKind::Switch { .. }
            | ExprKind::Return { .. }
            | ExprKind::Unreachable => self.branches = true,
            ExprKind::Call { .. } | ExprKind::CallImport { .. } | ExprKind::CallIndirect { .. } => {
                self.calls = true;
                self.may_trap = true;
            }
            ExprKind::GetLocal { index } => {
                self.locals_read.insert(*index);
            }
            ExprKind::SetLocal { index, .. } => {
                self.locals_written.insert(*index);
            }
            ExprKind::GetGlobal { .. } => self.reads_globals = true,
            ExprKind::SetGlobal { .. } => self.writes_globals = true,
            ExprKind::Load { .. } => {
                self.reads_memory = true;
                self.may_trap = true;
            }
            ExprKind::Store { .. } => {
                self.writes_memory = true;
                self.may_trap = true;
            }
            ExprKind::Unary { op, .. } => {
                if op.may_trap() {
                    self.may_trap = true;
                } else {
                    return false;
                }
            }
            ExprKind::Binary { op, .. } => {
                if op.may_trap() {
                    self.may_trap = true;
                } else {
                    return false;
                }
            }
            ExprKind::Host { .. } => {
                // treated like a call into the embedder
                self.calls = true;
            }
            _ => return false,
        }
        true
    }

    pub fn accesses_memory(&self) -> bool {
        self.calls || self.reads_memory || self.writes_memory
    }

    pub fn accesses_globals(&self) -> bool {
        self.calls || self.reads_globals || self.writes_globals
    }

    pub fn has_side_effects(&self) -> bool {
        self.branches
            || self.calls
            || self.writes_memory
            || self.writes_globals
            || !self.locals_written.is_empty()
    }

    /// Effects visible outside the function even if it traps right after.
    pub fn has_external_effects(&self) -> bool {
        self.calls || self.writes_memory || self.writes_globals
    }

    pub fn has_anything(&self) -> bool {
        self.has_side_effects()
            || self.reads_memory
            || self.reads_globals
            || self.may_trap
            || !self.locals_read.is_empty()
    }

    /// Whether executing `self` would change the observable behavior of
    /// `other` if the two swapped execution order. Branching contaminates
    /// everything; traps may not be reordered across side effects.
    pub fn invalidates(&self, other: &EffectSummary) -> bool {
        if self.branches || other.branches {
            return true;
        }
        if (self.writes_memory || self.calls) && other.accesses_memory() {
            return true;
        }
        if self.accesses_memory() && (other.writes_memory || other.calls) {
            return true;
        }
        if (self.writes_globals || self.calls) && other.accesses_globals() {
            return true;
        }
        if self.accesses_globals() && (other.writes_globals || other.calls) {
            return true;
        }
        // a trap aborts execution, so it may not move across anything
        // observable from outside the function
        if (self.may_trap && other.has_external_effects())
            || (other.may_trap && self.has_external_effects())
        {
            return true;
        }
        for local in &self.locals_written {
            if other.locals_written.contains(local) || other.locals_read.contains(local) {
                return true;
            }
        }
        for local in &self.locals_read {
            if other.locals_written.contains(local) {
                return true;
            }
        }
        false
    }

    /// Conservative union.
    pub fn merge_in(&mut self, other: &EffectSummary) {
        self.branches |= other.branches;
        self.calls |= other.calls;
        self.reads_memory |= other.reads_memory;
        self.writes_memory |= other.writes_memory;
        self.reads_globals |= other.reads_globals;
        self.writes_globals |= other.writes_globals;
        self.may_trap |= other.may_trap;
        self.locals_read.extend(other.locals_read.iter().copied());
        self.locals_written
            .extend(other.locals_written.iter().copied());
    }
}
