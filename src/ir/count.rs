//! Local-variable counting and Single-First-Assignment detection.

use crate::ir::expr::{ExprArena, ExprId, ExprKind};
use crate::ir::module::Function;
use crate::ir::visit::walk_ref;

/// Counts `GetLocal`s per local over a subtree.
#[derive(Debug, Clone, Default)]
pub struct GetLocalCounter {
    pub num_gets: Vec<u32>,
}

impl GetLocalCounter {
    /// Counts gets over one subtree of `func`, usually an if arm.
    pub fn new(func: &Function, root: ExprId) -> Self {
        let mut counter = Self {
            num_gets: vec![0; func.num_locals()],
        };
        counter.count(&func.arena, root);
        counter
    }

    /// Counts gets over a subtree whose list may be detached from `func`.
    pub fn count(&mut self, arena: &ExprArena, root: ExprId) {
        walk_ref(arena, root, &mut |id| {
            if let ExprKind::GetLocal { index } = arena[id].kind {
                self.num_gets[index as usize] += 1;
            }
        });
    }
}

/// Per-local get/set counts and Single-First-Assignment flags.
///
/// A local is SFA when it is not a parameter, has exactly one `SetLocal`,
/// and no `GetLocal` of it occurs before that set in post-order. Much weaker
/// than SSA, but combined with the structured control flow of the tree it is
/// enough for the forward-motion passes.
#[derive(Debug, Clone, Default)]
pub struct LocalAnalyzer {
    pub sfa: Vec<bool>,
    pub num_sets: Vec<u32>,
    pub num_gets: Vec<u32>,
}

impl LocalAnalyzer {
    pub fn new(func: &Function) -> Self {
        let mut analyzer = Self::default();
        analyzer.analyze(func);
        analyzer
    }

    /// Recomputes all three arrays in one post-order walk. Parameters start
    /// non-SFA; other locals start SFA and are demoted as evidence
    /// accumulates.
    pub fn analyze(&mut self, func: &Function) {
        let num = func.num_locals();
        self.num_sets.clear();
        self.num_sets.resize(num, 0);
        self.num_gets.clear();
        self.num_gets.resize(num, 0);
        self.sfa.clear();
        self.sfa.resize(num, true);
        for flag in self.sfa.iter_mut().take(func.num_params()) {
            *flag = false;
        }
        walk_ref(&func.arena, func.body, &mut |id| match func.arena[id].kind {
            ExprKind::GetLocal { index } => {
                let index = index as usize;
                if self.num_sets[index] == 0 {
                    self.sfa[index] = false;
                }
                self.num_gets[index] += 1;
            }
            ExprKind::SetLocal { index, .. } => {
                let index = index as usize;
                self.num_sets[index] += 1;
                if self.num_sets[index] > 1 {
                    self.sfa[index] = false;
                }
            }
            _ => {}
        });
        for i in 0..num {
            if self.num_sets[i] == 0 {
                self.sfa[i] = false;
            }
        }
    }

    pub fn is_sfa(&self, index: u32) -> bool {
        self.sfa[index as usize]
    }

    pub fn num_gets(&self, index: u32) -> u32 {
        self.num_gets[index as usize]
    }
}
