//! Pushes code forward, potentially behind a condition where it might not
//! always execute.
//!
//! Within a block's list, a set of a Single-First-Assignment local whose
//! uses all lie later can be moved up against the next conditional (an if,
//! or a conditional break), or even into the one arm of the if that holds
//! all of its uses. Branching effects are deliberately ignored when
//! deciding whether something may move past the conditional; admitting
//! motion through conditional skips is the entire point.

use rustc_hash::FxHashMap;

use crate::ir::count::{GetLocalCounter, LocalAnalyzer};
use crate::ir::effects::EffectSummary;
use crate::ir::error::IrError;
use crate::ir::expr::{ExprId, ExprKind, LocalIndex};
use crate::ir::module::Function;
use crate::ir::visit::{walk, Visitor};
use crate::passes::Pass;

#[derive(Debug, Default)]
pub struct CodePushing {
    analyzer: LocalAnalyzer,
    /// Gets seen so far in the main traversal.
    num_gets_so_far: Vec<u32>,
    another_cycle: bool,
}

impl Visitor for CodePushing {
    fn visit(&mut self, func: &mut Function, id: ExprId) {
        if let ExprKind::GetLocal { index } = &func.arena[id].kind {
            self.num_gets_so_far[*index as usize] += 1;
            return;
        }
        // pushing needs at least one element to push, one to push it past,
        // and one that uses what was pushed
        let long_enough = match &func.arena[id].kind {
            ExprKind::Block { list, .. } => list.len() >= 3,
            _ => return,
        };
        if !long_enough {
            return;
        }
        // At this point in the postorder traversal every local whose gets
        // seen so far equal its total gets has no users after this block.
        // An SFA local set in here is therefore used only later in this
        // very list, and can move forward until a non-control-flow ordering
        // conflict stops it.
        let mut list = match &mut func.arena[id].kind {
            ExprKind::Block { list, .. } => std::mem::take(list),
            _ => unreachable!(),
        };
        let pushed_into_if = {
            let mut pusher = Pusher {
                func,
                analyzer: &self.analyzer,
                num_gets_so_far: &self.num_gets_so_far,
                pushable_effects: FxHashMap::default(),
                pushed_into_if: false,
            };
            pusher.run(&mut list);
            pusher.pushed_into_if
        };
        if let ExprKind::Block { list: slot, .. } = &mut func.arena[id].kind {
            *slot = list;
        }
        if pushed_into_if {
            // continue pushing inside the arm next cycle
            self.another_cycle = true;
        }
    }
}

impl Pass for CodePushing {
    fn name(&self) -> &'static str {
        "code-pushing"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn create(&self) -> Box<dyn Pass> {
        Box::new(CodePushing::default())
    }

    fn run_function(&mut self, func: &mut Function) -> Result<(), IrError> {
        self.analyzer.analyze(func);
        loop {
            self.another_cycle = false;
            self.num_gets_so_far.clear();
            self.num_gets_so_far.resize(func.num_locals(), 0);
            let body = func.body;
            walk(self, func, body);
            if !self.another_cycle {
                break;
            }
        }
        Ok(())
    }
}

/// Core optimization logic for one block, used and then discarded.
struct Pusher<'a> {
    func: &'a mut Function,
    analyzer: &'a LocalAnalyzer,
    num_gets_so_far: &'a [u32],
    /// Pushables may be scanned more than once; cache their effects.
    pushable_effects: FxHashMap<ExprId, EffectSummary>,
    pushed_into_if: bool,
}

impl Pusher<'_> {
    /// Finds optimization segments: from the first pushable thing to the
    /// first point past which pushing is worthwhile, then pushes within
    /// that range before continuing forward.
    fn run(&mut self, list: &mut Vec<ExprId>) {
        // a final element never needs pushing; nothing uses it afterwards
        let relevant = list.len() - 1;
        let mut first_pushable: Option<usize> = None;
        let mut i = 0;
        while i < relevant {
            if first_pushable.is_none() && self.is_pushable(list[i]).is_some() {
                first_pushable = Some(i);
                i += 1;
                continue;
            }
            if let Some(first) = first_pushable {
                if self.is_push_point(list[i]) {
                    i = self.optimize_segment(list, first, i);
                    first_pushable = None;
                    continue;
                }
            }
            i += 1;
        }
    }

    fn is_pushable(&self, id: ExprId) -> Option<(ExprId, LocalIndex)> {
        let ExprKind::SetLocal { index, .. } = self.func.arena[id].kind else {
            return None;
        };
        let eligible = self.analyzer.is_sfa(index)
            && self.num_gets_so_far[index as usize] == self.analyzer.num_gets(index);
        eligible.then_some((id, index))
    }

    /// A point worth pushing past: conditional control flow.
    fn is_push_point(&self, id: ExprId) -> bool {
        // look through drops
        let mut curr = id;
        if let ExprKind::Drop { value } = self.func.arena[curr].kind {
            curr = value;
        }
        match &self.func.arena[curr].kind {
            ExprKind::If { .. } => true,
            ExprKind::Break { condition, .. } => condition.is_some(),
            _ => false,
        }
    }

    fn effects_of(&mut self, id: ExprId) -> EffectSummary {
        self.pushable_effects
            .entry(id)
            .or_insert_with(|| EffectSummary::analyze(&self.func.arena, id))
            .clone()
    }

    /// Starting at the element before the push point and walking backward,
    /// collects everything that may move. Later pushables are considered
    /// first so they move out of the way of earlier ones; the final rewrite
    /// keeps their relative order.
    fn optimize_segment(
        &mut self,
        list: &mut Vec<ExprId>,
        first_pushable: usize,
        push_point: usize,
    ) -> usize {
        debug_assert!(first_pushable < push_point);
        let push_point_expr = list[push_point];
        // everything that matters if you want to be pushed past the point;
        // branching is ignored, that is the crucial point of this pass
        let mut cumulative = EffectSummary::analyze(&self.func.arena, push_point_expr);
        cumulative.branches = false;
        let mut to_push: Vec<ExprId> = Vec::new();
        // if handling
        let iff = match self.func.arena[push_point_expr].kind {
            ExprKind::If { .. } => Some(push_point_expr),
            _ => None,
        };
        let mut if_condition: Option<EffectSummary> = None;
        let mut to_push_if_true: Vec<ExprId> = Vec::new();
        let mut to_push_if_false: Vec<ExprId> = Vec::new();
        let mut i = push_point - 1;
        loop {
            if let Some((pushable, index)) = self.is_pushable(list[i]) {
                let effects = self.effects_of(pushable);
                if cumulative.invalidates(&effects) {
                    let mut stays = true;
                    if let Some(if_id) = iff {
                        // cannot move past the if, but maybe into one arm
                        if if_condition.is_none() {
                            let ExprKind::If {
                                condition,
                                if_true,
                                if_false,
                            } = self.func.arena[if_id].kind
                            else {
                                unreachable!();
                            };
                            let condition_effects =
                                EffectSummary::analyze(&self.func.arena, condition);
                            let blocked = condition_effects.invalidates(&effects);
                            if_condition = Some(condition_effects);
                            if !blocked {
                                let total_gets = self.analyzer.num_gets(index);
                                let true_gets =
                                    GetLocalCounter::new(self.func, if_true).num_gets
                                        [index as usize];
                                if true_gets == total_gets {
                                    // all uses are in the ifTrue, good
                                    to_push_if_true.push(pushable);
                                    list[i] = self.func.arena.nop();
                                    stays = false;
                                } else if let Some(if_false) = if_false {
                                    let false_gets =
                                        GetLocalCounter::new(self.func, if_false).num_gets
                                            [index as usize];
                                    if false_gets == total_gets {
                                        to_push_if_false.push(pushable);
                                        list[i] = self.func.arena.nop();
                                        stays = false;
                                    }
                                }
                            }
                        }
                    }
                    if stays {
                        // it stays in place; further pushables must pass it
                        cumulative.merge_in(&effects);
                    }
                } else {
                    to_push.push(pushable);
                }
                if i == first_pushable {
                    break;
                }
            } else {
                // not pushable, so it may block further pushing
                cumulative.walk(&self.func.arena, list[i]);
            }
            debug_assert!(i > 0);
            i -= 1;
        }
        let total = to_push.len();
        if total == 0 && to_push_if_true.is_empty() && to_push_if_false.is_empty() {
            return push_point + 1;
        }
        // compact: skip the pushed elements, shifting the rest up
        let mut skip = 0;
        for i in first_pushable..=push_point {
            if skip < total && list[i] == to_push[total - 1 - skip] {
                skip += 1;
            } else if skip > 0 {
                list[i - skip] = list[i];
            }
        }
        debug_assert_eq!(skip, total);
        // write the pushed elements back, ending right before the point
        for (i, &pushed) in to_push.iter().enumerate() {
            list[push_point - i] = pushed;
        }
        if let Some(if_id) = iff {
            if !to_push_if_true.is_empty() {
                self.push_into_arm(if_id, true, &to_push_if_true);
                self.pushed_into_if = true;
            }
            if !to_push_if_false.is_empty() {
                self.push_into_arm(if_id, false, &to_push_if_false);
                self.pushed_into_if = true;
            }
        }
        // continue right after the point; the pushed elements may push again
        push_point - total + 1
    }

    /// Wraps an arm in a block prepended with the pushed sets, keeping
    /// their original order.
    fn push_into_arm(&mut self, if_id: ExprId, into_true: bool, to_push: &[ExprId]) {
        let ExprKind::If {
            if_true, if_false, ..
        } = self.func.arena[if_id].kind
        else {
            unreachable!();
        };
        let arm = if into_true {
            if_true
        } else {
            if_false.expect("pushed into a missing else arm")
        };
        let mut new_list: Vec<ExprId> = to_push.iter().rev().copied().collect();
        new_list.push(arm);
        let block = self.func.arena.block(None, new_list);
        if let ExprKind::If {
            if_true, if_false, ..
        } = &mut self.func.arena[if_id].kind
        {
            if into_true {
                *if_true = block;
            } else {
                *if_false = Some(block);
            }
        }
        self.func.arena.finalize(if_id);
    }
}
