//! Locals-related optimizations.
//!
//! Sinks sets forward to the next get of the same local where possible, and
//! removes a set entirely once no gets remain. Where control flow splits,
//! candidates are tracked as fragments: an if-split halves a candidate's
//! fragment, a merge adds the halves back together, and only a whole
//! fragment may actually sink. The pass also notices when every exit from a
//! labeled block (or both arms of an if-else) sets the same local, and
//! rewrites the group into a single set consuming the block's or if's
//! return value.

use std::collections::BTreeMap;
use std::mem;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::count::GetLocalCounter;
use crate::ir::effects::EffectSummary;
use crate::ir::error::IrError;
use crate::ir::expr::{Expr, ExprId, ExprKind, LocalIndex, Name};
use crate::ir::module::Function;
use crate::ir::used::is_result_used;
use crate::ir::ty::ValueType;
use crate::ir::visit::walk_ref;
use crate::passes::Pass;

/// A rational top/bottom in [0, 1]: how much of the control-flow fan-out
/// still carries the same candidate. Saturating arithmetic keeps absurdly
/// deep if-nests conservative instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fragment {
    top: u64,
    bottom: u64,
}

impl Fragment {
    fn whole() -> Self {
        Self { top: 1, bottom: 1 }
    }

    fn one(&self) -> bool {
        self.top == self.bottom
    }

    fn split(&mut self, factor: u64) {
        self.bottom = self.bottom.saturating_mul(factor);
    }

    fn add(&mut self, other: Fragment) {
        if self.bottom == other.bottom {
            self.top = self.top.saturating_add(other.top);
        } else {
            self.top = self
                .top
                .saturating_mul(other.bottom)
                .saturating_add(other.top.saturating_mul(self.bottom));
            self.bottom = self.bottom.saturating_mul(other.bottom);
        }
        // normalize the common case of merging back to a whole
        if self.top == self.bottom {
            self.top = 1;
            self.bottom = 1;
        }
    }
}

/// A set we may be able to sink: its tree position, the effects of its whole
/// subtree, and how much of the fan-out still carries it.
#[derive(Debug, Clone)]
struct SinkableInfo {
    site: ExprId,
    effects: EffectSummary,
    frag: Fragment,
}

/// Candidates in the current linear trace, keyed by local.
type Sinkables = BTreeMap<LocalIndex, SinkableInfo>;

fn split_sinkables(sinkables: &mut Sinkables, factor: u64) {
    for info in sinkables.values_mut() {
        info.frag.split(factor);
    }
}

/// Merges two traces: a candidate survives only if both sides carry the
/// same site, and its fragments add. Everything else is dropped.
fn merge_sinkables(into: &mut Sinkables, other: &Sinkables) {
    into.retain(|index, info| {
        other
            .get(index)
            .is_some_and(|other_info| other_info.site == info.site)
    });
    for (index, info) in into.iter_mut() {
        info.frag.add(other[index].frag);
    }
}

/// One recorded exit from a block: the break and the trace state at it.
#[derive(Debug)]
struct BlockBreak {
    br: ExprId,
    sinkables: Sinkables,
}

#[derive(Debug, Default)]
pub struct SimplifyLocals {
    sinkables: Sinkables,
    /// All recorded sinkable traces that exit a block, for block returns.
    block_breaks: FxHashMap<Name, Vec<BlockBreak>>,
    /// Blocks we cannot give a return value: switch targets, or blocks that
    /// already carry one.
    unoptimizable_blocks: FxHashSet<Name>,
    /// Saved traces at if-splits, merged again on the way out.
    if_stack: Vec<Sinkables>,
    expression_stack: Vec<ExprId>,
    /// Promotion sites that need a trailing Nop slot next cycle.
    blocks_to_enlarge: Vec<ExprId>,
    ifs_to_enlarge: Vec<ExprId>,
    another_cycle: bool,
}

enum Task {
    Scan(ExprId),
    Pre(ExprId),
    Visit(ExprId),
    Post(ExprId),
    NoteNonLinear(ExprId),
    NoteIfCondition,
    NoteIfTrue(ExprId),
    NoteIfFalse(ExprId),
}

impl SimplifyLocals {
    /// One full traversal. Ifs get dedicated split/merge notes; every other
    /// non-linear construct gets a plain note before its visit.
    fn traverse(&mut self, func: &mut Function) {
        let mut tasks = vec![Task::Scan(func.body)];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Scan(id) => self.scan(func, id, &mut tasks),
                Task::Pre(id) => self.expression_stack.push(id),
                Task::Visit(id) => self.visit(func, id),
                Task::Post(id) => self.visit_post(func, id),
                Task::NoteNonLinear(id) => self.note_non_linear(func, id),
                Task::NoteIfCondition => self.note_if_condition(),
                Task::NoteIfTrue(id) => self.note_if_true(func, id),
                Task::NoteIfFalse(id) => self.note_if_false(func, id),
            }
        }
    }

    fn scan(&mut self, func: &Function, id: ExprId, tasks: &mut Vec<Task>) {
        // tasks are pushed in reverse execution order
        tasks.push(Task::Post(id));
        match &func.arena[id].kind {
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                if let Some(if_false) = if_false {
                    tasks.push(Task::NoteIfFalse(id));
                    tasks.push(Task::Scan(*if_false));
                }
                tasks.push(Task::NoteIfTrue(id));
                tasks.push(Task::Scan(*if_true));
                tasks.push(Task::NoteIfCondition);
                tasks.push(Task::Scan(*condition));
            }
            ExprKind::Block { name, list } => {
                tasks.push(Task::Visit(id));
                if name.is_some() {
                    tasks.push(Task::NoteNonLinear(id));
                }
                for &child in list.iter().rev() {
                    tasks.push(Task::Scan(child));
                }
            }
            ExprKind::Loop { body, .. } => {
                tasks.push(Task::Visit(id));
                tasks.push(Task::Scan(*body));
                tasks.push(Task::NoteNonLinear(id));
            }
            ExprKind::Break {
                value, condition, ..
            } => {
                tasks.push(Task::Visit(id));
                tasks.push(Task::NoteNonLinear(id));
                if let Some(condition) = condition {
                    tasks.push(Task::Scan(*condition));
                }
                if let Some(value) = value {
                    tasks.push(Task::Scan(*value));
                }
            }
            ExprKind::Switch {
                value, condition, ..
            } => {
                tasks.push(Task::Visit(id));
                tasks.push(Task::NoteNonLinear(id));
                tasks.push(Task::Scan(*condition));
                if let Some(value) = value {
                    tasks.push(Task::Scan(*value));
                }
            }
            ExprKind::Return { value } => {
                tasks.push(Task::Visit(id));
                tasks.push(Task::NoteNonLinear(id));
                if let Some(value) = value {
                    tasks.push(Task::Scan(*value));
                }
            }
            ExprKind::Unreachable => {
                tasks.push(Task::Visit(id));
                tasks.push(Task::NoteNonLinear(id));
            }
            _ => {
                tasks.push(Task::Visit(id));
                let expr = &func.arena[id];
                let operands: Vec<ExprId> =
                    crate::ir::iteration::Operands::new(expr).collect();
                for child in operands.into_iter().rev() {
                    tasks.push(Task::Scan(child));
                }
            }
        }
        tasks.push(Task::Pre(id));
    }

    fn note_non_linear(&mut self, func: &mut Function, id: ExprId) {
        match &func.arena[id].kind {
            ExprKind::Break { name, value, .. } => {
                if value.is_some() {
                    // a value means the block already has a return value
                    self.unoptimizable_blocks.insert(name.clone());
                } else {
                    let sinkables = mem::take(&mut self.sinkables);
                    self.block_breaks
                        .entry(name.clone())
                        .or_default()
                        .push(BlockBreak { br: id, sinkables });
                }
            }
            ExprKind::Block { .. } => return, // handled in visit
            ExprKind::Switch {
                targets, default, ..
            } => {
                for target in targets {
                    self.unoptimizable_blocks.insert(target.clone());
                }
                self.unoptimizable_blocks.insert(default.clone());
            }
            _ => {}
        }
        self.sinkables.clear();
    }

    fn note_if_condition(&mut self) {
        // control flow branches in two; leave one half here, park the other
        split_sinkables(&mut self.sinkables, 2);
        self.if_stack.push(self.sinkables.clone());
    }

    fn note_if_true(&mut self, func: &mut Function, id: ExprId) {
        let for_if_false = self.if_stack.pop().expect("if stack underflow");
        let has_else = matches!(
            func.arena[id].kind,
            ExprKind::If {
                if_false: Some(_),
                ..
            }
        );
        if has_else {
            // park the ifTrue trace, start the ifFalse one
            self.if_stack.push(mem::take(&mut self.sinkables));
            self.sinkables = for_if_false;
        } else {
            // no else arm: as if it were empty, merge directly
            merge_sinkables(&mut self.sinkables, &for_if_false);
        }
    }

    fn note_if_false(&mut self, func: &mut Function, id: ExprId) {
        self.optimize_if_return(func, id);
        let if_true_sinkables = self.if_stack.pop().expect("if stack underflow");
        merge_sinkables(&mut self.sinkables, &if_true_sinkables);
    }

    fn visit(&mut self, func: &mut Function, id: ExprId) {
        match &func.arena[id].kind {
            ExprKind::GetLocal { index } => self.visit_get_local(func, id, *index),
            ExprKind::Block { .. } => self.visit_block(func, id),
            _ => {}
        }
    }

    fn visit_get_local(&mut self, func: &mut Function, id: ExprId, index: LocalIndex) {
        let Some(info) = self.sinkables.get(&index) else {
            return;
        };
        // only a whole candidate may sink; a partial one exists on some
        // paths only
        if !info.frag.one() {
            return;
        }
        let site = info.site;
        // the set takes the get's position and becomes a tee delivering its
        // value here; its old site becomes a nop
        func.arena.swap(id, site);
        func.arena.nopify(site);
        if let ExprKind::SetLocal { is_tee, .. } = &mut func.arena[id].kind {
            *is_tee = true;
        }
        func.arena.finalize(id);
        self.sinkables.remove(&index);
        self.another_cycle = true;
    }

    fn visit_post(&mut self, func: &mut Function, id: ExprId) {
        // the node here may be a replacement; re-read it rather than trust
        // what was scanned
        let set_index = match &func.arena[id].kind {
            ExprKind::SetLocal { index, .. } => Some(*index),
            _ => None,
        };
        if let Some(index) = set_index {
            // a second assignment while the first is still sinkable means
            // the first is dead; leave just its value
            if let Some(info) = self.sinkables.get(&index) {
                if info.frag.one() {
                    let site = info.site;
                    let ExprKind::SetLocal { value, .. } = func.arena[site].kind else {
                        unreachable!();
                    };
                    func.arena.swap(site, value);
                    self.sinkables.remove(&index);
                    self.another_cycle = true;
                }
            }
        }
        let mut effects = EffectSummary::new();
        if effects.check(&func.arena, id) {
            self.check_invalidations(&effects);
        }
        if let Some(index) = set_index {
            if !is_result_used(&self.expression_stack, func) {
                debug_assert!(!self.sinkables.contains_key(&index));
                let effects = EffectSummary::analyze(&func.arena, id);
                self.sinkables.insert(
                    index,
                    SinkableInfo {
                        site: id,
                        effects,
                        frag: Fragment::whole(),
                    },
                );
            }
        }
        self.expression_stack.pop();
    }

    fn check_invalidations(&mut self, effects: &EffectSummary) {
        let invalidated: Vec<LocalIndex> = self
            .sinkables
            .iter()
            .filter(|(_, info)| effects.invalidates(&info.effects))
            .map(|(&index, _)| index)
            .collect();
        for index in invalidated {
            self.sinkables.remove(&index);
        }
    }

    fn visit_block(&mut self, func: &mut Function, id: ExprId) {
        let name = match &func.arena[id].kind {
            ExprKind::Block { name, .. } => name.clone(),
            _ => unreachable!(),
        };
        let has_breaks = name
            .as_ref()
            .is_some_and(|n| self.block_breaks.get(n).is_some_and(|v| !v.is_empty()));

        self.optimize_block_return(func, id);

        if let Some(name) = name {
            if self.unoptimizable_blocks.remove(&name) {
                self.sinkables.clear();
            }
            if has_breaks {
                // more than one path reaches the block end, so nonlinear
                self.sinkables.clear();
                self.block_breaks.remove(&name);
            }
        }
    }

    fn optimize_block_return(&mut self, func: &mut Function, block_id: ExprId) {
        let ExprKind::Block { name, .. } = &func.arena[block_id].kind else {
            unreachable!();
        };
        let Some(name) = name.clone() else { return };
        if self.unoptimizable_blocks.contains(&name) {
            return;
        }
        let breaks = match self.block_breaks.remove(&name) {
            Some(breaks) if !breaks.is_empty() => breaks,
            _ => return,
        };
        // find a set that is whole on the fallthrough and at every break
        let mut shared: Option<LocalIndex> = None;
        for (&index, info) in &self.sinkables {
            if !info.frag.one() {
                continue;
            }
            let in_all = breaks.iter().all(|bb| {
                bb.sinkables
                    .get(&index)
                    .is_some_and(|info| info.frag.one())
            });
            if in_all {
                shared = Some(index);
                break;
            }
        }
        let Some(index) = shared else { return };
        // the value transplant needs a nop in tail position; queue a grow
        // for the next cycle if there is none, since pushing here would
        // invalidate recorded sites
        let tail = match &func.arena[block_id].kind {
            ExprKind::Block { list, .. } => list.last().copied(),
            _ => unreachable!(),
        };
        let Some(tail) = tail.filter(|&t| func.arena[t].is_nop()) else {
            self.blocks_to_enlarge.push(block_id);
            return;
        };
        debug!("promoting block {name} into a return value for local {index}");
        // fallthrough: the set's value moves into tail position
        let site = self.sinkables[&index].site;
        let ExprKind::SetLocal { value, .. } = func.arena[site].kind else {
            unreachable!();
        };
        func.arena.swap(tail, value);
        func.arena[block_id].ty = func.arena[tail].ty;
        func.arena.nopify(site);
        // every break: the set's value moves onto the break itself
        for bb in &breaks {
            let break_site = bb.sinkables[&index].site;
            let ExprKind::SetLocal { value, .. } = func.arena[break_site].kind else {
                unreachable!();
            };
            if let ExprKind::Break { value: slot, .. } = &mut func.arena[bb.br].kind {
                *slot = Some(value);
            }
            func.arena.nopify(break_site);
            func.arena.finalize(bb.br);
        }
        // and one set on the block itself replaces them all
        let inner = func.arena.lift(block_id);
        func.arena[block_id] = Expr {
            kind: ExprKind::SetLocal {
                index,
                value: inner,
                is_tee: false,
            },
            ty: ValueType::None,
        };
        self.sinkables.clear();
        self.another_cycle = true;
    }

    /// Merges sets from both arms of an if-else into a set of the if's
    /// return value, when the if's own result is unused.
    fn optimize_if_return(&mut self, func: &mut Function, if_id: ExprId) {
        debug_assert_eq!(self.expression_stack.last(), Some(&if_id));
        if is_result_used(&self.expression_stack, func) {
            return;
        }
        let if_true_sinkables = self.if_stack.last().expect("if stack underflow");
        let if_false_sinkables = &self.sinkables;
        let mut shared: Option<LocalIndex> = None;
        for (&index, info) in if_true_sinkables {
            if !info.frag.one() {
                continue;
            }
            if if_false_sinkables
                .get(&index)
                .is_some_and(|info| info.frag.one())
            {
                shared = Some(index);
                break;
            }
        }
        let Some(index) = shared else { return };
        let ExprKind::If {
            if_true,
            if_false: Some(if_false),
            ..
        } = func.arena[if_id].kind
        else {
            unreachable!();
        };
        // both arms must be blocks ending in a nop slot
        let arm_tail = |arm: ExprId| match &func.arena[arm].kind {
            ExprKind::Block { list, .. } => {
                list.last().copied().filter(|&t| func.arena[t].is_nop())
            }
            _ => None,
        };
        let (Some(true_tail), Some(false_tail)) = (arm_tail(if_true), arm_tail(if_false)) else {
            self.ifs_to_enlarge.push(if_id);
            return;
        };
        debug!("promoting if into a return value for local {index}");
        let true_site = self.if_stack.last().expect("if stack underflow")[&index].site;
        let ExprKind::SetLocal { value, .. } = func.arena[true_site].kind else {
            unreachable!();
        };
        func.arena.swap(true_tail, value);
        func.arena.nopify(true_site);
        func.arena.finalize(if_true);
        let false_site = self.sinkables[&index].site;
        let ExprKind::SetLocal { value, .. } = func.arena[false_site].kind else {
            unreachable!();
        };
        func.arena.swap(false_tail, value);
        func.arena.nopify(false_site);
        func.arena.finalize(if_false);
        func.arena.finalize(if_id);
        let inner = func.arena.lift(if_id);
        func.arena[if_id] = Expr {
            kind: ExprKind::SetLocal {
                index,
                value: inner,
                is_tee: false,
            },
            ty: ValueType::None,
        };
        self.another_cycle = true;
    }

    fn reset(&mut self) {
        self.sinkables.clear();
        self.block_breaks.clear();
        self.unoptimizable_blocks.clear();
        self.if_stack.clear();
        self.expression_stack.clear();
    }

    /// After the cycles settle, sets of locals with no remaining gets are
    /// replaced by their values.
    fn remove_dead_sets(&mut self, func: &mut Function) {
        let mut counter = GetLocalCounter {
            num_gets: vec![0; func.num_locals()],
        };
        counter.count(&func.arena, func.body);
        let mut dead: Vec<ExprId> = Vec::new();
        walk_ref(&func.arena, func.body, &mut |id| {
            if let ExprKind::SetLocal { index, .. } = func.arena[id].kind {
                if counter.num_gets[index as usize] == 0 {
                    dead.push(id);
                }
            }
        });
        // post-order ensures inner replacements land before outer ones
        for id in dead {
            let ExprKind::SetLocal { value, .. } = func.arena[id].kind else {
                unreachable!();
            };
            func.arena.swap(id, value);
        }
    }
}

impl Pass for SimplifyLocals {
    fn name(&self) -> &'static str {
        "simplify-locals"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn create(&self) -> Box<dyn Pass> {
        Box::new(SimplifyLocals::default())
    }

    fn run_function(&mut self, func: &mut Function) -> Result<(), IrError> {
        // multiple cycles may be needed: a sink can unblock another, and
        // promotions ask for nop slots one cycle ahead
        loop {
            self.another_cycle = false;
            self.traverse(func);
            if !self.blocks_to_enlarge.is_empty() {
                for block in mem::take(&mut self.blocks_to_enlarge) {
                    let nop = func.arena.nop();
                    if let ExprKind::Block { list, .. } = &mut func.arena[block].kind {
                        list.push(nop);
                    }
                }
                self.another_cycle = true;
            }
            if !self.ifs_to_enlarge.is_empty() {
                for if_id in mem::take(&mut self.ifs_to_enlarge) {
                    self.enlarge_if(func, if_id);
                }
                self.another_cycle = true;
            }
            self.reset();
            if !self.another_cycle {
                break;
            }
        }
        self.remove_dead_sets(func);
        Ok(())
    }
}

impl SimplifyLocals {
    /// Blockifies both arms and guarantees each ends with a nop slot.
    fn enlarge_if(&mut self, func: &mut Function, if_id: ExprId) {
        let ExprKind::If {
            if_true, if_false, ..
        } = func.arena[if_id].kind
        else {
            return;
        };
        let fix_arm = |func: &mut Function, arm: ExprId| -> ExprId {
            let arm = func.arena.blockify(arm);
            let needs_nop = match &func.arena[arm].kind {
                ExprKind::Block { list, .. } => {
                    list.last().map_or(true, |&t| !func.arena[t].is_nop())
                }
                _ => unreachable!(),
            };
            if needs_nop {
                let nop = func.arena.nop();
                if let ExprKind::Block { list, .. } = &mut func.arena[arm].kind {
                    list.push(nop);
                }
            }
            arm
        };
        let new_true = fix_arm(func, if_true);
        let new_false = if_false.map(|arm| fix_arm(func, arm));
        if let ExprKind::If {
            if_true, if_false, ..
        } = &mut func.arena[if_id].kind
        {
            *if_true = new_true;
            *if_false = new_false;
        }
    }
}
