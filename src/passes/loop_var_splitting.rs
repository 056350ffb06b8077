//! Splits critical loop vars, the phis delivered to the head of a loop, so
//! later coalescing can be more effective.
//!
//! A local assigned in tail position on the fallthrough into a loop top and
//! at every unconditional continue is doing two jobs: delivering the next
//! iteration's value, and staying alive throughout the body. Retargeting
//! those final sets at a fresh helper local and assigning it back at the
//! loop top separates the jobs; a coalescer can then drop whichever copy is
//! cheaper.

use std::collections::BTreeMap;
use std::mem;

use log::debug;
use rustc_hash::FxHashMap;

use crate::ir::error::IrError;
use crate::ir::expr::{ExprId, ExprKind, LocalIndex, Name};
use crate::ir::module::Function;
use crate::ir::visit::{walk_linear, LinearVisitor};
use crate::passes::Pass;

/// The last set of each local in the current trace, with no get after it.
type FinalSets = BTreeMap<LocalIndex, ExprId>;

#[derive(Debug, Default)]
pub struct LoopVarSplitting {
    curr_final_sets: FinalSets,
    /// Loop entry label -> the final sets at each entry into the loop top.
    loop_entries: FxHashMap<Name, Vec<FinalSets>>,
}

impl LinearVisitor for LoopVarSplitting {
    fn note_non_linear(&mut self, func: &mut Function, id: ExprId) {
        match &func.arena[id].kind {
            ExprKind::Break {
                name,
                condition,
                ..
            } => {
                if condition.is_some() {
                    // a loop phi must arrive unconditionally
                    self.loop_entries.remove(name);
                } else if let Some(entries) = self.loop_entries.get_mut(name) {
                    // a continue to the loop top
                    entries.push(mem::take(&mut self.curr_final_sets));
                }
            }
            ExprKind::Loop {
                entry: Some(entry), ..
            } => {
                // the fallthrough into the loop top
                self.loop_entries
                    .entry(entry.clone())
                    .or_default()
                    .push(mem::take(&mut self.curr_final_sets));
            }
            _ => {}
        }
        // non-linearity clears the current final sets
        self.curr_final_sets.clear();
    }

    fn visit(&mut self, func: &mut Function, id: ExprId) {
        match &func.arena[id].kind {
            ExprKind::GetLocal { index } => {
                self.curr_final_sets.remove(index);
            }
            ExprKind::SetLocal { index, .. } => {
                self.curr_final_sets.insert(*index, id);
            }
            ExprKind::Switch {
                targets, default, ..
            } => {
                // a switch straight to a loop top implies there is no phi
                for target in targets.clone() {
                    self.loop_entries.remove(&target);
                }
                let default = default.clone();
                self.loop_entries.remove(&default);
            }
            ExprKind::Loop { .. } => self.visit_loop(func, id),
            _ => {}
        }
    }
}

impl LoopVarSplitting {
    /// The loop body has been traversed; all entries into its top are known
    /// and the split can be done.
    fn visit_loop(&mut self, func: &mut Function, id: ExprId) {
        let ExprKind::Loop { entry, .. } = &func.arena[id].kind else {
            unreachable!();
        };
        let Some(entry_label) = entry.clone() else {
            return;
        };
        let entries = self.loop_entries.remove(&entry_label).unwrap_or_default();
        if entries.len() < 2 {
            // no continue delivers a value; nothing is a phi
            return;
        }
        let first = entries[0].clone();
        for (&index, &set_id) in &first {
            let in_all = entries[1..].iter().all(|sets| sets.contains_key(&index));
            if !in_all {
                continue;
            }
            debug!("splitting loop var {index} at {entry_label}");
            let ty = func.local_type(index);
            let helper = func.add_var(ty);
            // every entry's final set now writes the helper
            Self::retarget(func, set_id, helper);
            for sets in &entries[1..] {
                Self::retarget(func, sets[&index], helper);
            }
            // the helper delivered the value to the loop top; hand it back
            // to the original local there
            let get = func.arena.get_local(helper, ty);
            let set = func.arena.set_local(index, get);
            let ExprKind::Loop { body, .. } = &func.arena[id].kind else {
                unreachable!();
            };
            let old_body = *body;
            let sequence = func.arena.sequence(set, old_body);
            if let ExprKind::Loop { body, .. } = &mut func.arena[id].kind {
                *body = sequence;
            }
            func.arena.finalize(id);
        }
    }

    fn retarget(func: &mut Function, set_id: ExprId, new_index: LocalIndex) {
        if let ExprKind::SetLocal { index, .. } = &mut func.arena[set_id].kind {
            *index = new_index;
        }
    }
}

impl Pass for LoopVarSplitting {
    fn name(&self) -> &'static str {
        "loop-var-splitting"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn create(&self) -> Box<dyn Pass> {
        Box::new(LoopVarSplitting::default())
    }

    fn run_function(&mut self, func: &mut Function) -> Result<(), IrError> {
        self.curr_final_sets.clear();
        self.loop_entries.clear();
        let body = func.body;
        walk_linear(self, func, body);
        Ok(())
    }
}
