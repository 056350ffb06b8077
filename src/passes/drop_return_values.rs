//! Adapts code whose structural nodes implicitly dropped their results:
//! every concretely-typed expression whose value goes nowhere is wrapped in
//! an explicit `Drop`, tees with unused results are demoted to plain sets,
//! and stores stop carrying a value.

use crate::ir::error::IrError;
use crate::ir::expr::{Expr, ExprId, ExprKind};
use crate::ir::module::Function;
use crate::ir::used::is_result_used;
use crate::ir::ty::ValueType;
use crate::ir::visit::{walk, Visitor};
use crate::passes::Pass;

#[derive(Debug, Default)]
pub struct DropReturnValues {
    expression_stack: Vec<ExprId>,
}

/// Rewrites one function into explicit-drop form. Also used by the binary
/// reader, where drops and tee-ness are implicit in tree positions and must
/// be reconstructed after parsing.
pub fn normalize_function(func: &mut Function) {
    let mut pass = DropReturnValues::default();
    let body = func.body;
    walk(&mut pass, func, body);
}

impl DropReturnValues {
    fn maybe_drop(&self, func: &mut Function, id: ExprId) {
        if func.arena[id].ty.is_concrete() && !is_result_used(&self.expression_stack, func) {
            let value = func.arena.lift(id);
            func.arena[id] = Expr {
                kind: ExprKind::Drop { value },
                ty: ValueType::None,
            };
        }
    }

    /// A break that carries a value into a block whose own value is being
    /// dropped must drop that value at the break site too, or the block's
    /// fallthrough and its breaks would disagree about delivering one.
    fn visit_break(&mut self, func: &mut Function, id: ExprId) {
        let ExprKind::Break { name, value, .. } = &func.arena[id].kind else {
            unreachable!();
        };
        let Some(value) = *value else { return };
        let name = name.clone();
        for i in (0..self.expression_stack.len()).rev() {
            match &func.arena[self.expression_stack[i]].kind {
                ExprKind::Block {
                    name: Some(block_name),
                    ..
                } if *block_name == name => {
                    self.check_break_target(func, id, value, i);
                    break;
                }
                ExprKind::Loop { out, entry, .. } => {
                    if entry.as_deref() == Some(&name) {
                        // a continue to the loop top carries no usable value
                        break;
                    }
                    if out.as_deref() == Some(&name) {
                        self.check_break_target(func, id, value, i);
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    fn check_break_target(
        &mut self,
        func: &mut Function,
        br: ExprId,
        value: ExprId,
        target_depth: usize,
    ) {
        let target_stack = &self.expression_stack[..=target_depth];
        if is_result_used(target_stack, func) {
            return;
        }
        // drop the value first; it comes first in order of operations
        if let ExprKind::Break { value, .. } = &mut func.arena[br].kind {
            *value = None;
        }
        func.arena.finalize(br);
        let bare_break = func.arena.lift(br);
        let dropped = func.arena.drop_(value);
        func.arena[br] = Expr {
            kind: ExprKind::Block {
                name: None,
                list: vec![dropped, bare_break],
            },
            ty: ValueType::None,
        };
    }

    fn visit_store(&mut self, func: &mut Function, id: ExprId) {
        func.arena[id].ty = ValueType::None;
        if !is_result_used(&self.expression_stack, func) {
            return;
        }
        // a store no longer returns a value; a consumer still wants one, so
        // spill it: set a helper local, store from it, read it back
        let ExprKind::Store { value, .. } = &func.arena[id].kind else {
            unreachable!();
        };
        let old_value = *value;
        let value_ty = func.arena[old_value].ty;
        let index = func.add_var(value_ty);
        let store = func.arena.lift(id);
        let store_read = func.arena.get_local(index, value_ty);
        if let ExprKind::Store { value, .. } = &mut func.arena[store].kind {
            *value = store_read;
        }
        let spill = func.arena.set_local(index, old_value);
        let inner = func.arena.block(None, vec![spill, store]);
        let result = func.arena.get_local(index, value_ty);
        func.arena[id] = Expr {
            kind: ExprKind::Block {
                name: None,
                list: vec![inner, result],
            },
            ty: value_ty,
        };
    }
}

impl Visitor for DropReturnValues {
    fn pre_visit(&mut self, _func: &mut Function, id: ExprId) {
        self.expression_stack.push(id);
    }

    fn visit(&mut self, func: &mut Function, id: ExprId) {
        match &func.arena[id].kind {
            ExprKind::Block { .. } | ExprKind::If { .. } | ExprKind::Loop { .. } => {
                // children may have changed shape
                func.arena.finalize(id);
                self.maybe_drop(func, id);
            }
            ExprKind::Break { .. } => self.visit_break(func, id),
            ExprKind::SetLocal { is_tee, .. } => {
                if *is_tee && !is_result_used(&self.expression_stack, func) {
                    if let ExprKind::SetLocal { is_tee, .. } = &mut func.arena[id].kind {
                        *is_tee = false;
                    }
                    func.arena[id].ty = ValueType::None;
                }
            }
            ExprKind::Store { .. } => self.visit_store(func, id),
            ExprKind::Call { .. }
            | ExprKind::CallImport { .. }
            | ExprKind::CallIndirect { .. }
            | ExprKind::GetLocal { .. }
            | ExprKind::GetGlobal { .. }
            | ExprKind::Load { .. }
            | ExprKind::Const { .. }
            | ExprKind::Unary { .. }
            | ExprKind::Binary { .. }
            | ExprKind::Select { .. }
            | ExprKind::Host { .. } => self.maybe_drop(func, id),
            _ => {}
        }
    }

    fn post_visit(&mut self, _func: &mut Function, _id: ExprId) {
        self.expression_stack.pop();
    }
}

impl Pass for DropReturnValues {
    fn name(&self) -> &'static str {
        "drop-return-values"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn create(&self) -> Box<dyn Pass> {
        Box::new(DropReturnValues::default())
    }

    fn run_function(&mut self, func: &mut Function) -> Result<(), IrError> {
        self.expression_stack.clear();
        let body = func.body;
        walk(self, func, body);
        Ok(())
    }
}
