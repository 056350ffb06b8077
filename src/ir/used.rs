//! Structural test for whether an expression's result is consumed.

use crate::ir::expr::{ExprId, ExprKind};
use crate::ir::module::Function;
use crate::ir::ty::ValueType;

/// Given the stack of ancestors with the expression under test on top,
/// decides whether that expression's typed result flows somewhere rather
/// than being dropped.
///
/// The walk climbs one parent at a time. A block forwards only its last
/// element's value, and only if the block itself is used; an if forwards an
/// arm's value only when it has both arms and is itself used, while its
/// condition is always consumed; a loop forwards its body's value when the
/// loop is used. Every other parent consumes its operands outright. Falling
/// off the root means the value is the function's return value.
pub fn is_result_used(stack: &[ExprId], func: &Function) -> bool {
    if stack.is_empty() {
        return func.result != ValueType::None;
    }
    let mut i = stack.len() - 1;
    while i > 0 {
        let above = stack[i];
        let parent = stack[i - 1];
        match &func.arena[parent].kind {
            ExprKind::Block { list, .. } => {
                if list.last() != Some(&above) {
                    return false;
                }
                // last element: the value matters iff the block's does
            }
            ExprKind::If {
                condition,
                if_false,
                ..
            } => {
                if *condition == above {
                    return true;
                }
                if if_false.is_none() {
                    // a one-armed if has no value to forward
                    return false;
                }
            }
            ExprKind::Loop { .. } => {
                // body result is used iff the loop's is
            }
            _ => {
                // every other parent consumes its operands
                return true;
            }
        }
        i -= 1;
    }
    func.result != ValueType::None
}
