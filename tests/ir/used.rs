//! The structural result-used test.

use tern::ir::{is_result_used, Expr, ExprKind, Literal, ValueType};

use crate::support::function;

#[test]
fn last_block_element_flows_to_a_returning_function() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![],
        ValueType::I32,
        |arena| {
            let konst = arena.const_(Literal::I32(1));
            arena.block(None, vec![konst])
        },
    );
    let body = func.body;
    let konst = match &func.arena[body].kind {
        ExprKind::Block { list, .. } => list[0],
        _ => unreachable!(),
    };
    assert!(is_result_used(&[body, konst], &func));
}

#[test]
fn non_last_block_element_is_unused() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![],
        ValueType::I32,
        |arena| {
            let first = arena.const_(Literal::I32(1));
            let second = arena.const_(Literal::I32(2));
            arena.block(None, vec![first, second])
        },
    );
    let body = func.body;
    let first = match &func.arena[body].kind {
        ExprKind::Block { list, .. } => list[0],
        _ => unreachable!(),
    };
    assert!(!is_result_used(&[body, first], &func));
}

#[test]
fn last_element_of_a_void_function_is_unused() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![],
        ValueType::None,
        |arena| {
            let konst = arena.const_(Literal::I32(1));
            arena.block(None, vec![konst])
        },
    );
    let body = func.body;
    let konst = match &func.arena[body].kind {
        ExprKind::Block { list, .. } => list[0],
        _ => unreachable!(),
    };
    assert!(!is_result_used(&[body, konst], &func));
}

#[test]
fn if_condition_is_consumed() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![],
        ValueType::None,
        |arena| {
            let condition = arena.const_(Literal::I32(1));
            let arm = arena.nop();
            arena.alloc(Expr {
                kind: ExprKind::If {
                    condition,
                    if_true: arm,
                    if_false: None,
                },
                ty: ValueType::None,
            })
        },
    );
    let body = func.body;
    let condition = match &func.arena[body].kind {
        ExprKind::If { condition, .. } => *condition,
        _ => unreachable!(),
    };
    assert!(is_result_used(&[body, condition], &func));
}

#[test]
fn one_armed_if_cannot_forward_a_value() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![],
        ValueType::I32,
        |arena| {
            let condition = arena.const_(Literal::I32(1));
            let arm = arena.const_(Literal::I32(2));
            arena.alloc(Expr {
                kind: ExprKind::If {
                    condition,
                    if_true: arm,
                    if_false: None,
                },
                ty: ValueType::None,
            })
        },
    );
    let body = func.body;
    let arm = match &func.arena[body].kind {
        ExprKind::If { if_true, .. } => *if_true,
        _ => unreachable!(),
    };
    assert!(!is_result_used(&[body, arm], &func));
}

#[test]
fn operands_are_always_consumed() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(1));
            arena.set_local(0, value)
        },
    );
    let body = func.body;
    let value = match &func.arena[body].kind {
        ExprKind::SetLocal { value, .. } => *value,
        _ => unreachable!(),
    };
    assert!(is_result_used(&[body, value], &func));
}

#[test]
fn a_set_in_statement_position_is_unused() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(1));
            let set = arena.set_local(0, value);
            let trailing = arena.nop();
            arena.block(None, vec![set, trailing])
        },
    );
    let body = func.body;
    let set = match &func.arena[body].kind {
        ExprKind::Block { list, .. } => list[0],
        _ => unreachable!(),
    };
    assert!(!is_result_used(&[body, set], &func));
}
