//! Loop-var-splitting: separating phi delivery from in-loop liveness.

use tern::ir::{Expr, ExprArena, ExprId, ExprKind, Literal, ValueType};
use tern::passes::{LoopVarSplitting, Pass};

use crate::support::function;

/// i = 0; loop { i2 = i + 1; if (c) { i = i2; continue } }
/// locals: 0 = c (param), 1 = i, 2 = i2
fn loop_phi_function() -> tern::ir::Function {
    function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![ValueType::I32, ValueType::I32],
        ValueType::None,
        |arena| {
            let zero = arena.const_(Literal::I32(0));
            let init = arena.set_local(1, zero);
            let body = loop_body(arena);
            let looped = arena.alloc(Expr {
                kind: ExprKind::Loop {
                    out: Some("out".to_string()),
                    entry: Some("top".to_string()),
                    body,
                },
                ty: ValueType::None,
            });
            arena.block(None, vec![init, looped])
        },
    )
}

fn loop_body(arena: &mut ExprArena) -> ExprId {
    let get_i = arena.get_local(1, ValueType::I32);
    let one = arena.const_(Literal::I32(1));
    let plus = arena.alloc(Expr {
        kind: ExprKind::Binary {
            op: tern::ir::BinaryOp::Add,
            left: get_i,
            right: one,
        },
        ty: ValueType::I32,
    });
    let set_i2 = arena.set_local(2, plus);
    let get_i2 = arena.get_local(2, ValueType::I32);
    let feed = arena.set_local(1, get_i2);
    let continue_top = arena.alloc(Expr {
        kind: ExprKind::Break {
            name: "top".to_string(),
            value: None,
            condition: None,
        },
        ty: ValueType::None,
    });
    let arm = arena.block(None, vec![feed, continue_top]);
    let condition = arena.get_local(0, ValueType::I32);
    let iff = arena.alloc(Expr {
        kind: ExprKind::If {
            condition,
            if_true: arm,
            if_false: None,
        },
        ty: ValueType::None,
    });
    arena.block(None, vec![set_i2, iff])
}

fn count_sets_of(func: &tern::ir::Function, index: u32) -> usize {
    let mut count = 0;
    tern::ir::walk_ref(&func.arena, func.body, &mut |id| {
        if matches!(func.arena[id].kind, ExprKind::SetLocal { index: i, .. } if i == index) {
            count += 1;
        }
    });
    count
}

#[test]
fn splits_the_loop_phi_into_a_helper() {
    let mut func = loop_phi_function();
    assert_eq!(func.num_locals(), 3);
    LoopVarSplitting::default().run_function(&mut func).unwrap();
    // a helper local of the same type appeared
    assert_eq!(func.num_locals(), 4);
    assert_eq!(func.local_type(3), ValueType::I32);
    // both the init and the continue-side set now write the helper
    assert_eq!(count_sets_of(&func, 3), 2);
    // the loop body now starts by handing the helper back to i
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    let ExprKind::Loop { body, .. } = &func.arena[list[1]].kind else {
        panic!("the loop stays in place");
    };
    let ExprKind::Block { list: seq, .. } = &func.arena[*body].kind else {
        panic!("the body was wrapped in a sequence");
    };
    let ExprKind::SetLocal { index: 1, value, .. } = &func.arena[seq[0]].kind else {
        panic!("the sequence starts with i = helper");
    };
    assert!(matches!(
        func.arena[*value].kind,
        ExprKind::GetLocal { index: 3 }
    ));
}

#[test]
fn helper_is_written_once_per_loop_top_entry() {
    let mut func = loop_phi_function();
    LoopVarSplitting::default().run_function(&mut func).unwrap();
    // two entries into the loop top: the fallthrough and the continue
    assert_eq!(count_sets_of(&func, 3), 2);
    // and i itself is now written only at the loop top
    assert_eq!(count_sets_of(&func, 1), 1);
}

#[test]
fn a_conditional_continue_disqualifies_the_loop() {
    // the same shape, but the continue is conditional: no split
    let mut func = function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![ValueType::I32, ValueType::I32],
        ValueType::None,
        |arena| {
            let zero = arena.const_(Literal::I32(0));
            let init = arena.set_local(1, zero);
            let get_i2 = arena.get_local(2, ValueType::I32);
            let feed = arena.set_local(1, get_i2);
            let condition = arena.get_local(0, ValueType::I32);
            let conditional_continue = arena.alloc(Expr {
                kind: ExprKind::Break {
                    name: "top".to_string(),
                    value: None,
                    condition: Some(condition),
                },
                ty: ValueType::None,
            });
            let body = arena.block(None, vec![feed, conditional_continue]);
            let looped = arena.alloc(Expr {
                kind: ExprKind::Loop {
                    out: Some("out".to_string()),
                    entry: Some("top".to_string()),
                    body,
                },
                ty: ValueType::None,
            });
            arena.block(None, vec![init, looped])
        },
    );
    LoopVarSplitting::default().run_function(&mut func).unwrap();
    assert_eq!(func.num_locals(), 3);
}

#[test]
fn unlabeled_loops_are_left_alone() {
    let mut func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let zero = arena.const_(Literal::I32(0));
            let init = arena.set_local(0, zero);
            let body = arena.nop();
            let looped = arena.alloc(Expr {
                kind: ExprKind::Loop {
                    out: None,
                    entry: None,
                    body,
                },
                ty: ValueType::None,
            });
            arena.block(None, vec![init, looped])
        },
    );
    LoopVarSplitting::default().run_function(&mut func).unwrap();
    assert_eq!(func.num_locals(), 1);
}
