//! Code-pushing: moving SFA sets up against, and into, conditionals.

use tern::ir::{Expr, ExprKind, Literal, ValueType};
use tern::passes::{CodePushing, Pass};

use crate::support::function;

#[test]
fn pushes_a_set_into_the_arm_that_uses_it() {
    // block [ set 1 (const 7), if (get 0) (get 1) (nop), nop ]
    let mut func = function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(7));
            let set = arena.set_local(1, value);
            let condition = arena.get_local(0, ValueType::I32);
            let use_in_arm = arena.get_local(1, ValueType::I32);
            let arm_drop = arena.drop_(use_in_arm);
            let other = arena.nop();
            let iff = arena.alloc(Expr {
                kind: ExprKind::If {
                    condition,
                    if_true: arm_drop,
                    if_false: Some(other),
                },
                ty: ValueType::None,
            });
            let trailing = arena.nop();
            arena.block(None, vec![set, iff, trailing])
        },
    );
    CodePushing::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    // the set's old position is a nop now
    assert!(func.arena[list[0]].is_nop());
    let ExprKind::If { if_true, .. } = &func.arena[list[1]].kind else {
        panic!("the if stays in place");
    };
    // and the arm is a block beginning with the pushed set
    let ExprKind::Block { list: arm, .. } = &func.arena[*if_true].kind else {
        panic!("the arm was wrapped in a block");
    };
    assert_eq!(arm.len(), 2);
    assert!(matches!(
        func.arena[arm[0]].kind,
        ExprKind::SetLocal { index: 1, .. }
    ));
    assert!(matches!(func.arena[arm[1]].kind, ExprKind::Drop { .. }));
}

#[test]
fn pushes_past_a_conditional_break_when_independent() {
    // block $exit [ set 1 (const 7), br_if $exit (get 0), drop (get 1), nop ]
    // the set does not feed the condition, so it may move past the br_if
    let mut func = function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(7));
            let set = arena.set_local(1, value);
            let condition = arena.get_local(0, ValueType::I32);
            let br = arena.alloc(Expr {
                kind: ExprKind::Break {
                    name: "exit".to_string(),
                    value: None,
                    condition: Some(condition),
                },
                ty: ValueType::None,
            });
            let get = arena.get_local(1, ValueType::I32);
            let use_it = arena.drop_(get);
            let trailing = arena.nop();
            arena.block(Some("exit".to_string()), vec![set, br, use_it, trailing])
        },
    );
    CodePushing::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    // the set slid past the conditional break, keeping everything else in
    // relative order
    assert!(matches!(func.arena[list[0]].kind, ExprKind::Break { .. }));
    assert!(matches!(
        func.arena[list[1]].kind,
        ExprKind::SetLocal { index: 1, .. }
    ));
    assert!(matches!(func.arena[list[2]].kind, ExprKind::Drop { .. }));
}

#[test]
fn a_set_feeding_the_condition_stays_put() {
    // block [ set 1 (const 7), if (get 1) (nop) , nop ]: all uses are in the
    // condition itself, which runs before the if could be entered
    let mut func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(7));
            let set = arena.set_local(0, value);
            let condition = arena.get_local(0, ValueType::I32);
            let arm = arena.nop();
            let iff = arena.alloc(Expr {
                kind: ExprKind::If {
                    condition,
                    if_true: arm,
                    if_false: None,
                },
                ty: ValueType::None,
            });
            let trailing = arena.nop();
            arena.block(None, vec![set, iff, trailing])
        },
    );
    CodePushing::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    assert!(matches!(
        func.arena[list[0]].kind,
        ExprKind::SetLocal { index: 0, .. }
    ));
}
