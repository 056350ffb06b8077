//! Simplify-locals: sinking, promotion, and the dead-set sweep.

use tern::ir::{ExprKind, Literal, ValueType};
use tern::passes::{Pass, SimplifyLocals};

use crate::support::function;

#[test]
fn sinks_a_set_through_to_its_get() {
    // block [ set 0 (const 42), nop, get 0 ] with an i32 result
    let mut func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::I32,
        |arena| {
            let value = arena.const_(Literal::I32(42));
            let set = arena.set_local(0, value);
            let nop = arena.nop();
            let get = arena.get_local(0, ValueType::I32);
            arena.block(None, vec![set, nop, get])
        },
    );
    SimplifyLocals::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    assert_eq!(list.len(), 3);
    assert!(func.arena[list[0]].is_nop());
    assert!(func.arena[list[1]].is_nop());
    assert_eq!(
        func.arena[list[2]].kind,
        ExprKind::Const {
            value: Literal::I32(42)
        }
    );
    assert_eq!(func.arena[func.body].ty, ValueType::I32);
}

#[test]
fn a_store_blocks_a_load_from_sinking_past_it() {
    // x = load; store; use x  -- the load cannot cross the store
    let mut func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::I32,
        |arena| {
            let ptr = arena.const_(Literal::I32(0));
            let load = arena.alloc(tern::ir::Expr {
                kind: ExprKind::Load {
                    bytes: 4,
                    signed: false,
                    align: 4,
                    offset: 0,
                    ptr,
                },
                ty: ValueType::I32,
            });
            let set = arena.set_local(0, load);
            let store_ptr = arena.const_(Literal::I32(4));
            let store_value = arena.const_(Literal::I32(9));
            let store = arena.alloc(tern::ir::Expr {
                kind: ExprKind::Store {
                    bytes: 4,
                    align: 4,
                    offset: 0,
                    ptr: store_ptr,
                    value: store_value,
                },
                ty: ValueType::None,
            });
            let get = arena.get_local(0, ValueType::I32);
            arena.block(None, vec![set, store, get])
        },
    );
    SimplifyLocals::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    // the set must still be in first position; only its shape may not change
    assert!(matches!(
        func.arena[list[0]].kind,
        ExprKind::SetLocal { .. }
    ));
    assert!(matches!(func.arena[list[2]].kind, ExprKind::GetLocal { .. }));
}

#[test]
fn dead_sets_reduce_to_their_values() {
    // set 0 (call f) with no gets anywhere: the call must survive
    let mut func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let call = arena.alloc(tern::ir::Expr {
                kind: ExprKind::Call {
                    target: "g".to_string(),
                    operands: vec![],
                },
                ty: ValueType::I32,
            });
            let set = arena.set_local(0, call);
            let trailing = arena.nop();
            arena.block(None, vec![set, trailing])
        },
    );
    SimplifyLocals::default().run_function(&mut func).unwrap();
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    assert!(matches!(func.arena[list[0]].kind, ExprKind::Call { .. }));
}

#[test]
fn sinking_across_an_if_requires_a_whole_fragment() {
    // set 0 before an if that uses 0 in only one arm: the get inside the
    // arm holds a half fragment and must not sink
    let mut func = function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![ValueType::I32],
        ValueType::I32,
        |arena| {
            let ptr = arena.const_(Literal::I32(0));
            let load = arena.alloc(tern::ir::Expr {
                kind: ExprKind::Load {
                    bytes: 4,
                    signed: false,
                    align: 4,
                    offset: 0,
                    ptr,
                },
                ty: ValueType::I32,
            });
            let set = arena.set_local(1, load);
            let condition = arena.get_local(0, ValueType::I32);
            let get_in_arm = arena.get_local(1, ValueType::I32);
            let arm_use = arena.drop_(get_in_arm);
            let other_arm = arena.nop();
            let iff = arena.alloc(tern::ir::Expr {
                kind: ExprKind::If {
                    condition,
                    if_true: arm_use,
                    if_false: Some(other_arm),
                },
                ty: ValueType::None,
            });
            let get_after = arena.get_local(1, ValueType::I32);
            arena.block(None, vec![set, iff, get_after])
        },
    );
    SimplifyLocals::default().run_function(&mut func).unwrap();
    // local 1 has two gets, so the set cannot be consumed by either one
    let ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
        panic!("body should stay a block");
    };
    assert!(matches!(
        func.arena[list[0]].kind,
        ExprKind::SetLocal { .. }
    ));
}

#[test]
fn running_twice_changes_nothing_more() {
    let build = |arena: &mut tern::ir::ExprArena| {
        let value = arena.const_(Literal::I32(42));
        let set = arena.set_local(0, value);
        let nop = arena.nop();
        let get = arena.get_local(0, ValueType::I32);
        arena.block(None, vec![set, nop, get])
    };
    let mut once = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::I32,
        build,
    );
    SimplifyLocals::default().run_function(&mut once).unwrap();
    let mut twice = once.clone();
    SimplifyLocals::default().run_function(&mut twice).unwrap();
    assert_eq!(once, twice);
}
