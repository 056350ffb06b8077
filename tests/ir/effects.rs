//! Effect summaries and the invalidation predicate.

use tern::ir::{BinaryOp, EffectSummary, Expr, ExprArena, ExprKind, Literal, ValueType};

fn store(arena: &mut ExprArena) -> tern::ir::ExprId {
    let ptr = arena.const_(Literal::I32(0));
    let value = arena.const_(Literal::I32(1));
    arena.alloc(Expr {
        kind: ExprKind::Store {
            bytes: 4,
            align: 4,
            offset: 0,
            ptr,
            value,
        },
        ty: ValueType::None,
    })
}

fn load(arena: &mut ExprArena) -> tern::ir::ExprId {
    let ptr = arena.const_(Literal::I32(0));
    arena.alloc(Expr {
        kind: ExprKind::Load {
            bytes: 4,
            signed: false,
            align: 4,
            offset: 0,
            ptr,
        },
        ty: ValueType::I32,
    })
}

#[test]
fn constants_have_no_effects() {
    let mut arena = ExprArena::new();
    let konst = arena.const_(Literal::I32(1));
    let effects = EffectSummary::analyze(&arena, konst);
    assert!(!effects.has_anything());
}

#[test]
fn store_invalidates_load_both_ways() {
    let mut arena = ExprArena::new();
    let the_store = store(&mut arena);
    let the_load = load(&mut arena);
    let store_effects = EffectSummary::analyze(&arena, the_store);
    let load_effects = EffectSummary::analyze(&arena, the_load);
    assert!(store_effects.writes_memory);
    assert!(load_effects.reads_memory);
    assert!(store_effects.invalidates(&load_effects));
    assert!(load_effects.invalidates(&store_effects));
}

#[test]
fn loads_do_not_invalidate_each_other() {
    let mut arena = ExprArena::new();
    let a = load(&mut arena);
    let b = load(&mut arena);
    let ea = EffectSummary::analyze(&arena, a);
    let eb = EffectSummary::analyze(&arena, b);
    assert!(!ea.invalidates(&eb));
}

#[test]
fn write_after_read_on_the_same_local() {
    let mut arena = ExprArena::new();
    let value = arena.const_(Literal::I32(1));
    let set = arena.set_local(0, value);
    let get = arena.get_local(0, ValueType::I32);
    let write = EffectSummary::analyze(&arena, set);
    let read = EffectSummary::analyze(&arena, get);
    assert!(write.invalidates(&read));
    assert!(read.invalidates(&write));
    // disjoint locals are independent
    let other = arena.get_local(1, ValueType::I32);
    let other_read = EffectSummary::analyze(&arena, other);
    assert!(!write.invalidates(&other_read));
}

#[test]
fn calls_contaminate_memory() {
    let mut arena = ExprArena::new();
    let call = arena.alloc(Expr {
        kind: ExprKind::Call {
            target: "f".to_string(),
            operands: vec![],
        },
        ty: ValueType::None,
    });
    let the_load = load(&mut arena);
    let call_effects = EffectSummary::analyze(&arena, call);
    let load_effects = EffectSummary::analyze(&arena, the_load);
    assert!(call_effects.calls);
    assert!(call_effects.invalidates(&load_effects));
}

#[test]
fn branches_contaminate_everything() {
    let mut arena = ExprArena::new();
    let br = arena.alloc(Expr {
        kind: ExprKind::Break {
            name: "l".to_string(),
            value: None,
            condition: None,
        },
        ty: ValueType::None,
    });
    let branch_effects = EffectSummary::analyze(&arena, br);
    assert!(branch_effects.branches);
    let konst = arena.const_(Literal::I32(1));
    let none = EffectSummary::analyze(&arena, konst);
    assert!(branch_effects.invalidates(&none));
    assert!(none.invalidates(&branch_effects));
}

#[test]
fn division_may_trap_and_respects_external_effects() {
    let mut arena = ExprArena::new();
    let left = arena.const_(Literal::I32(1));
    let right = arena.const_(Literal::I32(0));
    let div = arena.alloc(Expr {
        kind: ExprKind::Binary {
            op: BinaryOp::DivS,
            left,
            right,
        },
        ty: ValueType::I32,
    });
    let div_effects = EffectSummary::analyze(&arena, div);
    assert!(div_effects.may_trap);
    // a trap may not cross a store, which is observable outside
    let the_store = store(&mut arena);
    let store_effects = EffectSummary::analyze(&arena, the_store);
    assert!(div_effects.invalidates(&store_effects));
    // but it may cross a pure local write
    let value = arena.const_(Literal::I32(2));
    let set = arena.set_local(3, value);
    let set_effects = EffectSummary::analyze(&arena, set);
    assert!(!div_effects.invalidates(&set_effects));
}

#[test]
fn merge_in_is_a_union() {
    let mut arena = ExprArena::new();
    let the_load = load(&mut arena);
    let value = arena.const_(Literal::I32(1));
    let set = arena.set_local(2, value);
    let mut merged = EffectSummary::analyze(&arena, the_load);
    let set_effects = EffectSummary::analyze(&arena, set);
    merged.merge_in(&set_effects);
    assert!(merged.reads_memory);
    assert!(merged.locals_written.contains(&2));
    assert!(merged.may_trap);
}
