//! Operand iteration order and in-place splicing.

use tern::ir::{
    operand, operand_count, operand_mut, BinaryOp, ExprArena, ExprKind, Literal, Operands,
    ValueType,
};

#[test]
fn leaves_have_no_operands() {
    let mut arena = ExprArena::new();
    let nop = arena.nop();
    let konst = arena.const_(Literal::I32(1));
    let get = arena.get_local(0, ValueType::I32);
    for id in [nop, konst, get] {
        assert_eq!(operand_count(&arena[id]), 0);
        assert_eq!(Operands::new(&arena[id]).count(), 0);
    }
}

#[test]
fn binary_yields_left_then_right() {
    let mut arena = ExprArena::new();
    let left = arena.const_(Literal::I32(1));
    let right = arena.const_(Literal::I32(2));
    let add = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Binary {
            op: BinaryOp::Add,
            left,
            right,
        },
        ty: ValueType::I32,
    });
    let operands: Vec<_> = Operands::new(&arena[add]).collect();
    assert_eq!(operands, vec![left, right]);
}

#[test]
fn store_yields_pointer_then_value() {
    let mut arena = ExprArena::new();
    let ptr = arena.const_(Literal::I32(0));
    let value = arena.const_(Literal::I32(7));
    let store = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Store {
            bytes: 4,
            align: 4,
            offset: 0,
            ptr,
            value,
        },
        ty: ValueType::None,
    });
    let operands: Vec<_> = Operands::new(&arena[store]).collect();
    assert_eq!(operands, vec![ptr, value]);
}

#[test]
fn break_skips_absent_children() {
    let mut arena = ExprArena::new();
    let condition = arena.const_(Literal::I32(1));
    let bare = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Break {
            name: "l".to_string(),
            value: None,
            condition: None,
        },
        ty: ValueType::None,
    });
    assert_eq!(operand_count(&arena[bare]), 0);
    let conditional = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Break {
            name: "l".to_string(),
            value: None,
            condition: Some(condition),
        },
        ty: ValueType::None,
    });
    assert_eq!(operand_count(&arena[conditional]), 1);
    assert_eq!(operand(&arena[conditional], 0), condition);
}

#[test]
fn break_yields_value_before_condition() {
    let mut arena = ExprArena::new();
    let value = arena.const_(Literal::I32(3));
    let condition = arena.const_(Literal::I32(1));
    let br = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Break {
            name: "l".to_string(),
            value: Some(value),
            condition: Some(condition),
        },
        ty: ValueType::None,
    });
    let operands: Vec<_> = Operands::new(&arena[br]).collect();
    assert_eq!(operands, vec![value, condition]);
}

#[test]
fn call_indirect_yields_operands_then_target() {
    let mut arena = ExprArena::new();
    let a = arena.const_(Literal::I32(1));
    let b = arena.const_(Literal::I32(2));
    let target = arena.const_(Literal::I32(0));
    let call = arena.alloc(tern::ir::Expr {
        kind: ExprKind::CallIndirect {
            signature: "sig$0".to_string(),
            operands: vec![a, b],
            target,
        },
        ty: ValueType::None,
    });
    let operands: Vec<_> = Operands::new(&arena[call]).collect();
    assert_eq!(operands, vec![a, b, target]);
}

#[test]
fn select_yields_arms_then_condition() {
    let mut arena = ExprArena::new();
    let if_true = arena.const_(Literal::I32(1));
    let if_false = arena.const_(Literal::I32(2));
    let condition = arena.const_(Literal::I32(0));
    let select = arena.alloc(tern::ir::Expr {
        kind: ExprKind::Select {
            if_true,
            if_false,
            condition,
        },
        ty: ValueType::I32,
    });
    let operands: Vec<_> = Operands::new(&arena[select]).collect();
    assert_eq!(operands, vec![if_true, if_false, condition]);
}

#[test]
fn operand_slot_splices_in_place() {
    let mut arena = ExprArena::new();
    let value = arena.const_(Literal::I32(1));
    let set = arena.set_local(0, value);
    let replacement = arena.const_(Literal::I32(2));
    *operand_mut(&mut arena[set], 0) = replacement;
    assert_eq!(operand(&arena[set], 0), replacement);
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_operand_is_a_logic_error() {
    let mut arena = ExprArena::new();
    let value = arena.const_(Literal::I32(1));
    let drop = arena.drop_(value);
    operand(&arena[drop], 1);
}
