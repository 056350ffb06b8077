//! Randomized codec and pass properties over generated well-typed modules.

use proptest::prelude::*;

use tern::binary::{read_module, write_module, write_module_optimized};
use tern::ir::{
    is_result_used, BinaryOp, Expr, ExprArena, ExprId, ExprKind, Literal, UnaryOp, ValueType,
};
use tern::passes::{Pass, SimplifyLocals};

use crate::support::{function, module_with};

const NUM_LOCALS: u32 = 3;

/// An i32-valued expression; everything generated is well typed.
#[derive(Debug, Clone)]
enum TExpr {
    Const(i32),
    Get(u32),
    Add(Box<TExpr>, Box<TExpr>),
    EqZ(Box<TExpr>),
    Select(Box<TExpr>, Box<TExpr>, Box<TExpr>),
    IfElse(Box<TExpr>, Box<TExpr>, Box<TExpr>),
    BlockVal(Vec<TStmt>, Box<TExpr>),
}

/// A statement: its value, if any, is explicitly discarded.
#[derive(Debug, Clone)]
enum TStmt {
    Nop,
    Set(u32, TExpr),
    Drop(TExpr),
}

fn arb_expr() -> impl Strategy<Value = TExpr> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(TExpr::Const),
        (0..NUM_LOCALS).prop_map(TExpr::Get),
    ];
    leaf.prop_recursive(4, 24, 4, |inner| {
        let stmt = prop_oneof![
            Just(TStmt::Nop),
            ((0..NUM_LOCALS), inner.clone()).prop_map(|(i, e)| TStmt::Set(i, e)),
            inner.clone().prop_map(TStmt::Drop),
        ];
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| TExpr::Add(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|e| TExpr::EqZ(Box::new(e))),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(a, b, c)| {
                TExpr::Select(Box::new(a), Box::new(b), Box::new(c))
            }),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, f)| {
                TExpr::IfElse(Box::new(c), Box::new(t), Box::new(f))
            }),
            (proptest::collection::vec(stmt, 0..4), inner).prop_map(|(stmts, value)| {
                TExpr::BlockVal(stmts, Box::new(value))
            }),
        ]
    })
}

fn lower_expr(arena: &mut ExprArena, expr: &TExpr) -> ExprId {
    match expr {
        TExpr::Const(v) => arena.const_(Literal::I32(*v)),
        TExpr::Get(i) => arena.get_local(*i, ValueType::I32),
        TExpr::Add(a, b) => {
            let left = lower_expr(arena, a);
            let right = lower_expr(arena, b);
            arena.alloc(Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::Add,
                    left,
                    right,
                },
                ty: ValueType::I32,
            })
        }
        TExpr::EqZ(e) => {
            let value = lower_expr(arena, e);
            arena.alloc(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::EqZ,
                    value,
                },
                ty: ValueType::I32,
            })
        }
        TExpr::Select(a, b, c) => {
            let if_true = lower_expr(arena, a);
            let if_false = lower_expr(arena, b);
            let condition = lower_expr(arena, c);
            arena.alloc(Expr {
                kind: ExprKind::Select {
                    if_true,
                    if_false,
                    condition,
                },
                ty: ValueType::I32,
            })
        }
        TExpr::IfElse(c, t, f) => {
            let condition = lower_expr(arena, c);
            let if_true = lower_expr(arena, t);
            let if_false = lower_expr(arena, f);
            let id = arena.alloc(Expr {
                kind: ExprKind::If {
                    condition,
                    if_true,
                    if_false: Some(if_false),
                },
                ty: ValueType::None,
            });
            arena.finalize(id);
            id
        }
        TExpr::BlockVal(stmts, value) => {
            let mut list: Vec<ExprId> = stmts.iter().map(|s| lower_stmt(arena, s)).collect();
            list.push(lower_expr(arena, value));
            arena.block(None, list)
        }
    }
}

fn lower_stmt(arena: &mut ExprArena, stmt: &TStmt) -> ExprId {
    match stmt {
        TStmt::Nop => arena.nop(),
        TStmt::Set(i, e) => {
            let value = lower_expr(arena, e);
            arena.set_local(*i, value)
        }
        TStmt::Drop(e) => {
            let value = lower_expr(arena, e);
            arena.drop_(value)
        }
    }
}

fn module_from(exprs: &[TExpr]) -> tern::ir::Module {
    let signature = tern::ir::FunctionType {
        name: "sig$0".to_string(),
        params: vec![ValueType::I32],
        result: ValueType::I32,
    };
    let functions = exprs
        .iter()
        .enumerate()
        .map(|(i, expr)| {
            function(
                &format!("f{i}"),
                "sig$0",
                vec![ValueType::I32],
                vec![ValueType::I32, ValueType::I32],
                ValueType::I32,
                |arena| lower_expr(arena, expr),
            )
        })
        .collect();
    module_with(vec![signature], functions)
}

/// Checks the drop-insertion soundness invariant over one function.
fn assert_drop_soundness(func: &tern::ir::Function) {
    fn check(func: &tern::ir::Function, stack: &mut Vec<ExprId>, id: ExprId) {
        stack.push(id);
        let expr = &func.arena[id];
        if expr.ty.is_concrete() && !matches!(expr.kind, ExprKind::Drop { .. }) {
            assert!(
                is_result_used(stack, func),
                "unused concrete value survived in {}",
                func.name
            );
        }
        if let ExprKind::SetLocal { is_tee, .. } = &expr.kind {
            if *is_tee {
                assert!(is_result_used(stack, func), "tee with an unused result");
            }
        }
        let children: Vec<ExprId> = match &expr.kind {
            ExprKind::Block { list, .. } => list.clone(),
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                let mut v = vec![*condition, *if_true];
                v.extend(*if_false);
                v
            }
            ExprKind::Loop { body, .. } => vec![*body],
            _ => tern::ir::Operands::new(expr).collect(),
        };
        for child in children {
            check(func, stack, child);
        }
        stack.pop();
    }
    check(func, &mut Vec::new(), func.body);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn write_read_write_is_byte_stable(exprs in proptest::collection::vec(arb_expr(), 1..4)) {
        let module = module_from(&exprs);
        let first = write_module(&module).expect("writes");
        let back = read_module(&first.bytes).expect("reads");
        let second = write_module(&back).expect("writes again");
        prop_assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn optimized_write_read_write_is_byte_stable(exprs in proptest::collection::vec(arb_expr(), 1..4)) {
        let module = module_from(&exprs);
        let first = write_module_optimized(&module).expect("writes");
        let back = read_module(&first.bytes).expect("reads");
        let second = write_module_optimized(&back).expect("writes again");
        prop_assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn read_modules_satisfy_drop_soundness(exprs in proptest::collection::vec(arb_expr(), 1..3)) {
        let module = module_from(&exprs);
        let bytes = write_module(&module).expect("writes").bytes;
        let back = read_module(&bytes).expect("reads");
        for func in &back.functions {
            assert_drop_soundness(func);
        }
    }

    #[test]
    fn simplify_locals_is_idempotent(expr in arb_expr()) {
        let module = module_from(std::slice::from_ref(&expr));
        let mut once = module.clone();
        SimplifyLocals::default().run_function(&mut once.functions[0]).unwrap();
        let mut twice = once.clone();
        SimplifyLocals::default().run_function(&mut twice.functions[0]).unwrap();
        // compare through the codec, which ignores orphaned arena slots
        let once_bytes = write_module(&once).expect("writes").bytes;
        let twice_bytes = write_module(&twice).expect("writes").bytes;
        prop_assert_eq!(once_bytes, twice_bytes);
    }

    #[test]
    fn simplify_locals_preserves_encodability(expr in arb_expr()) {
        let module = module_from(std::slice::from_ref(&expr));
        let mut optimized = module.clone();
        SimplifyLocals::default().run_function(&mut optimized.functions[0]).unwrap();
        let bytes = write_module(&optimized).expect("writes").bytes;
        read_module(&bytes).expect("reads back");
    }
}
