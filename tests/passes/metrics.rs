//! Node-count metrics and snapshot diffing.

use tern::ir::{Literal, ValueType};
use tern::passes::{measure, measure_detailed, Pass, SimplifyLocals};

use crate::support::{function, module_with, sig_void};

fn sample_module() -> tern::ir::Module {
    module_with(
        vec![sig_void(0)],
        vec![function(
            "f",
            "sig$0",
            vec![],
            vec![ValueType::I32],
            ValueType::None,
            |arena| {
                let value = arena.const_(Literal::I32(42));
                let set = arena.set_local(0, value);
                let nop = arena.nop();
                let get = arena.get_local(0, ValueType::I32);
                let dropped = arena.drop_(get);
                arena.block(None, vec![set, nop, dropped])
            },
        )],
    )
}

#[test]
fn counts_nodes_by_tag() {
    let module = sample_module();
    let snapshot = measure(&module);
    assert_eq!(snapshot.counts.get("set_local"), Some(&1));
    assert_eq!(snapshot.counts.get("get_local"), Some(&1));
    assert_eq!(snapshot.counts.get("const"), Some(&1));
    assert_eq!(snapshot.counts.get("block"), Some(&1));
    assert_eq!(snapshot.total(), 6);
}

#[test]
fn report_diffs_against_a_previous_snapshot() {
    let mut module = sample_module();
    let before = measure(&module);
    SimplifyLocals::default()
        .run_function(&mut module.functions[0])
        .unwrap();
    let after = measure(&module);
    let report = after.report(Some(&before));
    assert!(report.starts_with("Counts\n"));
    assert!(report.contains("Total"));
    // the sink replaced the set and get with nops
    assert!(after.counts.get("set_local").is_none());
    assert!(after.counts["nop"] > before.counts["nop"]);
}

#[test]
fn detailed_metrics_split_operator_counts() {
    let module = module_with(
        vec![sig_void(0)],
        vec![function(
            "f",
            "sig$0",
            vec![],
            vec![],
            ValueType::None,
            |arena| {
                let left = arena.const_(Literal::I32(1));
                let right = arena.const_(Literal::I32(2));
                let add = arena.alloc(tern::ir::Expr {
                    kind: tern::ir::ExprKind::Binary {
                        op: tern::ir::BinaryOp::Add,
                        left,
                        right,
                    },
                    ty: ValueType::I32,
                });
                arena.drop_(add)
            },
        )],
    );
    let snapshot = measure_detailed(&module);
    assert_eq!(snapshot.counts.get("binary-Add"), Some(&1));
    assert!(snapshot.counts.get("binary").is_none());
}
