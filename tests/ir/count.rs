//! Local analyzer: get/set counts and SFA detection.

use tern::ir::{ExprKind, Literal, LocalAnalyzer, ValueType};

use crate::support::function;

#[test]
fn params_are_never_sfa() {
    let func = function(
        "f",
        "sig$0",
        vec![ValueType::I32],
        vec![],
        ValueType::None,
        |arena| {
            let get = arena.get_local(0, ValueType::I32);
            arena.drop_(get)
        },
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(!analyzer.is_sfa(0));
}

#[test]
fn single_set_before_any_get_is_sfa() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let value = arena.const_(Literal::I32(1));
            let set = arena.set_local(0, value);
            let get = arena.get_local(0, ValueType::I32);
            let dropped = arena.drop_(get);
            arena.block(None, vec![set, dropped])
        },
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(analyzer.is_sfa(0));
    assert_eq!(analyzer.num_sets[0], 1);
    assert_eq!(analyzer.num_gets(0), 1);
}

#[test]
fn get_before_set_demotes() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let get = arena.get_local(0, ValueType::I32);
            let dropped = arena.drop_(get);
            let value = arena.const_(Literal::I32(1));
            let set = arena.set_local(0, value);
            arena.block(None, vec![dropped, set])
        },
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(!analyzer.is_sfa(0));
}

#[test]
fn second_set_demotes() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let a = arena.const_(Literal::I32(1));
            let set_a = arena.set_local(0, a);
            let b = arena.const_(Literal::I32(2));
            let set_b = arena.set_local(0, b);
            arena.block(None, vec![set_a, set_b])
        },
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(!analyzer.is_sfa(0));
    assert_eq!(analyzer.num_sets[0], 2);
}

#[test]
fn never_set_local_is_not_sfa() {
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| arena.nop(),
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(!analyzer.is_sfa(0));
}

#[test]
fn set_value_get_counts_before_the_set() {
    // the get sits inside the set's value, so post-order sees it first
    let func = function(
        "f",
        "sig$0",
        vec![],
        vec![ValueType::I32],
        ValueType::None,
        |arena| {
            let get = arena.get_local(0, ValueType::I32);
            arena.set_local(0, get)
        },
    );
    let analyzer = LocalAnalyzer::new(&func);
    assert!(!analyzer.is_sfa(0));
    assert!(matches!(
        func.arena[func.body].kind,
        ExprKind::SetLocal { .. }
    ));
}
