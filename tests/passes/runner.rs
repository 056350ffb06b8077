//! Pass driver: registry, ordering, and parallel execution.

use tern::ir::{Literal, ValueType};
use tern::passes::{create_pass, PassOptions, PassRunner};

use crate::support::{function, module_with, sig_void};

fn many_function_module(count: usize) -> tern::ir::Module {
    let functions = (0..count)
        .map(|i| {
            function(
                &format!("f{i}"),
                "sig$0",
                vec![],
                vec![ValueType::I32],
                ValueType::None,
                |arena| {
                    let value = arena.const_(Literal::I32(1));
                    let set = arena.set_local(0, value);
                    let nop = arena.nop();
                    let get = arena.get_local(0, ValueType::I32);
                    let dropped = arena.drop_(get);
                    arena.block(None, vec![set, nop, dropped])
                },
            )
        })
        .collect();
    module_with(vec![sig_void(0)], functions)
}

#[test]
fn registry_knows_every_pass() {
    for name in [
        "simplify-locals",
        "code-pushing",
        "loop-var-splitting",
        "drop-return-values",
        "reorder-functions",
    ] {
        let pass = create_pass(name).expect("registered pass");
        assert_eq!(pass.name(), name);
    }
    assert!(create_pass("no-such-pass").is_none());
}

#[test]
fn unknown_pass_names_are_rejected() {
    let mut runner = PassRunner::new(PassOptions::default());
    assert!(runner.add_by_name("not-a-pass").is_err());
    assert!(runner.add_by_name("simplify-locals").is_ok());
}

#[test]
fn parallel_passes_rewrite_every_function() {
    let mut module = many_function_module(64);
    let mut runner = PassRunner::new(PassOptions { workers: Some(4) });
    runner.add_by_name("simplify-locals").unwrap();
    runner.run(&mut module).unwrap();
    // every function independently got the same rewrite
    for func in &module.functions {
        let tern::ir::ExprKind::Block { list, .. } = &func.arena[func.body].kind else {
            panic!("bodies stay blocks");
        };
        assert!(func.arena[list[0]].is_nop(), "set was sunk in {}", func.name);
    }
}

#[test]
fn pipeline_runs_passes_in_order() {
    let mut module = many_function_module(3);
    let mut runner = PassRunner::new(PassOptions::default());
    runner.add_by_name("drop-return-values").unwrap();
    runner.add_by_name("simplify-locals").unwrap();
    runner.add_by_name("code-pushing").unwrap();
    runner.add_by_name("loop-var-splitting").unwrap();
    runner.add_by_name("reorder-functions").unwrap();
    runner.run(&mut module).unwrap();
    assert_eq!(module.functions.len(), 3);
}
