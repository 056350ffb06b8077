//! The opcode-table compression layer, end to end.

use tern::binary::{read_module, write_module, write_module_optimized};
use tern::ir::{ExprKind, Literal, ValueType};

use crate::support::{function, module_with, sig_void};

/// A module dominated by one repeated `(i32.const 0)` tuple.
fn const_heavy_module(repeats: usize) -> tern::ir::Module {
    module_with(
        vec![sig_void(0)],
        vec![function(
            "f",
            "sig$0",
            vec![],
            vec![],
            ValueType::None,
            |arena| {
                let mut list = Vec::new();
                for _ in 0..repeats {
                    let konst = arena.const_(Literal::I32(0));
                    list.push(arena.drop_(konst));
                }
                let trailing = arena.nop();
                list.push(trailing);
                arena.block(None, list)
            },
        )],
    )
}

#[test]
fn the_table_shrinks_a_const_heavy_module() {
    let module = const_heavy_module(64);
    let plain = write_module(&module).expect("plain write");
    let optimized = write_module_optimized(&module).expect("optimized write");
    assert!(
        optimized.bytes.len() < plain.bytes.len(),
        "table form ({}) should beat plain form ({})",
        optimized.bytes.len(),
        plain.bytes.len()
    );
}

#[test]
fn the_compressed_form_reads_back_to_the_same_module() {
    let module = const_heavy_module(64);
    let optimized = write_module_optimized(&module).expect("optimized write");
    let back = read_module(&optimized.bytes).expect("reads");
    // same plain encoding from both sides
    let plain_of_source = write_module(&module).expect("writes");
    let plain_of_back = write_module(&back).expect("writes");
    assert_eq!(plain_of_source.bytes, plain_of_back.bytes);
    // and the 64 zero constants are all there
    let func = &back.functions[0];
    let mut zeros = 0;
    tern::ir::walk_ref(&func.arena, func.body, &mut |id| {
        if matches!(
            func.arena[id].kind,
            ExprKind::Const {
                value: Literal::I32(0)
            }
        ) {
            zeros += 1;
        }
    });
    assert_eq!(zeros, 64);
}

#[test]
fn rewriting_the_read_back_module_is_byte_identical() {
    let module = const_heavy_module(64);
    let optimized = write_module_optimized(&module).expect("optimized write");
    let back = read_module(&optimized.bytes).expect("reads");
    let again = write_module_optimized(&back).expect("writes again");
    assert_eq!(optimized.bytes, again.bytes);
}

#[test]
fn mixed_tuples_compress_by_cost() {
    // two hot tuples with different frequencies and several cold ones
    let module = module_with(
        vec![sig_void(0)],
        vec![function(
            "f",
            "sig$0",
            vec![],
            vec![ValueType::I32],
            ValueType::None,
            |arena| {
                let mut list = Vec::new();
                for _ in 0..40 {
                    let konst = arena.const_(Literal::I32(0));
                    list.push(arena.drop_(konst));
                }
                for _ in 0..10 {
                    let konst = arena.const_(Literal::I32(123_456));
                    list.push(arena.drop_(konst));
                }
                for i in 0..5 {
                    let konst = arena.const_(Literal::I64(i64::from(i) << 40));
                    list.push(arena.drop_(konst));
                }
                let trailing = arena.nop();
                list.push(trailing);
                arena.block(None, list)
            },
        )],
    );
    let plain = write_module(&module).expect("plain write");
    let optimized = write_module_optimized(&module).expect("optimized write");
    assert!(optimized.bytes.len() < plain.bytes.len());
    let back = read_module(&optimized.bytes).expect("reads");
    assert_eq!(
        write_module(&back).expect("writes").bytes,
        plain.bytes
    );
}
