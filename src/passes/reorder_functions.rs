//! Sorts functions to shrink the emitted binary and help it compress.
//!
//! Three refinements, in decreasing importance: heavily-called functions
//! get low indexes so the LEB in each call site stays short; within ranges
//! that cannot change any call site's LEB width, larger functions come
//! first; and within those same ranges, functions with similar bodies are
//! placed next to each other, greedily, so nearby bytes compress well.

use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::binary::writer::write_module;
use crate::ir::error::IrError;
use crate::ir::expr::{ExprKind, Name};
use crate::ir::module::Module;
use crate::ir::visit::walk_ref;
use crate::passes::Pass;

/// Byte-level similarity measure between two function bodies; lower output
/// means more similar. A parameter of the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Shared sliding-window hashes: two bodies are close when many of
    /// their 8-byte windows hash alike.
    #[default]
    HashedWindows,
}

const WINDOW: usize = 8;

/// djb2-style fold of two words, applied byte by byte.
fn rehash(x: u32, y: u32) -> u32 {
    let mut hash: u32 = 5381;
    let mut x = x;
    while x != 0 {
        hash = (hash << 5).wrapping_add(hash) ^ (x & 0xff);
        x >>= 8;
    }
    let mut y = y;
    while y != 0 {
        hash = (hash << 5).wrapping_add(hash) ^ (y & 0xff);
        y >>= 8;
    }
    hash
}

fn window_hashes(data: &[u8]) -> FxHashSet<u32> {
    let mut hashes = FxHashSet::default();
    if data.is_empty() {
        return hashes;
    }
    let window = WINDOW.min(data.len());
    for start in 0..=data.len() - window {
        let mut hash = 0u32;
        for &byte in &data[start..start + window] {
            hash = rehash(hash, u32::from(byte));
        }
        hashes.insert(hash);
    }
    hashes
}

impl DistanceMetric {
    pub fn distance(&self, a: &[u8], b: &[u8]) -> i64 {
        match self {
            DistanceMetric::HashedWindows => {
                let ha = window_hashes(a);
                let hb = window_hashes(b);
                let (small, large) = if ha.len() <= hb.len() {
                    (&ha, &hb)
                } else {
                    (&hb, &ha)
                };
                let shared = small.iter().filter(|hash| large.contains(hash)).count();
                // more shared windows = more similar = smaller distance
                -(shared as i64)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ReorderFunctions {
    pub metric: DistanceMetric,
}

/// Chunk boundaries within which reordering cannot change the LEB width of
/// any call-site index: [0, 2^7), [2^7, 2^14), [2^14, 2^21), ...
fn chunk_end(bits: u32, len: usize) -> usize {
    if bits >= usize::BITS - 1 {
        len
    } else {
        (1usize << bits).min(len)
    }
}

impl ReorderFunctions {
    /// Stage 1: count uses and sort descending. Ties keep original order.
    pub fn sort_by_uses(&self, module: &mut Module) {
        // pre-populate with zeroes so parallel workers only ever perform
        // atomic increments, never insertions
        let uses: FxHashMap<Name, AtomicU32> = module
            .functions
            .iter()
            .map(|func| (func.name.clone(), AtomicU32::new(0)))
            .collect();
        module.functions.par_iter().for_each(|func| {
            walk_ref(&func.arena, func.body, &mut |id| {
                if let ExprKind::Call { target, .. } = &func.arena[id].kind {
                    if let Some(count) = uses.get(target) {
                        count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        });
        // global uses: the start function, exports, and table entries
        if let Some(start) = &module.start {
            if let Some(count) = uses.get(start) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
        for export in &module.exports {
            if let Some(count) = uses.get(&export.value) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
        for name in &module.table {
            if let Some(count) = uses.get(name) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
        let counts: FxHashMap<&Name, u32> = uses
            .iter()
            .map(|(name, count)| (name, count.load(Ordering::Relaxed)))
            .collect();
        // stable sort: equal counts keep their original relative order
        module
            .functions
            .sort_by(|a, b| counts[&b.name].cmp(&counts[&a.name]));
    }

    /// Stage 2: within each LEB chunk, larger encoded bodies first.
    pub fn refine_by_size(&self, module: &mut Module, sizes: &FxHashMap<Name, usize>) {
        let len = module.functions.len();
        let mut start = 0;
        let mut bits = 7;
        while start < len {
            let end = chunk_end(bits, len);
            module.functions[start..end].sort_by(|a, b| {
                sizes[&b.name]
                    .cmp(&sizes[&a.name])
                    .then_with(|| a.name.cmp(&b.name))
            });
            start = end;
            bits += 7;
        }
    }

    /// Stage 3: greedy nearest-neighbor placement within each LEB chunk.
    /// Each position takes the remaining function most similar to the one
    /// just placed; the "last placed" carries across chunk boundaries, as
    /// it should.
    pub fn refine_by_similarity(
        &self,
        module: &mut Module,
        bytes: &[u8],
        spans: &FxHashMap<Name, (usize, usize)>,
    ) {
        let len = module.functions.len();
        let data = |name: &Name| -> &[u8] {
            let (offset, size) = spans[name];
            &bytes[offset..offset + size]
        };
        let mut last: Option<Name> = None;
        let mut start = 0;
        let mut bits = 7;
        while start < len {
            let end = chunk_end(bits, len);
            for i in start..end {
                if let Some(last_name) = &last {
                    let last_data = data(last_name);
                    let mut best_index = i;
                    let mut best_distance =
                        self.metric.distance(last_data, data(&module.functions[i].name));
                    for j in i + 1..end {
                        let candidate =
                            self.metric.distance(last_data, data(&module.functions[j].name));
                        if candidate < best_distance {
                            best_distance = candidate;
                            best_index = j;
                        }
                    }
                    module.functions.swap(i, best_index);
                }
                last = Some(module.functions[i].name.clone());
            }
            start = end;
            bits += 7;
        }
    }
}

impl Pass for ReorderFunctions {
    fn name(&self) -> &'static str {
        "reorder-functions"
    }

    fn create(&self) -> Box<dyn Pass> {
        Box::new(ReorderFunctions {
            metric: self.metric,
        })
    }

    fn run_module(&mut self, module: &mut Module) -> Result<(), IrError> {
        self.sort_by_uses(module);
        // an emit of the sorted module supplies encoded sizes and bytes for
        // the remaining refinements
        let output = write_module(module).map_err(|e| {
            IrError::invariant_violation("module is not encodable during reordering", e.to_string())
        })?;
        let mut sizes: FxHashMap<Name, usize> = FxHashMap::default();
        let mut spans: FxHashMap<Name, (usize, usize)> = FxHashMap::default();
        for entry in &output.toc.functions {
            sizes.insert(entry.name.clone(), entry.size);
            spans.insert(entry.name.clone(), (entry.offset, entry.size));
        }
        self.refine_by_size(module, &sizes);
        self.refine_by_similarity(module, &output.bytes, &spans);
        debug!("reordered {} functions", module.functions.len());
        Ok(())
    }
}
