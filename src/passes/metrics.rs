//! Node-count metrics over a module, with diffing against a previous
//! snapshot. The snapshot is explicit state owned by the caller, so
//! successive reports can show what a pass pipeline changed without any
//! process-wide variable.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::ir::expr::ExprKind;
use crate::ir::module::Module;
use crate::ir::visit::walk_ref;

/// Counts of expression nodes by name at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counts: BTreeMap<String, i64>,
}

impl MetricsSnapshot {
    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    /// Renders the counts, with a signed delta column against `previous`
    /// where a key appears in both.
    pub fn report(&self, previous: Option<&MetricsSnapshot>) -> String {
        let mut out = String::from("Counts\n");
        for (key, value) in &self.counts {
            let _ = write!(out, " {key:<25}: {value:<8}");
            if let Some(previous) = previous {
                if let Some(before) = previous.counts.get(key) {
                    let delta = value - before;
                    if delta != 0 {
                        let _ = write!(out, "{delta:+8}");
                    }
                }
            }
            out.push('\n');
        }
        let _ = writeln!(out, "{:<26}: {:<8}", "Total", self.total());
        out
    }
}

/// Counts nodes by tag.
pub fn measure(module: &Module) -> MetricsSnapshot {
    measure_with(module, |kind, expr_name| {
        let _ = kind;
        expr_name.to_string()
    })
}

/// Counts nodes by tag, drilling into the specific operator for unary and
/// binary nodes.
pub fn measure_detailed(module: &Module) -> MetricsSnapshot {
    measure_with(module, |kind, expr_name| match kind {
        ExprKind::Unary { op, .. } => format!("unary-{op:?}"),
        ExprKind::Binary { op, .. } => format!("binary-{op:?}"),
        _ => expr_name.to_string(),
    })
}

fn measure_with(module: &Module, key: impl Fn(&ExprKind, &str) -> String) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::default();
    for func in &module.functions {
        walk_ref(&func.arena, func.body, &mut |id| {
            let expr = &func.arena[id];
            let name = key(&expr.kind, expr.tag_name());
            *snapshot.counts.entry(name).or_insert(0) += 1;
        });
    }
    snapshot
}
