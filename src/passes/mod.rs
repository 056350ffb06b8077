//! Rewriting passes and the driver that runs them.
//!
//! Passes rewrite function bodies in place, preserving observable semantics.
//! A pass declared function-parallel touches only the function it is handed,
//! so the driver may fan per-function work out to a worker pool; each worker
//! gets its own instance from the pass's clone-factory.

pub mod code_pushing;
pub mod drop_return_values;
pub mod loop_var_splitting;
pub mod metrics;
pub mod reorder_functions;
pub mod simplify_locals;

use log::debug;
use rayon::prelude::*;

use crate::ir::error::IrError;
use crate::ir::module::{Function, Module};

pub use code_pushing::CodePushing;
pub use drop_return_values::DropReturnValues;
pub use loop_var_splitting::LoopVarSplitting;
pub use metrics::{measure, measure_detailed, MetricsSnapshot};
pub use reorder_functions::{DistanceMetric, ReorderFunctions};
pub use simplify_locals::SimplifyLocals;

/// One rewriting pass. Per-run state lives in the instance and is reset by
/// `run_function`/`run_module`, never carried between runs.
pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether per-function work is independent and may run on a pool.
    fn is_function_parallel(&self) -> bool {
        false
    }

    /// Clone-factory; parallel drivers give every worker a fresh instance.
    fn create(&self) -> Box<dyn Pass>;

    /// Rewrites one function. Function-parallel passes implement this.
    fn run_function(&mut self, _func: &mut Function) -> Result<(), IrError> {
        Ok(())
    }

    /// Rewrites the whole module. The default drives `run_function`
    /// sequentially; module-level passes override it.
    fn run_module(&mut self, module: &mut Module) -> Result<(), IrError> {
        for func in &mut module.functions {
            self.run_function(func)?;
        }
        Ok(())
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Worker count for function-parallel passes; `None` uses the global
    /// pool.
    pub workers: Option<usize>,
}

/// Ordered pass pipeline. Passes run sequentially; a function-parallel pass
/// fans out per function and drains before the next pass begins. The first
/// error stops the pipeline.
pub struct PassRunner {
    passes: Vec<Box<dyn Pass>>,
    options: PassOptions,
}

impl PassRunner {
    pub fn new(options: PassOptions) -> Self {
        Self {
            passes: Vec::new(),
            options,
        }
    }

    pub fn add(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Adds a pass from the registry by name.
    pub fn add_by_name(&mut self, name: &str) -> Result<(), IrError> {
        let pass = create_pass(name)
            .ok_or_else(|| IrError::unknown_name("no pass with this name", name))?;
        self.add(pass);
        Ok(())
    }

    pub fn run(&mut self, module: &mut Module) -> Result<(), IrError> {
        for pass in &mut self.passes {
            debug!("running pass {}", pass.name());
            if pass.is_function_parallel() {
                run_function_parallel(pass.as_ref(), module, &self.options)?;
            } else {
                pass.run_module(module)?;
            }
        }
        Ok(())
    }
}

fn run_function_parallel(
    pass: &dyn Pass,
    module: &mut Module,
    options: &PassOptions,
) -> Result<(), IrError> {
    let work = |functions: &mut [Function]| {
        functions
            .par_iter_mut()
            .try_for_each(|func| pass.create().run_function(func))
    };
    match options.workers {
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| {
                    IrError::invariant_violation("could not build worker pool", e.to_string())
                })?;
            pool.install(|| work(&mut module.functions))
        }
        None => work(&mut module.functions),
    }
}

/// Registry of passes addressable by name.
pub fn create_pass(name: &str) -> Option<Box<dyn Pass>> {
    match name {
        "simplify-locals" => Some(Box::new(SimplifyLocals::default())),
        "code-pushing" => Some(Box::new(CodePushing::default())),
        "loop-var-splitting" => Some(Box::new(LoopVarSplitting::default())),
        "drop-return-values" => Some(Box::new(DropReturnValues::default())),
        "reorder-functions" => Some(Box::new(ReorderFunctions::default())),
        _ => None,
    }
}
