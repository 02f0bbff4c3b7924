//! Pass registration and cross-function scheduling.
//!
//! A [`PassPipeline`] holds an ordered list of [`FunctionPass`]es under their
//! fixed names and runs them over a set of functions. Within one function
//! the passes run strictly in order; across functions the work is
//! parallelized with rayon — safe because the analysis cache is sharded by
//! function id and one function's run never touches another's entries.

use rayon::prelude::*;

use crate::{ir::Function, pass::context::OptContext};

/// A pass operating on one function at a time.
pub trait FunctionPass: Send + Sync {
    /// The fixed name this pass is registered under.
    fn name(&self) -> &'static str;

    /// Runs the pass over one function. Passes do not fail; skips and
    /// mutations are visible through the context's event log.
    fn run(&self, ctx: &OptContext, function: &mut Function);
}

/// An ordered sequence of function passes.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn FunctionPass>>,
}

impl PassPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        PassPipeline::default()
    }

    /// Appends a pass to the end of the pipeline.
    pub fn register(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Returns the registered pass names in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Returns the number of registered passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns true if no pass is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass, in order, over every function.
    ///
    /// Functions are processed in parallel; the pass order within each
    /// function is the registration order.
    pub fn run(&self, ctx: &OptContext, functions: &mut [Function]) {
        functions.par_iter_mut().for_each(|function| {
            for pass in &self.passes {
                pass.run(ctx, function);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, FunctionId, Op};
    use crate::pass::RcLoopOptsPass;

    struct Tagger(&'static str);

    impl FunctionPass for Tagger {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, _ctx: &OptContext, function: &mut Function) {
            // Record execution order in the function body.
            if let Some(block) = function.block_mut(function.entry()) {
                block.ops_mut().insert(0, Op::Unreachable);
            }
        }
    }

    fn trivial_function(id: u32) -> Function {
        Function::new(
            FunctionId::new(id),
            "test",
            vec![BasicBlock::new(vec![Op::Return { value: None }], vec![])],
        )
        .unwrap()
    }

    #[test]
    fn test_names_in_registration_order() {
        let mut pipeline = PassPipeline::new();
        pipeline.register(Box::new(RcLoopOptsPass::new()));
        pipeline.register(Box::new(Tagger("cleanup")));

        assert_eq!(pipeline.pass_names(), vec!["rc-loop-opts", "cleanup"]);
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_runs_over_every_function() {
        let mut pipeline = PassPipeline::new();
        pipeline.register(Box::new(Tagger("tag")));
        pipeline.register(Box::new(Tagger("tag-again")));

        let ctx = OptContext::default();
        let mut functions = vec![trivial_function(0), trivial_function(1)];
        pipeline.run(&ctx, &mut functions);

        for function in &functions {
            let entry = function.block(function.entry()).unwrap();
            assert_eq!(entry.ops().len(), 3);
        }
    }
}
