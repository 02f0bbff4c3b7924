//! The loop-level reference-count optimization pass.
//!
//! [`RcLoopOptsPass`] is the orchestrator: it gates, canonicalizes loops,
//! keeps the analysis cache consistent across its own mutations, and drives
//! the registered transformations over the loop forest. It never fails —
//! both gates are policy skips, and any needed analysis is computable on
//! demand for every valid function.
//!
//! # Invalidation discipline
//!
//! Canonicalization maintains the dominator tree and loop forest in place,
//! so after it reports a change those two kinds are *locked* while the broad
//! function-body invalidation sweeps everything else (alias, reference
//! identity, regions) out of the cache. If the transformations then report a
//! change of their own, one narrow calls-and-instructions invalidation
//! follows — loop and dominance structure is untouched by loop-local
//! retain/release rewrites, so it survives. Every lock is scoped to its
//! invalidation call and released before the run continues.

use std::sync::Arc;

use crate::{
    analysis::{AnalysisKind, InvalidationScope, ProgramTerminationInfo},
    events::EventKind,
    ir::Function,
    pass::{
        canonicalize::{CanonicalizeLoops, LoopSimplify},
        context::OptContext,
        pipeline::FunctionPass,
        visitor::{LoopVisitorGroup, TransformFactory, TransformInputs},
    },
};

/// Loop-level reference-count optimization, registered as `"rc-loop-opts"`.
///
/// The concrete pairing algorithm is supplied as one or more
/// [`TransformFactory`] registrations; the pass itself only decides when to
/// run, which cached facts are valid inputs, and what to invalidate after.
#[derive(Default)]
pub struct RcLoopOptsPass {
    factories: Vec<Box<dyn TransformFactory>>,
}

impl RcLoopOptsPass {
    /// The fixed pipeline name of this pass.
    pub const NAME: &'static str = "rc-loop-opts";

    /// Creates the pass with no transformations registered.
    #[must_use]
    pub fn new() -> Self {
        RcLoopOptsPass::default()
    }

    /// Registers a transformation factory at the end of the visitor order.
    #[must_use]
    pub fn with_transform(mut self, factory: impl TransformFactory + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }
}

impl FunctionPass for RcLoopOptsPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, ctx: &OptContext, function: &mut Function) {
        if !ctx.options.enable_rc_loop_opts {
            return;
        }
        if function.is_synthesized_initializer() {
            ctx.events
                .record(EventKind::PassSkipped)
                .at(function.id())
                .message("synthesized initializer");
            return;
        }
        let id = function.id();

        let mut dominators = ctx.analyses.dominators(function);
        let mut forest = ctx.analyses.loop_forest(function);

        let canonicalizer = LoopSimplify::new(Arc::clone(&ctx.events));
        if canonicalizer.canonicalize(function, &mut dominators, &mut forest) {
            // Both structures were kept exact in place; write them back and
            // shield them from the sweep that drops everything content-
            // sensitive.
            ctx.analyses.store_dominators(id, Arc::clone(&dominators));
            ctx.analyses.store_loop_forest(id, Arc::clone(&forest));

            let _dominance = ctx.analyses.lock_invalidation(id, AnalysisKind::Dominance);
            let _loop_forest = ctx.analyses.lock_invalidation(id, AnalysisKind::LoopForest);
            ctx.analyses.invalidate(id, InvalidationScope::FUNCTION_BODY);
        }

        let alias = ctx.analyses.alias(function);
        let rc_identity = ctx.analyses.rc_identity(function);
        let regions = ctx.analyses.loop_regions(function);
        let termination = ProgramTerminationInfo::compute(function);

        let mut group = LoopVisitorGroup::new(Arc::clone(&forest), Arc::clone(&ctx.events));
        for factory in &self.factories {
            group.register(factory.create(TransformInputs {
                function: id,
                dominators: Arc::clone(&dominators),
                forest: Arc::clone(&forest),
                alias: Arc::clone(&alias),
                rc_identity: Arc::clone(&rc_identity),
                regions: Arc::clone(&regions),
                termination: termination.clone(),
            }));
        }

        if group.run(function) {
            ctx.analyses
                .invalidate(id, InvalidationScope::CALLS_AND_INSTRUCTIONS);
        }
    }
}
