//! Loop-scoped transformation visitors and their execution group.
//!
//! The concrete retain/release pairing algorithm lives behind the
//! [`LoopVisitor`] trait: something that can process the loops of a function
//! and report afterwards whether it changed anything. The driver composes
//! visitors through a [`LoopVisitorGroup`], which runs them in registration
//! order over a shared loop forest — the group imposes no traversal order of
//! its own, each visitor walks the forest the way its algorithm requires.

use std::sync::Arc;

use crate::{
    analysis::{
        AliasAnalysis, DominatorTree, LoopForest, LoopRegions, ProgramTerminationInfo, RcIdentity,
    },
    events::{EventKind, EventLog},
    ir::{Function, FunctionId},
};

/// A loop-scoped transformation.
///
/// Lifecycle: the group calls [`attach`](Self::attach) once at registration
/// with the shared loop forest, then [`run`](Self::run) once per group run;
/// [`made_change`](Self::made_change) is read after the run and must be true
/// iff the visitor mutated the function's instructions or calls.
pub trait LoopVisitor {
    /// A short identifying name, used in event messages.
    fn name(&self) -> &'static str;

    /// Hands the visitor the loop forest it will traverse.
    fn attach(&mut self, forest: Arc<LoopForest>);

    /// Processes the function's loops.
    fn run(&mut self, function: &mut Function);

    /// Returns true if the last [`run`](Self::run) mutated the function.
    fn made_change(&self) -> bool;
}

/// The analysis bundle a transformation is constructed from.
///
/// Everything a pairing algorithm needs to reason about one function:
/// control-flow structure, aliasing, reference identity, and the per-run
/// termination facts. All cached analyses arrive as shared `Arc`s.
#[derive(Debug, Clone)]
pub struct TransformInputs {
    /// The function being optimized.
    pub function: FunctionId,
    /// Dominator tree.
    pub dominators: Arc<DominatorTree>,
    /// Loop forest.
    pub forest: Arc<LoopForest>,
    /// Alias classes.
    pub alias: Arc<AliasAnalysis>,
    /// Reference-count identity roots.
    pub rc_identity: Arc<RcIdentity>,
    /// Loop-region decomposition.
    pub regions: Arc<LoopRegions>,
    /// Fresh (uncached) termination facts for this run.
    pub termination: ProgramTerminationInfo,
}

/// Creates a [`LoopVisitor`] for one function run.
///
/// The driver holds factories rather than visitors because the analysis
/// bundle differs per function and per run.
pub trait TransformFactory: Send + Sync {
    /// Builds the visitor from this run's analysis bundle.
    fn create(&self, inputs: TransformInputs) -> Box<dyn LoopVisitor>;
}

/// An ordered group of visitors sharing one loop forest.
pub struct LoopVisitorGroup {
    forest: Arc<LoopForest>,
    visitors: Vec<Box<dyn LoopVisitor>>,
    events: Arc<EventLog>,
}

impl LoopVisitorGroup {
    /// Creates an empty group over the given forest.
    #[must_use]
    pub fn new(forest: Arc<LoopForest>, events: Arc<EventLog>) -> Self {
        LoopVisitorGroup {
            forest,
            visitors: Vec::new(),
            events,
        }
    }

    /// Registers a visitor at the end of the group, attaching the forest.
    pub fn register(&mut self, mut visitor: Box<dyn LoopVisitor>) {
        visitor.attach(Arc::clone(&self.forest));
        self.visitors.push(visitor);
    }

    /// Returns the number of registered visitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    /// Returns true if no visitor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Runs every visitor in registration order.
    ///
    /// Returns the logical OR of the visitors' change flags. Each changing
    /// visitor is recorded in the event log under its name.
    pub fn run(&mut self, function: &mut Function) -> bool {
        let mut changed = false;
        for visitor in &mut self.visitors {
            visitor.run(function);
            if visitor.made_change() {
                self.events
                    .record(EventKind::VisitorChanged)
                    .at(function.id())
                    .message(visitor.name());
                changed = true;
            }
        }
        changed
    }
}
