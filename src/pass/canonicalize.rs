//! Loop canonicalization.
//!
//! [`LoopSimplify`] rewrites every loop into canonical form — a dedicated
//! preheader plus a single latch — by inserting fresh blocks and redirecting
//! edges. It maintains the dominator tree and loop forest in place while it
//! mutates, so both structures stay exact without a from-scratch recompute;
//! the pass driver relies on that guarantee when it locks the two kinds
//! against the broad invalidation that follows canonicalization.
//!
//! If `canonicalize` returns false, nothing was touched: no IR edit, no
//! structure update, no event.

use std::sync::Arc;

use crate::{
    analysis::{DominatorTree, LoopForest},
    events::{EventKind, EventLog},
    ir::{BasicBlock, BlockId, Function, Op},
};

/// Capability to normalize loop structure, reporting whether the function
/// body was mutated.
pub trait CanonicalizeLoops {
    /// Rewrites loops into canonical form.
    ///
    /// The dominator tree and loop forest are updated in place (detached via
    /// [`Arc::make_mut`] on first mutation) and remain valid afterwards.
    /// Returns true iff the function body was changed; false means the IR
    /// and both structures are untouched, including their `Arc` identity.
    fn canonicalize(
        &self,
        function: &mut Function,
        dominators: &mut Arc<DominatorTree>,
        forest: &mut Arc<LoopForest>,
    ) -> bool;
}

/// Canonicalizer establishing "preheader + single latch" for every loop.
#[derive(Debug)]
pub struct LoopSimplify {
    events: Arc<EventLog>,
}

impl LoopSimplify {
    /// Creates a canonicalizer recording its steps into the given log.
    #[must_use]
    pub fn new(events: Arc<EventLog>) -> Self {
        LoopSimplify { events }
    }

    /// Inserts a dedicated preheader in front of `header`.
    ///
    /// All predecessors outside the loop are redirected through the new
    /// block; if the header was the entry, the preheader becomes the entry.
    fn insert_preheader(
        &self,
        function: &mut Function,
        dominators: &mut Arc<DominatorTree>,
        forest: &mut Arc<LoopForest>,
        header: BlockId,
        outside_preds: &[BlockId],
    ) {
        let preheader = function.push_block(BasicBlock::new(vec![Op::Branch], vec![header]));
        for &pred in outside_preds {
            if let Some(block) = function.block_mut(pred) {
                block.redirect_successor(header, preheader);
            }
        }
        if function.entry() == header {
            function.set_entry(preheader);
        }

        Arc::make_mut(dominators).insert_above(preheader, header);
        Arc::make_mut(forest).record_preheader(header, preheader);

        self.events
            .record(EventKind::PreheaderInserted)
            .at(function.id())
            .message(format!("{preheader} for loop at {header}"));
    }

    /// Merges all back edges into `header` through one fresh latch block.
    fn merge_latches(
        &self,
        function: &mut Function,
        dominators: &mut Arc<DominatorTree>,
        forest: &mut Arc<LoopForest>,
        header: BlockId,
        latches: &[BlockId],
    ) {
        let merged = function.push_block(BasicBlock::new(vec![Op::Branch], vec![header]));
        for &latch in latches {
            if let Some(block) = function.block_mut(latch) {
                block.redirect_successor(header, merged);
            }
        }

        // The merged latch is dominated by exactly the blocks dominating
        // every original latch.
        let idom = latches
            .iter()
            .copied()
            .reduce(|a, b| dominators.nearest_common_dominator(a, b))
            .expect("loop has at least one latch");
        Arc::make_mut(dominators).append_node(merged, idom);
        Arc::make_mut(forest).record_merged_latch(header, merged);

        self.events
            .record(EventKind::LatchMerged)
            .at(function.id())
            .message(format!("{merged} for loop at {header}"));
    }
}

impl CanonicalizeLoops for LoopSimplify {
    fn canonicalize(
        &self,
        function: &mut Function,
        dominators: &mut Arc<DominatorTree>,
        forest: &mut Arc<LoopForest>,
    ) -> bool {
        let headers: Vec<BlockId> = forest.iter().map(|l| l.header).collect();
        let mut changed = false;

        for header in headers {
            let (needs_preheader, outside_preds) = {
                let info = forest.loop_for_header(header).expect("loop for header");
                let outside: Vec<BlockId> = function
                    .predecessors(header)
                    .into_iter()
                    .filter(|p| !info.contains(*p))
                    .collect();
                (!info.has_preheader(), outside)
            };
            if needs_preheader {
                self.insert_preheader(function, dominators, forest, header, &outside_preds);
                changed = true;
            }

            let latches = {
                let info = forest.loop_for_header(header).expect("loop for header");
                (!info.has_single_latch()).then(|| info.latches.clone())
            };
            if let Some(latches) = latches {
                self.merge_latches(function, dominators, forest, header, &latches);
                changed = true;
            }
        }

        changed
    }
}
