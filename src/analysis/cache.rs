//! Per-function analysis caching with scoped invalidation.
//!
//! The cache memoizes the five whole-function analyses by
//! `(AnalysisKind, FunctionId)`. Every entry is a tagged slot —
//! uninitialized, valid, or invalid — and an invalid slot is never served: a
//! `get` recomputes it first. Derived analyses reuse their cached inputs
//! within one `get` sequence (the loop forest is detected over the cached
//! dominator tree, regions over the cached forest), so a single fetch never
//! recomputes the same fact twice.
//!
//! # Invalidation
//!
//! After a transformation mutates a function it reports *how much* it
//! changed through an [`InvalidationScope`]. Each analysis kind declares the
//! scope bits it is sensitive to; an invalidation drops exactly the kinds
//! whose sensitivity intersects the reported scope. Control-flow structures
//! (dominators, loop forest, regions) survive the narrow
//! [`CALLS_AND_INSTRUCTIONS`](InvalidationScope::CALLS_AND_INSTRUCTIONS)
//! scope; only the broad
//! [`FUNCTION_BODY`](InvalidationScope::FUNCTION_BODY) scope reaches them.
//!
//! # Invalidation locks
//!
//! A transformation that maintains an analysis in place (loop
//! canonicalization keeps the dominator tree and loop forest exact) locks
//! that kind for the duration of its invalidation call, so a broad sweep
//! does not drop what is still valid. Locks are per kind, per function,
//! depth 1, and held through an RAII guard — release is guaranteed on every
//! exit path.
//!
//! # Sharing
//!
//! One cache may serve many functions concurrently: entries are sharded by
//! [`FunctionId`] in a [`DashMap`], and a run over one function never
//! touches another function's entry.

use std::sync::Arc;

use bitflags::bitflags;
use dashmap::DashMap;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{
    analysis::{
        compute_dominators, detect_loops, AliasAnalysis, DominatorTree, LoopForest, LoopRegions,
        RcIdentity,
    },
    events::{EventKind, EventLog},
    ir::{Function, FunctionId},
};

bitflags! {
    /// The breadth of cached analyses discarded after a mutation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InvalidationScope: u8 {
        /// Instruction-level content changed.
        const INSTRUCTIONS = 1 << 0;
        /// Call sites changed.
        const CALLS = 1 << 1;
        /// Branches (control flow) changed.
        const BRANCHES = 1 << 2;
        /// Calls and instructions changed, control flow untouched. The
        /// narrow scope issued after loop-local retain/release rewrites.
        const CALLS_AND_INSTRUCTIONS = Self::CALLS.bits() | Self::INSTRUCTIONS.bits();
        /// Everything about the function body may have changed.
        const FUNCTION_BODY =
            Self::INSTRUCTIONS.bits() | Self::CALLS.bits() | Self::BRANCHES.bits();
    }
}

impl InvalidationScope {
    /// A short name for event messages.
    #[must_use]
    pub fn describe(self) -> &'static str {
        if self == InvalidationScope::FUNCTION_BODY {
            "function-body"
        } else if self == InvalidationScope::CALLS_AND_INSTRUCTIONS {
            "calls-and-instructions"
        } else {
            "partial"
        }
    }
}

/// The kinds of cached whole-function analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum AnalysisKind {
    /// Dominator tree.
    Dominance,
    /// Natural loop forest.
    LoopForest,
    /// Allocation-site alias classes.
    Alias,
    /// Reference-count identity roots.
    RcIdentity,
    /// Loop-region decomposition.
    LoopRegions,
}

impl AnalysisKind {
    /// The scope bits this analysis is sensitive to.
    ///
    /// Dominators, the loop forest, and the region decomposition only
    /// depend on branch structure; alias and reference-identity facts
    /// depend on instruction and call content.
    #[must_use]
    pub fn sensitivity(self) -> InvalidationScope {
        match self {
            AnalysisKind::Dominance | AnalysisKind::LoopForest | AnalysisKind::LoopRegions => {
                InvalidationScope::BRANCHES
            }
            AnalysisKind::Alias | AnalysisKind::RcIdentity => {
                InvalidationScope::CALLS_AND_INSTRUCTIONS
            }
        }
    }

    fn lock_bit(self) -> u8 {
        match self {
            AnalysisKind::Dominance => 1 << 0,
            AnalysisKind::LoopForest => 1 << 1,
            AnalysisKind::Alias => 1 << 2,
            AnalysisKind::RcIdentity => 1 << 3,
            AnalysisKind::LoopRegions => 1 << 4,
        }
    }
}

/// A validity-tagged cache slot.
#[derive(Debug, Default, Clone)]
enum Slot<T> {
    /// Never computed.
    #[default]
    Uninitialized,
    /// Computed and current.
    Valid(Arc<T>),
    /// Dropped by an invalidation; must be recomputed before the next read.
    Invalid,
}

impl<T> Slot<T> {
    fn get(&self) -> Option<Arc<T>> {
        match self {
            Slot::Valid(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    fn store(&mut self, value: Arc<T>) {
        *self = Slot::Valid(value);
    }

    /// Marks the slot invalid; returns true if a valid entry was dropped.
    fn invalidate(&mut self) -> bool {
        match self {
            Slot::Valid(_) => {
                *self = Slot::Invalid;
                true
            }
            _ => false,
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self, Slot::Valid(_))
    }
}

/// All cached analyses and lock state for one function.
#[derive(Debug, Default)]
struct FunctionAnalyses {
    dominators: Slot<DominatorTree>,
    loop_forest: Slot<LoopForest>,
    alias: Slot<AliasAnalysis>,
    rc_identity: Slot<RcIdentity>,
    loop_regions: Slot<LoopRegions>,
    /// Per-kind invalidation locks (bitmask over [`AnalysisKind::lock_bit`]).
    locked: u8,
}

impl FunctionAnalyses {
    fn is_locked(&self, kind: AnalysisKind) -> bool {
        self.locked & kind.lock_bit() != 0
    }

    fn set_locked(&mut self, kind: AnalysisKind, locked: bool) {
        if locked {
            self.locked |= kind.lock_bit();
        } else {
            self.locked &= !kind.lock_bit();
        }
    }

    fn invalidate(&mut self, kind: AnalysisKind) -> bool {
        match kind {
            AnalysisKind::Dominance => self.dominators.invalidate(),
            AnalysisKind::LoopForest => self.loop_forest.invalidate(),
            AnalysisKind::Alias => self.alias.invalidate(),
            AnalysisKind::RcIdentity => self.rc_identity.invalidate(),
            AnalysisKind::LoopRegions => self.loop_regions.invalidate(),
        }
    }

    fn is_valid(&self, kind: AnalysisKind) -> bool {
        match kind {
            AnalysisKind::Dominance => self.dominators.is_valid(),
            AnalysisKind::LoopForest => self.loop_forest.is_valid(),
            AnalysisKind::Alias => self.alias.is_valid(),
            AnalysisKind::RcIdentity => self.rc_identity.is_valid(),
            AnalysisKind::LoopRegions => self.loop_regions.is_valid(),
        }
    }
}

/// The shared analysis cache.
///
/// Recomputations and invalidations are recorded in the [`EventLog`] handed
/// in at construction, so a pass run's exact side-effect profile is
/// observable.
#[derive(Debug)]
pub struct AnalysisCache {
    functions: DashMap<FunctionId, FunctionAnalyses>,
    events: Arc<EventLog>,
}

impl AnalysisCache {
    /// Creates an empty cache recording into the given log.
    #[must_use]
    pub fn new(events: Arc<EventLog>) -> Self {
        AnalysisCache {
            functions: DashMap::new(),
            events,
        }
    }

    /// Returns the dominator tree, computing it if absent or invalid.
    #[must_use]
    pub fn dominators(&self, function: &Function) -> Arc<DominatorTree> {
        let id = function.id();
        if let Some(hit) = self.functions.get(&id).and_then(|a| a.dominators.get()) {
            return hit;
        }

        let computed = Arc::new(compute_dominators(function));
        self.record_computed(id, AnalysisKind::Dominance);
        self.functions
            .entry(id)
            .or_default()
            .dominators
            .store(Arc::clone(&computed));
        computed
    }

    /// Returns the loop forest, computing it (over the cached dominator
    /// tree) if absent or invalid.
    #[must_use]
    pub fn loop_forest(&self, function: &Function) -> Arc<LoopForest> {
        let id = function.id();
        if let Some(hit) = self.functions.get(&id).and_then(|a| a.loop_forest.get()) {
            return hit;
        }

        let dominators = self.dominators(function);
        let computed = Arc::new(detect_loops(function, &dominators));
        self.record_computed(id, AnalysisKind::LoopForest);
        self.functions
            .entry(id)
            .or_default()
            .loop_forest
            .store(Arc::clone(&computed));
        computed
    }

    /// Returns the alias analysis, computing it if absent or invalid.
    #[must_use]
    pub fn alias(&self, function: &Function) -> Arc<AliasAnalysis> {
        let id = function.id();
        if let Some(hit) = self.functions.get(&id).and_then(|a| a.alias.get()) {
            return hit;
        }

        let computed = Arc::new(AliasAnalysis::compute(function));
        self.record_computed(id, AnalysisKind::Alias);
        self.functions
            .entry(id)
            .or_default()
            .alias
            .store(Arc::clone(&computed));
        computed
    }

    /// Returns the reference-count identity analysis, computing it if absent
    /// or invalid.
    #[must_use]
    pub fn rc_identity(&self, function: &Function) -> Arc<RcIdentity> {
        let id = function.id();
        if let Some(hit) = self.functions.get(&id).and_then(|a| a.rc_identity.get()) {
            return hit;
        }

        let computed = Arc::new(RcIdentity::compute(function));
        self.record_computed(id, AnalysisKind::RcIdentity);
        self.functions
            .entry(id)
            .or_default()
            .rc_identity
            .store(Arc::clone(&computed));
        computed
    }

    /// Returns the loop-region decomposition, computing it (over the cached
    /// loop forest) if absent or invalid.
    #[must_use]
    pub fn loop_regions(&self, function: &Function) -> Arc<LoopRegions> {
        let id = function.id();
        if let Some(hit) = self.functions.get(&id).and_then(|a| a.loop_regions.get()) {
            return hit;
        }

        let forest = self.loop_forest(function);
        let computed = Arc::new(LoopRegions::compute(function, &forest));
        self.record_computed(id, AnalysisKind::LoopRegions);
        self.functions
            .entry(id)
            .or_default()
            .loop_regions
            .store(Arc::clone(&computed));
        computed
    }

    /// Stores a dominator tree maintained in place by a transformation,
    /// leaving the slot valid.
    pub fn store_dominators(&self, function: FunctionId, dominators: Arc<DominatorTree>) {
        self.functions
            .entry(function)
            .or_default()
            .dominators
            .store(dominators);
    }

    /// Stores a loop forest maintained in place by a transformation, leaving
    /// the slot valid.
    pub fn store_loop_forest(&self, function: FunctionId, forest: Arc<LoopForest>) {
        self.functions
            .entry(function)
            .or_default()
            .loop_forest
            .store(forest);
    }

    /// Drops every cached analysis of `function` whose sensitivity
    /// intersects `scope`, skipping locked kinds.
    pub fn invalidate(&self, function: FunctionId, scope: InvalidationScope) {
        self.events
            .record(EventKind::InvalidationRequested)
            .at(function)
            .message(scope.describe());

        let Some(mut entry) = self.functions.get_mut(&function) else {
            return;
        };
        for kind in AnalysisKind::iter() {
            if !kind.sensitivity().intersects(scope) || entry.is_locked(kind) {
                continue;
            }
            if entry.invalidate(kind) {
                self.events
                    .record(EventKind::AnalysisInvalidated)
                    .at(function)
                    .analysis(kind);
            }
        }
    }

    /// Exempts one analysis kind of one function from invalidation until the
    /// returned guard is dropped.
    ///
    /// Locks do not nest: acquiring a lock that is already held is a logic
    /// error (debug-asserted).
    #[must_use]
    pub fn lock_invalidation(
        &self,
        function: FunctionId,
        kind: AnalysisKind,
    ) -> InvalidationLockGuard<'_> {
        {
            let mut entry = self.functions.entry(function).or_default();
            debug_assert!(!entry.is_locked(kind), "invalidation locks do not nest");
            entry.set_locked(kind, true);
        }
        InvalidationLockGuard {
            cache: self,
            function,
            kind,
        }
    }

    /// Returns true if the given kind is currently exempt from invalidation.
    #[must_use]
    pub fn is_invalidation_locked(&self, function: FunctionId, kind: AnalysisKind) -> bool {
        self.functions
            .get(&function)
            .is_some_and(|entry| entry.is_locked(kind))
    }

    /// Returns true if a valid cached entry exists for `(kind, function)`.
    #[must_use]
    pub fn is_valid(&self, function: FunctionId, kind: AnalysisKind) -> bool {
        self.functions
            .get(&function)
            .is_some_and(|entry| entry.is_valid(kind))
    }

    fn record_computed(&self, function: FunctionId, kind: AnalysisKind) {
        self.events
            .record(EventKind::AnalysisComputed)
            .at(function)
            .analysis(kind);
    }
}

/// RAII guard for a per-kind invalidation lock; unlocks on drop.
#[derive(Debug)]
pub struct InvalidationLockGuard<'a> {
    cache: &'a AnalysisCache,
    function: FunctionId,
    kind: AnalysisKind,
}

impl Drop for InvalidationLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.cache.functions.get_mut(&self.function) {
            entry.set_locked(self.kind, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, BlockId, Op, ValueId};

    fn loop_function(id: u32) -> Function {
        // 0 -> 1(header) -> 2(latch) -> 1, 2 -> 3
        Function::new(
            FunctionId::new(id),
            "looped",
            vec![
                BasicBlock::new(vec![Op::Branch], vec![BlockId::new(1)]),
                BasicBlock::new(vec![Op::Branch], vec![BlockId::new(2)]),
                BasicBlock::new(
                    vec![
                        Op::Alloc {
                            result: ValueId::new(0),
                        },
                        Op::CondBranch {
                            condition: ValueId::new(1),
                        },
                    ],
                    vec![BlockId::new(1), BlockId::new(3)],
                ),
                BasicBlock::new(vec![Op::Return { value: None }], vec![]),
            ],
        )
        .unwrap()
    }

    fn cache_with_log() -> (AnalysisCache, Arc<EventLog>) {
        let events = Arc::new(EventLog::new());
        (AnalysisCache::new(Arc::clone(&events)), events)
    }

    #[test]
    fn test_get_computes_once() {
        let (cache, events) = cache_with_log();
        let f = loop_function(0);

        let first = cache.dominators(&f);
        let second = cache.dominators(&f);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(events.count(EventKind::AnalysisComputed), 1);
    }

    #[test]
    fn test_derived_analyses_reuse_cached_inputs() {
        let (cache, events) = cache_with_log();
        let f = loop_function(0);

        // Regions pull in the forest, which pulls in dominators: three
        // computations, none redundant.
        let _ = cache.loop_regions(&f);
        assert_eq!(events.count(EventKind::AnalysisComputed), 3);

        let _ = cache.loop_forest(&f);
        let _ = cache.dominators(&f);
        assert_eq!(events.count(EventKind::AnalysisComputed), 3);
    }

    #[test]
    fn test_invalidation_scope_selects_kinds() {
        let (cache, events) = cache_with_log();
        let f = loop_function(0);

        let _ = cache.loop_regions(&f);
        let _ = cache.alias(&f);
        let _ = cache.rc_identity(&f);

        cache.invalidate(f.id(), InvalidationScope::CALLS_AND_INSTRUCTIONS);

        // Branch-sensitive structures survive the narrow scope.
        assert!(cache.is_valid(f.id(), AnalysisKind::Dominance));
        assert!(cache.is_valid(f.id(), AnalysisKind::LoopForest));
        assert!(cache.is_valid(f.id(), AnalysisKind::LoopRegions));
        assert!(!cache.is_valid(f.id(), AnalysisKind::Alias));
        assert!(!cache.is_valid(f.id(), AnalysisKind::RcIdentity));
        assert_eq!(events.count(EventKind::AnalysisInvalidated), 2);
    }

    #[test]
    fn test_function_body_scope_drops_everything_unlocked() {
        let (cache, _) = cache_with_log();
        let f = loop_function(0);

        let _ = cache.loop_regions(&f);
        let _ = cache.alias(&f);

        cache.invalidate(f.id(), InvalidationScope::FUNCTION_BODY);

        for kind in AnalysisKind::iter() {
            assert!(!cache.is_valid(f.id(), kind), "{kind} should be invalid");
        }
    }

    #[test]
    fn test_locked_kind_survives_invalidation() {
        let (cache, _) = cache_with_log();
        let f = loop_function(0);

        let before = cache.loop_forest(&f);
        {
            let _dom = cache.lock_invalidation(f.id(), AnalysisKind::Dominance);
            let _forest = cache.lock_invalidation(f.id(), AnalysisKind::LoopForest);
            cache.invalidate(f.id(), InvalidationScope::FUNCTION_BODY);
        }

        assert!(cache.is_valid(f.id(), AnalysisKind::Dominance));
        assert!(cache.is_valid(f.id(), AnalysisKind::LoopForest));
        assert!(!cache.is_invalidation_locked(f.id(), AnalysisKind::Dominance));
        assert!(!cache.is_invalidation_locked(f.id(), AnalysisKind::LoopForest));

        // The surviving entry is the very same instance.
        let after = cache.loop_forest(&f);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_invalid_slot_recomputes_on_next_get() {
        let (cache, events) = cache_with_log();
        let f = loop_function(0);

        let before = cache.rc_identity(&f);
        cache.invalidate(f.id(), InvalidationScope::CALLS_AND_INSTRUCTIONS);
        let after = cache.rc_identity(&f);

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(events.count(EventKind::AnalysisComputed), 2);
    }

    #[test]
    fn test_store_back_keeps_slot_valid() {
        let (cache, _) = cache_with_log();
        let f = loop_function(0);

        let mut forest = cache.loop_forest(&f);
        let maintained = Arc::make_mut(&mut forest);
        maintained.record_merged_latch(BlockId::new(1), BlockId::new(4));
        cache.store_loop_forest(f.id(), Arc::clone(&forest));

        let fetched = cache.loop_forest(&f);
        assert!(Arc::ptr_eq(&forest, &fetched));
        assert_eq!(
            fetched.loop_for_header(BlockId::new(1)).unwrap().latches,
            vec![BlockId::new(4)]
        );
    }

    #[test]
    fn test_separate_functions_do_not_interfere() {
        let (cache, _) = cache_with_log();
        let f0 = loop_function(0);
        let f1 = loop_function(1);

        let _ = cache.alias(&f0);
        let _ = cache.alias(&f1);
        cache.invalidate(f0.id(), InvalidationScope::FUNCTION_BODY);

        assert!(!cache.is_valid(f0.id(), AnalysisKind::Alias));
        assert!(cache.is_valid(f1.id(), AnalysisKind::Alias));
    }
}
