//! Whole-function analyses and the shared analysis cache.
//!
//! Five analyses are cached per function by the [`AnalysisCache`]:
//! dominators, the natural loop forest, allocation-site aliasing,
//! reference-count identity, and the loop-region decomposition. The cache is
//! the only source passes read them from; see [`cache`] for the invalidation
//! and locking protocol. [`ProgramTerminationInfo`] stands apart: it is
//! recomputed fresh each pass run and never cached.

mod alias;
mod cache;
mod dominators;
mod loops;
mod rc_identity;
mod regions;
mod termination;

pub use alias::{AliasAnalysis, AliasClass};
pub use cache::{AnalysisCache, AnalysisKind, InvalidationLockGuard, InvalidationScope};
pub use dominators::{compute_dominators, DominatorTree};
pub use loops::{detect_loops, LoopExit, LoopForest, LoopInfo};
pub use rc_identity::RcIdentity;
pub use regions::{LoopRegions, Region, RegionId};
pub use termination::ProgramTerminationInfo;
