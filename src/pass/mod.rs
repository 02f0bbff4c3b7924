//! Pass orchestration: gating, canonicalization, visitor composition, and
//! cache invalidation.
//!
//! [`RcLoopOptsPass`] is the centerpiece; [`PassPipeline`] schedules it (and
//! any other [`FunctionPass`]) across the functions of a compilation unit.

mod canonicalize;
mod context;
mod driver;
mod pipeline;
mod visitor;

pub use canonicalize::{CanonicalizeLoops, LoopSimplify};
pub use context::{OptContext, PassOptions};
pub use driver::RcLoopOptsPass;
pub use pipeline::{FunctionPass, PassPipeline};
pub use visitor::{LoopVisitor, LoopVisitorGroup, TransformFactory, TransformInputs};
