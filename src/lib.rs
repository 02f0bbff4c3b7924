#![doc(html_no_source)]
#![deny(missing_docs)]

//! # rcopt
//!
//! Analysis caching and pass orchestration for loop-level reference-count
//! optimization in a compiler mid-end.
//!
//! The crate sits between a pass pipeline and the transformations that
//! eliminate or hoist retain/release operations across loop iterations. The
//! pairing algorithm itself stays behind a trait; what lives here is the
//! machinery that makes running it correct and cheap:
//!
//! - **Analysis cache** — lazily computed, validity-tagged whole-function
//!   analyses (dominators, loop forest, aliasing, reference identity, loop
//!   regions), invalidated by scoped signals instead of wholesale.
//! - **Loop canonicalization** — [`pass::LoopSimplify`] establishes
//!   "preheader + single latch" form and maintains the dominator tree and
//!   loop forest in place while it rewrites.
//! - **Pass driver** — [`pass::RcLoopOptsPass`] gates, canonicalizes,
//!   shields the in-place-maintained structures from its own broad
//!   invalidation, runs the registered visitors, and issues the narrow
//!   invalidation their rewrites call for.
//! - **Event log** — every recomputation, invalidation, skip, and
//!   canonicalization step is recorded in [`events::EventLog`], so a run's
//!   exact side-effect profile is observable and testable.
//!
//! ## Example
//!
//! ```rust
//! use rcopt::ir::{BasicBlock, BlockId, Function, FunctionId, Op, ValueId};
//! use rcopt::pass::{FunctionPass, OptContext, RcLoopOptsPass};
//!
//! // 0 -> 1(header) -> 2(latch) -> 1, 2 -> 3
//! let mut function = Function::new(
//!     FunctionId::new(0),
//!     "process_items",
//!     vec![
//!         BasicBlock::new(vec![Op::Branch], vec![BlockId::new(1)]),
//!         BasicBlock::new(vec![Op::Branch], vec![BlockId::new(2)]),
//!         BasicBlock::new(
//!             vec![Op::CondBranch { condition: ValueId::new(0) }],
//!             vec![BlockId::new(1), BlockId::new(3)],
//!         ),
//!         BasicBlock::new(vec![Op::Return { value: None }], vec![]),
//!     ],
//! )?;
//!
//! let ctx = OptContext::default();
//! RcLoopOptsPass::new().run(&ctx, &mut function);
//! # Ok::<(), rcopt::Error>(())
//! ```

pub mod analysis;
mod error;
pub mod events;
pub mod ir;
pub mod pass;

pub use error::{Error, Result};
