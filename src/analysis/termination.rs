//! Program termination info.
//!
//! Identifies the blocks from which execution can never continue to a normal
//! return: blocks ending in [`Op::Unreachable`] or containing a call marked
//! `no_return`. Retain/release pairing may ignore reference-count traffic on
//! paths leading only into such blocks.
//!
//! Unlike the cached analyses this is computed fresh at the start of every
//! pass run and discarded at its end — it is cheap, and keeping it out of
//! the cache removes one invalidation obligation.

use crate::ir::{BlockId, Function, Op};

/// Per-run map of program-terminating blocks.
#[derive(Debug, Clone)]
pub struct ProgramTerminationInfo {
    terminating: Vec<bool>,
}

impl ProgramTerminationInfo {
    /// Computes termination facts for the function.
    #[must_use]
    pub fn compute(function: &Function) -> Self {
        let terminating = function
            .block_ids()
            .map(|id| {
                let block = function.block(id).expect("block exists");
                block.ops().iter().any(|op| {
                    matches!(
                        op,
                        Op::Unreachable
                            | Op::Call {
                                no_return: true,
                                ..
                            }
                    )
                })
            })
            .collect();

        ProgramTerminationInfo { terminating }
    }

    /// Returns true if execution entering this block can never reach a
    /// normal return.
    #[must_use]
    pub fn is_program_terminating(&self, block: BlockId) -> bool {
        self.terminating.get(block.index()).copied().unwrap_or(false)
    }

    /// Counts the program-terminating blocks.
    #[must_use]
    pub fn terminating_count(&self) -> usize {
        self.terminating.iter().filter(|t| **t).count()
    }
}
