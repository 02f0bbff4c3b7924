//! Minimal mid-end function IR.
//!
//! This module provides the carrier the optimization passes operate on: a
//! [`Function`] made of [`BasicBlock`]s connected through successor lists,
//! with reference-counting operations ([`Op::Retain`] / [`Op::Release`])
//! represented explicitly.
//!
//! The IR is deliberately small. It models exactly what the analyses in
//! [`crate::analysis`] need to observe:
//!
//! - control flow (successor lists, terminators) for dominators and loops
//! - allocation and copy chains for alias and reference-identity facts
//! - non-returning calls and `Unreachable` terminators for termination info
//!
//! # Identity
//!
//! Functions, blocks, and values are referred to through small index types
//! ([`FunctionId`], [`BlockId`], [`ValueId`]). Analyses store these indices
//! rather than borrowing the function, so cached analysis results can outlive
//! the borrow that computed them.

use std::fmt;

use crate::{Error, Result};

/// Reserved naming prefix marking compiler-synthesized global initializers.
///
/// Functions carrying this prefix contain no loop-level reference-counting
/// opportunities and are excluded from optimization at construction time (see
/// [`Function::new`]).
pub const SYNTHESIZED_INITIALIZER_PREFIX: &str = "globalinit_";

/// Identity of a function within the enclosing compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    /// Creates a function id from a raw index.
    #[must_use]
    pub fn new(index: u32) -> Self {
        FunctionId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Identity of a basic block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block id from a raw index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Identity of an SSA-like value within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    /// Creates a value id from a raw index.
    #[must_use]
    pub fn new(index: u32) -> Self {
        ValueId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A single IR operation.
///
/// Body operations produce or consume values; terminators end a block. The
/// successor targets of a terminator live on the enclosing [`BasicBlock`]'s
/// successor list, so control-flow rewrites only touch that list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Allocates a fresh reference-counted object.
    Alloc {
        /// The value holding the allocation.
        result: ValueId,
    },
    /// Forwards a value unchanged (covers casts and moves that preserve
    /// reference-count identity).
    Copy {
        /// The forwarded value.
        result: ValueId,
        /// The value being forwarded.
        source: ValueId,
    },
    /// Increments the reference count of `value`.
    Retain {
        /// The reference-counted value.
        value: ValueId,
    },
    /// Decrements the reference count of `value`.
    Release {
        /// The reference-counted value.
        value: ValueId,
    },
    /// Calls an opaque function.
    Call {
        /// The returned value, if the callee produces one.
        result: Option<ValueId>,
        /// True if the callee never returns (e.g. aborts the program).
        no_return: bool,
    },
    /// Unconditional branch to the block's single successor.
    Branch,
    /// Conditional branch; the block's first successor is the true target,
    /// the second the false target.
    CondBranch {
        /// The branch condition.
        condition: ValueId,
    },
    /// Returns from the function.
    Return {
        /// The returned value, if any.
        value: Option<ValueId>,
    },
    /// Marks an unreachable program point.
    Unreachable,
}

impl Op {
    /// Returns true if this operation terminates a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Branch | Op::CondBranch { .. } | Op::Return { .. } | Op::Unreachable
        )
    }

    /// Returns the value this operation defines, if any.
    #[must_use]
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Op::Alloc { result } | Op::Copy { result, .. } => Some(*result),
            Op::Call { result, .. } => *result,
            _ => None,
        }
    }
}

/// A basic block: a straight-line run of operations ending in a terminator,
/// plus the successor blocks control flow continues to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    ops: Vec<Op>,
    successors: Vec<BlockId>,
}

impl BasicBlock {
    /// Creates a basic block from its operations and successor list.
    #[must_use]
    pub fn new(ops: Vec<Op>, successors: Vec<BlockId>) -> Self {
        BasicBlock { ops, successors }
    }

    /// Returns the operations of this block.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Returns mutable access to the operations of this block.
    ///
    /// Transformations use this to rewrite instruction-level content; any
    /// such rewrite must be followed by the matching invalidation through
    /// the analysis cache.
    pub fn ops_mut(&mut self) -> &mut Vec<Op> {
        &mut self.ops
    }

    /// Returns the terminator operation, if the block has one.
    #[must_use]
    pub fn terminator(&self) -> Option<&Op> {
        self.ops.last().filter(|op| op.is_terminator())
    }

    /// Returns the successor blocks.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Redirects every successor edge targeting `from` to target `to`
    /// instead.
    ///
    /// Returns the number of edges rewritten.
    pub fn redirect_successor(&mut self, from: BlockId, to: BlockId) -> usize {
        let mut rewritten = 0;
        for succ in &mut self.successors {
            if *succ == from {
                *succ = to;
                rewritten += 1;
            }
        }
        rewritten
    }
}

/// The unit of compilation the optimization pass processes.
///
/// A function owns its basic blocks and knows its entry block. The
/// `synthesized_initializer` attribute is computed once at construction (see
/// [`Function::new`]) so gating never re-examines the name string.
#[derive(Debug, Clone)]
pub struct Function {
    id: FunctionId,
    name: String,
    synthesized_initializer: bool,
    entry: BlockId,
    blocks: Vec<BasicBlock>,
}

impl Function {
    /// Creates a function from its blocks, validating control flow.
    ///
    /// Block 0 is the entry block. The `synthesized_initializer` attribute is
    /// derived from [`SYNTHESIZED_INITIALIZER_PREFIX`] here, once; frontends
    /// with richer metadata can override it via
    /// [`with_synthesized_initializer`](Self::with_synthesized_initializer).
    ///
    /// # Arguments
    ///
    /// * `id` - Identity of the function within the compilation unit.
    /// * `name` - The function's symbol name.
    /// * `blocks` - The basic blocks; block 0 is the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if `blocks` is empty, or [`Error::Graph`] if
    /// any block names a successor index outside the block list.
    pub fn new(id: FunctionId, name: impl Into<String>, blocks: Vec<BasicBlock>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(Error::Empty);
        }

        let block_count = blocks.len();
        for (index, block) in blocks.iter().enumerate() {
            for succ in block.successors() {
                if succ.index() >= block_count {
                    return Err(Error::Graph(format!(
                        "block {index} names successor {} but the function has {block_count} blocks",
                        succ.index()
                    )));
                }
            }
        }

        let name = name.into();
        let synthesized_initializer = name.starts_with(SYNTHESIZED_INITIALIZER_PREFIX);
        Ok(Function {
            id,
            name,
            synthesized_initializer,
            entry: BlockId::new(0),
            blocks,
        })
    }

    /// Overrides the `synthesized_initializer` attribute.
    ///
    /// Intended for frontends that know initializer status from metadata
    /// rather than from the naming convention.
    #[must_use]
    pub fn with_synthesized_initializer(mut self, value: bool) -> Self {
        self.synthesized_initializer = value;
        self
    }

    /// Returns the function's identity.
    #[must_use]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Returns the function's symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this function is a compiler-synthesized global
    /// initializer and must be skipped by loop-level reference-count
    /// optimization.
    #[must_use]
    pub fn is_synthesized_initializer(&self) -> bool {
        self.synthesized_initializer
    }

    /// Returns the entry block id.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Updates the entry block.
    ///
    /// Only control-flow-maintaining transformations (e.g. preheader
    /// insertion in front of an entry-block loop header) may move the entry.
    pub fn set_entry(&mut self, entry: BlockId) {
        debug_assert!(entry.index() < self.blocks.len());
        self.entry = entry;
    }

    /// Returns the number of basic blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block with the given id, if it exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns mutable access to the block with the given id, if it exists.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Appends a new block and returns its id.
    ///
    /// Successor targets of the new block must already exist.
    pub fn push_block(&mut self, block: BasicBlock) -> BlockId {
        debug_assert!(block
            .successors()
            .iter()
            .all(|s| s.index() <= self.blocks.len()));
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(block);
        id
    }

    /// Iterates over all block ids in index order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::new)
    }

    /// Returns the successors of a block, or an empty slice for an unknown
    /// id.
    #[must_use]
    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.block(id).map_or(&[], BasicBlock::successors)
    }

    /// Collects the predecessors of a block.
    ///
    /// O(V + E); analyses that need repeated predecessor queries should
    /// collect them once.
    #[must_use]
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        let mut preds = Vec::new();
        for pred in self.block_ids() {
            if self.successors(pred).contains(&id) {
                preds.push(pred);
            }
        }
        preds
    }

    /// Iterates over every operation in the function, with its block id.
    pub fn ops(&self) -> impl Iterator<Item = (BlockId, &Op)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(index, block)| block.ops().iter().map(move |op| (BlockId::new(index), op)))
    }
}
