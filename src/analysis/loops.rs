//! Natural loop detection and the loop forest.
//!
//! A natural loop is identified by a back edge `latch -> header` where the
//! header dominates the latch. The loop body is every block that can reach
//! the latch without passing through the header, plus the header itself.
//! Loops sharing a header are merged into one loop with multiple latches.
//!
//! # Canonical form
//!
//! A canonical loop has:
//! - a single **preheader**: a dedicated non-loop predecessor of the header
//! - a single **latch**: one back edge into the header
//!
//! [`LoopSimplify`](crate::pass::LoopSimplify) establishes this form and
//! maintains the forest in place through the `record_*` methods here, so the
//! forest stays valid across canonicalization without recomputation.

use std::collections::HashSet;

use crate::{
    analysis::DominatorTree,
    ir::{BlockId, Function},
};

/// An exit edge from a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// The block inside the loop that branches out.
    pub exiting_block: BlockId,
    /// The block outside the loop that is the exit target.
    pub exit_block: BlockId,
}

/// One natural loop: header, body, and structural annotations.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop blocks).
    pub header: BlockId,
    /// All blocks in the loop body, including the header.
    pub body: HashSet<BlockId>,
    /// Back edge sources (blocks jumping to the header from inside the loop).
    pub latches: Vec<BlockId>,
    /// The dedicated non-loop predecessor of the header, if one exists.
    pub preheader: Option<BlockId>,
    /// Exit edges leaving the loop.
    pub exits: Vec<LoopExit>,
    /// Nesting depth (0 = outermost).
    pub depth: usize,
    /// Header of the parent loop, if nested.
    pub parent: Option<BlockId>,
    /// Headers of immediate child loops.
    pub children: Vec<BlockId>,
}

impl LoopInfo {
    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the loop has exactly one latch.
    #[must_use]
    pub fn has_single_latch(&self) -> bool {
        self.latches.len() == 1
    }

    /// Returns true if the loop has a preheader.
    #[must_use]
    pub fn has_preheader(&self) -> bool {
        self.preheader.is_some()
    }

    /// Returns true if the loop is in canonical form (preheader + single
    /// latch).
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.has_preheader() && self.has_single_latch()
    }

    /// Returns true if this loop has no child loops.
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterates over the exit blocks (targets outside the loop).
    pub fn exit_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.exits.iter().map(|e| e.exit_block)
    }
}

/// The loop forest of one function: every natural loop plus an
/// innermost-loop index per block.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    /// All loops; nesting is expressed through `parent`/`children` headers.
    loops: Vec<LoopInfo>,
    /// Map from block index to the innermost loop containing it.
    block_to_loop: Vec<Option<usize>>,
}

impl LoopForest {
    /// Creates an empty forest covering `block_count` blocks.
    #[must_use]
    pub fn new(block_count: usize) -> Self {
        LoopForest {
            loops: Vec::new(),
            block_to_loop: vec![None; block_count],
        }
    }

    /// Returns all loops.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns true if the function has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the innermost loop containing the given block.
    #[must_use]
    pub fn innermost_loop(&self, block: BlockId) -> Option<&LoopInfo> {
        self.block_to_loop
            .get(block.index())
            .copied()
            .flatten()
            .map(|index| &self.loops[index])
    }

    /// Returns the loop whose header is the given block.
    #[must_use]
    pub fn loop_for_header(&self, header: BlockId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Returns the nesting depth of a block (0 if outside every loop).
    #[must_use]
    pub fn loop_depth(&self, block: BlockId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Returns true if the block lies inside any loop.
    #[must_use]
    pub fn is_in_loop(&self, block: BlockId) -> bool {
        self.innermost_loop(block).is_some()
    }

    /// Iterates over all loops.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter()
    }

    /// Returns loops ordered outermost-first.
    #[must_use]
    pub fn by_depth_ascending(&self) -> Vec<&LoopInfo> {
        let mut sorted: Vec<_> = self.loops.iter().collect();
        sorted.sort_by_key(|l| l.depth);
        sorted
    }

    /// Returns loops ordered innermost-first.
    #[must_use]
    pub fn by_depth_descending(&self) -> Vec<&LoopInfo> {
        let mut sorted: Vec<_> = self.loops.iter().collect();
        sorted.sort_by_key(|l| std::cmp::Reverse(l.depth));
        sorted
    }

    /// Records a freshly inserted preheader for the loop at `header`.
    ///
    /// The preheader lies outside the loop; it joins the bodies of all
    /// enclosing ancestor loops and maps to the parent loop (if any) as its
    /// innermost loop.
    ///
    /// # Panics
    ///
    /// Panics if no loop with the given header exists.
    pub fn record_preheader(&mut self, header: BlockId, preheader: BlockId) {
        self.grow_block_map(preheader);

        let index = self
            .loops
            .iter()
            .position(|l| l.header == header)
            .expect("loop for header");
        self.loops[index].preheader = Some(preheader);

        if let Some(parent_header) = self.loops[index].parent {
            let parent_index = self
                .loops
                .iter()
                .position(|l| l.header == parent_header)
                .expect("parent loop");
            self.add_block_to_loop_and_ancestors(parent_index, preheader);
            self.block_to_loop[preheader.index()] = Some(parent_index);
        }
    }

    /// Records that the latches of the loop at `header` were merged into the
    /// single block `latch`.
    ///
    /// The merged latch becomes part of the loop body (and of every enclosing
    /// loop) and replaces the previous latch list.
    ///
    /// # Panics
    ///
    /// Panics if no loop with the given header exists.
    pub fn record_merged_latch(&mut self, header: BlockId, latch: BlockId) {
        self.grow_block_map(latch);

        let index = self
            .loops
            .iter()
            .position(|l| l.header == header)
            .expect("loop for header");
        self.loops[index].latches = vec![latch];
        self.add_block_to_loop_and_ancestors(index, latch);
        self.block_to_loop[latch.index()] = Some(index);
    }

    fn grow_block_map(&mut self, block: BlockId) {
        if block.index() >= self.block_to_loop.len() {
            self.block_to_loop.resize(block.index() + 1, None);
        }
    }

    fn add_block_to_loop_and_ancestors(&mut self, index: usize, block: BlockId) {
        let mut current = Some(index);
        while let Some(i) = current {
            self.loops[i].body.insert(block);
            current = self.loops[i]
                .parent
                .and_then(|h| self.loops.iter().position(|l| l.header == h));
        }
    }
}

/// Detects all natural loops of a function via dominance-based back edges.
///
/// # Algorithm
///
/// 1. Find back edges `n -> h` where `h` dominates `n`.
/// 2. For each back edge, grow the natural loop body backwards from the
///    latch; merge loops sharing a header.
/// 3. Establish nesting (a loop is nested in every loop whose body contains
///    its header), depths, preheaders, and exits.
#[must_use]
pub fn detect_loops(function: &Function, dominators: &DominatorTree) -> LoopForest {
    let block_count = function.block_count();
    let mut forest = LoopForest::new(block_count);

    // Predecessors, collected once.
    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); block_count];
    for block in function.block_ids() {
        for &succ in function.successors(block) {
            preds[succ.index()].push(block);
        }
    }

    // Back edges, merged by header.
    let mut loops: Vec<LoopInfo> = Vec::new();
    for latch in function.block_ids() {
        for &header in function.successors(latch) {
            if !dominators.dominates(header, latch) {
                continue;
            }

            let position = loops.iter().position(|l| l.header == header);
            let index = match position {
                Some(index) => index,
                None => {
                    loops.push(LoopInfo {
                        header,
                        body: HashSet::from([header]),
                        latches: Vec::new(),
                        preheader: None,
                        exits: Vec::new(),
                        depth: 0,
                        parent: None,
                        children: Vec::new(),
                    });
                    loops.len() - 1
                }
            };

            loops[index].latches.push(latch);

            // Natural loop body: walk predecessors backwards from the latch
            // until the header.
            let mut worklist = vec![latch];
            while let Some(block) = worklist.pop() {
                if !loops[index].body.insert(block) {
                    continue;
                }
                for &pred in &preds[block.index()] {
                    if !loops[index].body.contains(&pred) {
                        worklist.push(pred);
                    }
                }
            }
        }
    }

    // Nesting: the parent of a loop is the smallest other loop containing its
    // header.
    for i in 0..loops.len() {
        let mut parent: Option<usize> = None;
        for j in 0..loops.len() {
            if i == j || !loops[j].body.contains(&loops[i].header) {
                continue;
            }
            if parent.is_none_or(|p| loops[j].size() < loops[p].size()) {
                parent = Some(j);
            }
        }
        if let Some(p) = parent {
            loops[i].parent = Some(loops[p].header);
        }
    }

    // Depths from parent chains, children lists from parents.
    for i in 0..loops.len() {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(header) = current {
            depth += 1;
            current = loops
                .iter()
                .find(|l| l.header == header)
                .and_then(|l| l.parent);
        }
        loops[i].depth = depth;
    }
    for i in 0..loops.len() {
        if let Some(parent_header) = loops[i].parent {
            let child_header = loops[i].header;
            if let Some(parent) = loops.iter_mut().find(|l| l.header == parent_header) {
                parent.children.push(child_header);
            }
        }
    }

    // Preheaders and exits.
    for loop_info in &mut loops {
        let outside_preds: Vec<BlockId> = preds[loop_info.header.index()]
            .iter()
            .copied()
            .filter(|p| !loop_info.body.contains(p))
            .collect();
        if let [single] = outside_preds[..] {
            // Dedicated: the candidate must fall through only into the
            // header.
            if function.successors(single) == [loop_info.header] {
                loop_info.preheader = Some(single);
            }
        }

        let mut body: Vec<BlockId> = loop_info.body.iter().copied().collect();
        body.sort_unstable();
        for block in body {
            for &succ in function.successors(block) {
                if !loop_info.body.contains(&succ) {
                    loop_info.exits.push(LoopExit {
                        exiting_block: block,
                        exit_block: succ,
                    });
                }
            }
        }
    }

    for loop_info in loops {
        forest.add_loop(loop_info);
    }
    forest
}

impl LoopForest {
    /// Adds a loop to the forest, updating the innermost-loop mapping.
    pub fn add_loop(&mut self, loop_info: LoopInfo) {
        let index = self.loops.len();
        for &block in &loop_info.body {
            self.grow_block_map(block);
            match self.block_to_loop[block.index()] {
                Some(existing) if self.loops[existing].depth >= loop_info.depth => {}
                _ => self.block_to_loop[block.index()] = Some(index),
            }
        }
        self.loops.push(loop_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::compute_dominators;
    use crate::ir::{BasicBlock, FunctionId, Op, ValueId};

    fn function_from_edges(block_count: usize, edges: &[(usize, usize)]) -> Function {
        let mut successors: Vec<Vec<BlockId>> = vec![Vec::new(); block_count];
        for &(from, to) in edges {
            successors[from].push(BlockId::new(to));
        }

        let blocks = successors
            .into_iter()
            .map(|succs| {
                let terminator = match succs.len() {
                    0 => Op::Return { value: None },
                    1 => Op::Branch,
                    _ => Op::CondBranch {
                        condition: ValueId::new(0),
                    },
                };
                BasicBlock::new(vec![terminator], succs)
            })
            .collect();

        Function::new(FunctionId::new(0), "test", blocks).unwrap()
    }

    fn forest_of(function: &Function) -> LoopForest {
        let dominators = compute_dominators(function);
        detect_loops(function, &dominators)
    }

    #[test]
    fn test_no_loops() {
        let f = function_from_edges(3, &[(0, 1), (1, 2)]);
        let forest = forest_of(&f);

        assert!(forest.is_empty());
        assert_eq!(forest.loop_depth(BlockId::new(1)), 0);
    }

    #[test]
    fn test_single_loop() {
        // 0 -> 1(header) -> 2(latch) -> 1, 2 -> 3
        let f = function_from_edges(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let forest = forest_of(&f);

        assert_eq!(forest.len(), 1);
        let l = &forest.loops()[0];
        assert_eq!(l.header, BlockId::new(1));
        assert_eq!(l.latches, vec![BlockId::new(2)]);
        assert!(l.contains(BlockId::new(1)));
        assert!(l.contains(BlockId::new(2)));
        assert!(!l.contains(BlockId::new(3)));
        assert_eq!(l.preheader, Some(BlockId::new(0)));
        assert!(l.is_canonical());
        assert_eq!(l.exits, vec![LoopExit {
            exiting_block: BlockId::new(2),
            exit_block: BlockId::new(3),
        }]);
    }

    #[test]
    fn test_no_preheader_with_two_outside_preds() {
        // Two entries into the header: 0 -> 2 and 1 -> 2; 2 -> 3 -> 2.
        let f = function_from_edges(5, &[(0, 2), (0, 1), (1, 2), (2, 3), (3, 2), (3, 4)]);
        let forest = forest_of(&f);

        let l = forest.loop_for_header(BlockId::new(2)).unwrap();
        assert!(l.preheader.is_none());
        assert!(!l.is_canonical());
    }

    #[test]
    fn test_multiple_latches_merged_by_header() {
        // Header 1 with latches 2 and 3.
        let f = function_from_edges(5, &[(0, 1), (1, 2), (1, 3), (2, 1), (3, 1), (1, 4)]);
        let forest = forest_of(&f);

        assert_eq!(forest.len(), 1);
        let l = &forest.loops()[0];
        let mut latches = l.latches.clone();
        latches.sort_unstable();
        assert_eq!(latches, vec![BlockId::new(2), BlockId::new(3)]);
        assert!(!l.has_single_latch());
    }

    #[test]
    fn test_nested_loops() {
        // 0 -> 1(outer header) -> 2(inner header) -> 3 -> 2, 3 -> 4 -> 1,
        // 4 -> 5
        let f = function_from_edges(
            6,
            &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (4, 5)],
        );
        let forest = forest_of(&f);

        assert_eq!(forest.len(), 2);
        let outer = forest.loop_for_header(BlockId::new(1)).unwrap();
        let inner = forest.loop_for_header(BlockId::new(2)).unwrap();

        assert_eq!(outer.depth, 0);
        assert_eq!(inner.depth, 1);
        assert_eq!(inner.parent, Some(BlockId::new(1)));
        assert_eq!(outer.children, vec![BlockId::new(2)]);
        assert!(outer.contains(BlockId::new(2)));
        assert!(inner.is_innermost());

        // Innermost mapping prefers the deeper loop.
        assert_eq!(
            forest.innermost_loop(BlockId::new(3)).unwrap().header,
            BlockId::new(2)
        );
        assert_eq!(forest.loop_depth(BlockId::new(3)), 2);
        assert_eq!(forest.loop_depth(BlockId::new(4)), 1);
        assert_eq!(forest.loop_depth(BlockId::new(0)), 0);
    }

    #[test]
    fn test_depth_orders() {
        let f = function_from_edges(
            6,
            &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (4, 5)],
        );
        let forest = forest_of(&f);

        let ascending = forest.by_depth_ascending();
        assert_eq!(ascending[0].depth, 0);
        assert_eq!(ascending[1].depth, 1);

        let descending = forest.by_depth_descending();
        assert_eq!(descending[0].depth, 1);
    }

    #[test]
    fn test_record_preheader_for_nested_loop() {
        let f = function_from_edges(
            6,
            &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (4, 5)],
        );
        let mut forest = forest_of(&f);

        // Pretend canonicalization appended block 6 as the inner preheader.
        forest.record_preheader(BlockId::new(2), BlockId::new(6));

        let inner = forest.loop_for_header(BlockId::new(2)).unwrap();
        assert_eq!(inner.preheader, Some(BlockId::new(6)));
        assert!(!inner.contains(BlockId::new(6)));

        let outer = forest.loop_for_header(BlockId::new(1)).unwrap();
        assert!(outer.contains(BlockId::new(6)));
        assert_eq!(
            forest.innermost_loop(BlockId::new(6)).unwrap().header,
            BlockId::new(1)
        );
    }

    #[test]
    fn test_record_merged_latch() {
        let f = function_from_edges(5, &[(0, 1), (1, 2), (1, 3), (2, 1), (3, 1), (1, 4)]);
        let mut forest = forest_of(&f);

        forest.record_merged_latch(BlockId::new(1), BlockId::new(5));

        let l = forest.loop_for_header(BlockId::new(1)).unwrap();
        assert_eq!(l.latches, vec![BlockId::new(5)]);
        assert!(l.contains(BlockId::new(5)));
        assert_eq!(
            forest.innermost_loop(BlockId::new(5)).unwrap().header,
            BlockId::new(1)
        );
    }
}
