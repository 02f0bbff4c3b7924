//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! A block `d` **dominates** a block `n` if every path from the entry block
//! to `n` passes through `d`. The **immediate dominator** of `n` is the
//! unique block that strictly dominates `n` but no other strict dominator of
//! `n`. The tree formed by immediate dominators is the dominator tree, rooted
//! at the entry block.
//!
//! # Maintenance
//!
//! Besides queries, [`DominatorTree`] supports the two in-place updates loop
//! canonicalization needs ([`insert_above`](DominatorTree::insert_above) and
//! [`append_node`](DominatorTree::append_node)), so a canonicalizing
//! transformation can keep the tree valid without a from-scratch recompute.
//!
//! # Complexity
//!
//! Computation runs in O(V α(V)) with path compression; `dominates` walks the
//! tree and is O(depth).

use crate::ir::{BlockId, Function};

/// Result of dominator tree computation over one function's CFG.
///
/// Each block except the entry has exactly one immediate dominator. Blocks
/// unreachable from the entry are treated as dominated by the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTree {
    /// The entry (root) block.
    entry: BlockId,
    /// Immediate dominator per block, indexed by block id. The entry maps to
    /// itself, which simplifies upward walks.
    idom: Vec<BlockId>,
}

impl DominatorTree {
    /// Returns the entry (root) block of the tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the immediate dominator of a block, or `None` for the entry.
    ///
    /// # Panics
    ///
    /// Panics if the block index is out of bounds.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            None
        } else {
            Some(self.idom[block.index()])
        }
    }

    /// Checks if block `a` dominates block `b`.
    ///
    /// A block dominates itself; the entry dominates every reachable block.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }

        let mut current = b;
        while current != self.entry {
            let idom = self.idom[current.index()];
            if idom == a {
                return true;
            }
            current = idom;
        }

        a == self.entry
    }

    /// Checks if block `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of a block in the dominator tree (entry = 0).
    #[must_use]
    pub fn depth(&self, block: BlockId) -> usize {
        let mut depth = 0;
        let mut current = block;
        while current != self.entry {
            current = self.idom[current.index()];
            depth += 1;
        }
        depth
    }

    /// Returns the nearest common dominator of two blocks.
    #[must_use]
    pub fn nearest_common_dominator(&self, a: BlockId, b: BlockId) -> BlockId {
        let mut a = a;
        let mut b = b;
        let mut depth_a = self.depth(a);
        let mut depth_b = self.depth(b);

        while depth_a > depth_b {
            a = self.idom[a.index()];
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = self.idom[b.index()];
            depth_b -= 1;
        }
        while a != b {
            a = self.idom[a.index()];
            b = self.idom[b.index()];
        }
        a
    }

    /// Returns the number of blocks covered by the tree.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }

    /// Inserts a freshly appended block directly above an existing block.
    ///
    /// After the update, `new_block` takes over `block`'s position in the
    /// tree: `idom(new_block)` is `block`'s former immediate dominator and
    /// `idom(block)` is `new_block`. If `block` was the entry, `new_block`
    /// becomes the new root.
    ///
    /// This is the dominance effect of redirecting every incoming forward
    /// edge of `block` through `new_block` (preheader insertion).
    ///
    /// # Panics
    ///
    /// Panics if `new_block` is not the next unused block index.
    pub fn insert_above(&mut self, new_block: BlockId, block: BlockId) {
        assert_eq!(new_block.index(), self.idom.len(), "blocks are appended in order");

        if block == self.entry {
            self.idom.push(new_block);
            self.entry = new_block;
        } else {
            self.idom.push(self.idom[block.index()]);
        }
        self.idom[block.index()] = new_block;
    }

    /// Appends a new leaf block with the given immediate dominator.
    ///
    /// This is the dominance effect of introducing a block all of whose
    /// predecessors are existing blocks dominated by `idom` (latch merging:
    /// the merged latch's idom is the nearest common dominator of the
    /// original latches).
    ///
    /// # Panics
    ///
    /// Panics if `new_block` is not the next unused block index.
    pub fn append_node(&mut self, new_block: BlockId, idom: BlockId) {
        assert_eq!(new_block.index(), self.idom.len(), "blocks are appended in order");
        self.idom.push(idom);
    }
}

/// Computes the dominator tree of a function using Lengauer-Tarjan.
///
/// Blocks unreachable from the entry keep the entry as their recorded idom,
/// which keeps upward walks terminating without special cases.
#[must_use]
pub fn compute_dominators(function: &Function) -> DominatorTree {
    let block_count = function.block_count();
    let entry = function.entry();

    if block_count == 0 {
        return DominatorTree {
            entry,
            idom: Vec::new(),
        };
    }

    let mut lt = LengauerTarjan::new(block_count, entry);
    lt.compute(function);

    // Unvisited (unreachable) blocks fall back to the entry.
    let sentinel = BlockId::new(usize::MAX);
    let idom = lt
        .idom
        .into_iter()
        .map(|d| if d == sentinel { entry } else { d })
        .collect();

    DominatorTree { entry, idom }
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    entry: BlockId,
    /// DFS number per block (0 = not visited).
    dfnum: Vec<usize>,
    /// Block with each DFS number (inverse of `dfnum`).
    vertex: Vec<BlockId>,
    /// Parent in the DFS tree.
    parent: Vec<BlockId>,
    /// Semidominator per block.
    semi: Vec<BlockId>,
    /// Immediate dominator (final result).
    idom: Vec<BlockId>,
    /// Ancestor in the link-eval forest.
    ancestor: Vec<BlockId>,
    /// Best block on the path to the ancestor (path compression).
    best: Vec<BlockId>,
    /// Blocks whose semidominator is this block.
    bucket: Vec<Vec<BlockId>>,
    /// Predecessor lists, collected once up front.
    preds: Vec<Vec<BlockId>>,
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: BlockId) -> Self {
        let sentinel = BlockId::new(usize::MAX);
        LengauerTarjan {
            entry,
            dfnum: vec![0; n],
            vertex: vec![sentinel; n],
            parent: vec![sentinel; n],
            semi: (0..n).map(BlockId::new).collect(),
            idom: vec![sentinel; n],
            ancestor: vec![sentinel; n],
            best: (0..n).map(BlockId::new).collect(),
            bucket: vec![Vec::new(); n],
            preds: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute(&mut self, function: &Function) {
        for block in function.block_ids() {
            for &succ in function.successors(block) {
                self.preds[succ.index()].push(block);
            }
        }

        // Phase 1: DFS numbering.
        self.dfs(function, self.entry);

        // Process blocks in reverse DFS order (excluding the entry).
        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            // Phase 2: semidominators.
            for v_index in 0..self.preds[w.index()].len() {
                let v = self.preds[w.index()][v_index];
                if self.dfnum[v.index()] == 0 {
                    // Unreachable from the entry.
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.link(parent_w, w);

            // Phase 3: implicit immediate dominators for parent(w)'s bucket.
            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = parent_w;
                } else {
                    self.idom[v.index()] = u;
                }
            }
        }

        // Phase 4: explicit immediate dominators.
        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    fn dfs(&mut self, function: &Function, start: BlockId) {
        let mut stack = vec![start];

        while let Some(block) = stack.pop() {
            let index = block.index();
            if self.dfnum[index] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[index] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = block;

            for &succ in function.successors(block) {
                if self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = block;
                    stack.push(succ);
                }
            }
        }
    }

    fn link(&mut self, w: BlockId, v: BlockId) {
        self.ancestor[v.index()] = w;
    }

    fn eval(&mut self, v: BlockId) -> BlockId {
        let sentinel = BlockId::new(usize::MAX);
        if self.ancestor[v.index()] == sentinel {
            return v;
        }

        self.compress(v);
        self.best[v.index()]
    }

    fn compress(&mut self, v: BlockId) {
        let sentinel = BlockId::new(usize::MAX);
        let ancestor_v = self.ancestor[v.index()];

        if self.ancestor[ancestor_v.index()] == sentinel {
            return;
        }

        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v.index()];
        let best_v = self.best[v.index()];

        if self.dfnum[self.semi[best_ancestor.index()].index()]
            < self.dfnum[self.semi[best_v.index()].index()]
        {
            self.best[v.index()] = best_ancestor;
        }

        self.ancestor[v.index()] = self.ancestor[ancestor_v.index()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_single_block() {
        let f = function_from_edges(1, &[]);
        let tree = compute_dominators(&f);

        assert_eq!(tree.entry(), BlockId::new(0));
        assert_eq!(tree.immediate_dominator(BlockId::new(0)), None);
        assert!(tree.dominates(BlockId::new(0), BlockId::new(0)));
        assert_eq!(tree.depth(BlockId::new(0)), 0);
    }

    #[test]
    fn test_linear_chain() {
        // 0 -> 1 -> 2 -> 3
        let f = function_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let tree = compute_dominators(&f);

        assert_eq!(tree.immediate_dominator(BlockId::new(1)), Some(BlockId::new(0)));
        assert_eq!(tree.immediate_dominator(BlockId::new(2)), Some(BlockId::new(1)));
        assert_eq!(tree.immediate_dominator(BlockId::new(3)), Some(BlockId::new(2)));
        assert!(tree.dominates(BlockId::new(1), BlockId::new(3)));
        assert!(!tree.dominates(BlockId::new(3), BlockId::new(1)));
        assert_eq!(tree.depth(BlockId::new(3)), 3);
    }

    #[test]
    fn test_diamond() {
        //      0
        //     / \
        //    1   2
        //     \ /
        //      3
        let f = function_from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let tree = compute_dominators(&f);

        assert_eq!(tree.immediate_dominator(BlockId::new(1)), Some(BlockId::new(0)));
        assert_eq!(tree.immediate_dominator(BlockId::new(2)), Some(BlockId::new(0)));
        assert_eq!(tree.immediate_dominator(BlockId::new(3)), Some(BlockId::new(0)));
        assert!(!tree.strictly_dominates(BlockId::new(1), BlockId::new(3)));
        assert!(!tree.strictly_dominates(BlockId::new(2), BlockId::new(3)));
    }

    #[test]
    fn test_loop_back_edge() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let f = function_from_edges(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let tree = compute_dominators(&f);

        assert!(tree.dominates(BlockId::new(1), BlockId::new(2)));
        assert!(!tree.strictly_dominates(BlockId::new(2), BlockId::new(1)));
        assert_eq!(tree.immediate_dominator(BlockId::new(3)), Some(BlockId::new(2)));
    }

    #[test]
    fn test_nearest_common_dominator() {
        let f = function_from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let tree = compute_dominators(&f);

        assert_eq!(
            tree.nearest_common_dominator(BlockId::new(1), BlockId::new(2)),
            BlockId::new(0)
        );
        assert_eq!(
            tree.nearest_common_dominator(BlockId::new(1), BlockId::new(1)),
            BlockId::new(1)
        );
        assert_eq!(
            tree.nearest_common_dominator(BlockId::new(3), BlockId::new(1)),
            BlockId::new(0)
        );
    }

    #[test]
    fn test_insert_above() {
        // 0 -> 1 -> 2; insert 3 above 1, as preheader insertion would.
        let f = function_from_edges(3, &[(0, 1), (1, 2)]);
        let mut tree = compute_dominators(&f);

        tree.insert_above(BlockId::new(3), BlockId::new(1));

        assert_eq!(tree.immediate_dominator(BlockId::new(3)), Some(BlockId::new(0)));
        assert_eq!(tree.immediate_dominator(BlockId::new(1)), Some(BlockId::new(3)));
        assert_eq!(tree.immediate_dominator(BlockId::new(2)), Some(BlockId::new(1)));
        assert!(tree.dominates(BlockId::new(3), BlockId::new(2)));
    }

    #[test]
    fn test_insert_above_entry() {
        let f = function_from_edges(2, &[(0, 1)]);
        let mut tree = compute_dominators(&f);

        tree.insert_above(BlockId::new(2), BlockId::new(0));

        assert_eq!(tree.entry(), BlockId::new(2));
        assert_eq!(tree.immediate_dominator(BlockId::new(2)), None);
        assert_eq!(tree.immediate_dominator(BlockId::new(0)), Some(BlockId::new(2)));
    }

    #[test]
    fn test_append_node() {
        let f = function_from_edges(3, &[(0, 1), (1, 2)]);
        let mut tree = compute_dominators(&f);

        tree.append_node(BlockId::new(3), BlockId::new(1));

        assert_eq!(tree.immediate_dominator(BlockId::new(3)), Some(BlockId::new(1)));
        assert!(tree.dominates(BlockId::new(0), BlockId::new(3)));
    }

    #[test]
    fn test_matches_recompute_on_complex_cfg() {
        //        0
        //        |
        //        1
        //       / \
        //      2   3
        //      |   |\
        //      4   5 6
        //       \ /
        //        7
        let f = function_from_edges(
            8,
            &[(0, 1), (1, 2), (1, 3), (2, 4), (3, 5), (3, 6), (4, 7), (5, 7)],
        );
        let tree = compute_dominators(&f);

        assert_eq!(tree.immediate_dominator(BlockId::new(7)), Some(BlockId::new(1)));
        assert_eq!(tree.immediate_dominator(BlockId::new(6)), Some(BlockId::new(3)));
        assert!(tree.dominates(BlockId::new(1), BlockId::new(7)));
    }
}
