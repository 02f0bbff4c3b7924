//! Loop-region decomposition.
//!
//! Regions give transformations a loop-aware view of the function: one
//! region per loop, nested the way the loops nest, plus a root region for
//! the function itself. Every block belongs to exactly one region — the one
//! for its innermost enclosing loop, or the function region when it is
//! outside every loop.
//!
//! The decomposition is derived from the loop forest and cached per
//! function; it is sensitive to branch-level changes only, so the narrow
//! "calls and instructions" invalidation leaves it intact.

use crate::{
    analysis::LoopForest,
    ir::{BlockId, Function},
};

/// Identity of a region within one function's decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(usize);

impl RegionId {
    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One region: the function itself or a single loop.
#[derive(Debug, Clone)]
pub struct Region {
    /// This region's id.
    pub id: RegionId,
    /// The loop header if this is a loop region; `None` for the function
    /// region.
    pub header: Option<BlockId>,
    /// Blocks whose innermost region is this region.
    pub blocks: Vec<BlockId>,
    /// Immediate subregions (nested loops).
    pub subregions: Vec<RegionId>,
    /// The enclosing region; `None` for the function region.
    pub parent: Option<RegionId>,
}

impl Region {
    /// Returns true if this is the function (root) region.
    #[must_use]
    pub fn is_function_region(&self) -> bool {
        self.header.is_none()
    }
}

/// The loop-region decomposition of one function.
#[derive(Debug, Clone)]
pub struct LoopRegions {
    regions: Vec<Region>,
    block_region: Vec<RegionId>,
}

impl LoopRegions {
    /// Computes the decomposition from the function and its loop forest.
    #[must_use]
    pub fn compute(function: &Function, forest: &LoopForest) -> Self {
        let mut regions = vec![Region {
            id: RegionId(0),
            header: None,
            blocks: Vec::new(),
            subregions: Vec::new(),
            parent: None,
        }];

        // One region per loop, in forest order.
        for loop_info in forest.iter() {
            let id = RegionId(regions.len());
            regions.push(Region {
                id,
                header: Some(loop_info.header),
                blocks: Vec::new(),
                subregions: Vec::new(),
                parent: None,
            });
        }

        // Wire nesting: a loop region's parent is its parent loop's region,
        // or the function region for outermost loops.
        let region_of_header = |regions: &[Region], header: BlockId| {
            regions
                .iter()
                .find(|r| r.header == Some(header))
                .map(|r| r.id)
        };
        for loop_info in forest.iter() {
            let id = region_of_header(&regions, loop_info.header).expect("region for loop");
            let parent = loop_info
                .parent
                .and_then(|h| region_of_header(&regions, h))
                .unwrap_or(RegionId(0));
            regions[id.index()].parent = Some(parent);
            regions[parent.index()].subregions.push(id);
        }

        // Assign every block to its innermost region.
        let mut block_region = vec![RegionId(0); function.block_count()];
        for block in function.block_ids() {
            let region = forest
                .innermost_loop(block)
                .and_then(|l| region_of_header(&regions, l.header))
                .unwrap_or(RegionId(0));
            block_region[block.index()] = region;
            regions[region.index()].blocks.push(block);
        }

        LoopRegions {
            regions,
            block_region,
        }
    }

    /// Returns the function (root) region.
    #[must_use]
    pub fn function_region(&self) -> &Region {
        &self.regions[0]
    }

    /// Returns the region with the given id, if it exists.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.index())
    }

    /// Returns the innermost region containing a block.
    ///
    /// # Panics
    ///
    /// Panics if the block index is outside the function the decomposition
    /// was computed for.
    #[must_use]
    pub fn region_of(&self, block: BlockId) -> &Region {
        let id = self.block_region[block.index()];
        &self.regions[id.index()]
    }

    /// Returns the number of regions (loops + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Always false: the function region exists even without loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates over all regions, function region first.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{compute_dominators, detect_loops};
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
    fn test_loopless_function_has_only_root_region() {
        let f = function_from_edges(3, &[(0, 1), (1, 2)]);
        let forest = detect_loops(&f, &compute_dominators(&f));
        let regions = LoopRegions::compute(&f, &forest);

        assert_eq!(regions.len(), 1);
        assert!(regions.function_region().is_function_region());
        assert_eq!(regions.function_region().blocks.len(), 3);
        assert!(regions.region_of(BlockId::new(2)).is_function_region());
    }

    #[test]
    fn test_nested_regions() {
        // Outer loop header 1, inner loop header 2.
        let f = function_from_edges(
            6,
            &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (4, 5)],
        );
        let forest = detect_loops(&f, &compute_dominators(&f));
        let regions = LoopRegions::compute(&f, &forest);

        assert_eq!(regions.len(), 3);

        let root = regions.function_region();
        assert_eq!(root.subregions.len(), 1);

        let outer = regions.region(root.subregions[0]).unwrap();
        assert_eq!(outer.header, Some(BlockId::new(1)));
        assert_eq!(outer.subregions.len(), 1);

        let inner = regions.region(outer.subregions[0]).unwrap();
        assert_eq!(inner.header, Some(BlockId::new(2)));
        assert_eq!(inner.parent, Some(outer.id));

        // Block 3 sits in the inner loop; block 4 only in the outer.
        assert_eq!(regions.region_of(BlockId::new(3)).id, inner.id);
        assert_eq!(regions.region_of(BlockId::new(4)).id, outer.id);
        assert_eq!(regions.region_of(BlockId::new(0)).id, root.id);
    }
}
