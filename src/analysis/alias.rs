//! Allocation-site alias analysis.
//!
//! Values are partitioned into alias classes: a value rooted (through copy
//! chains) at a distinct allocation gets that allocation as its class;
//! everything else is `Unknown`. Two values may alias unless both are rooted
//! at allocations and the allocation sites differ — the only disjointness
//! this analysis can prove.
//!
//! The result is cached per function and dropped by every invalidation scope
//! that covers instruction- or call-level content.

use std::collections::HashMap;

use crate::ir::{Function, Op, ValueId};

/// The alias class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasClass {
    /// The value is rooted at the allocation producing `root`.
    Allocation(ValueId),
    /// Nothing is known about the value's provenance.
    Unknown,
}

/// Whole-function alias facts.
#[derive(Debug, Clone)]
pub struct AliasAnalysis {
    classes: HashMap<ValueId, AliasClass>,
}

impl AliasAnalysis {
    /// Computes alias classes for every value defined in the function.
    #[must_use]
    pub fn compute(function: &Function) -> Self {
        let mut copies: HashMap<ValueId, ValueId> = HashMap::new();
        let mut allocations: Vec<ValueId> = Vec::new();

        for (_, op) in function.ops() {
            match op {
                Op::Alloc { result } => allocations.push(*result),
                Op::Copy { result, source } => {
                    copies.insert(*result, *source);
                }
                _ => {}
            }
        }

        let mut classes = HashMap::new();
        for root in &allocations {
            classes.insert(*root, AliasClass::Allocation(*root));
        }
        for &value in copies.keys() {
            let root = resolve_chain(&copies, value);
            let class = if allocations.contains(&root) {
                AliasClass::Allocation(root)
            } else {
                AliasClass::Unknown
            };
            classes.insert(value, class);
        }

        AliasAnalysis { classes }
    }

    /// Returns the alias class of a value.
    #[must_use]
    pub fn class_of(&self, value: ValueId) -> AliasClass {
        self.classes
            .get(&value)
            .copied()
            .unwrap_or(AliasClass::Unknown)
    }

    /// Returns true unless the two values are provably disjoint.
    #[must_use]
    pub fn may_alias(&self, a: ValueId, b: ValueId) -> bool {
        match (self.class_of(a), self.class_of(b)) {
            (AliasClass::Allocation(ra), AliasClass::Allocation(rb)) => ra == rb,
            _ => true,
        }
    }
}

/// Follows a copy chain to its ultimate source, stopping on cycles.
fn resolve_chain(copies: &HashMap<ValueId, ValueId>, start: ValueId) -> ValueId {
    let mut current = start;
    let mut steps = 0;
    while let Some(&source) = copies.get(&current) {
        current = source;
        steps += 1;
        if steps > copies.len() {
            // Cycle; keep the last value reached.
            break;
        }
    }
    current
}
