//! Reference-count identity analysis.
//!
//! Retain/release pairing needs to know when two values refer to the same
//! reference-counted object. Forwarding operations ([`Op::Copy`]) preserve
//! that identity, so the root of a value is found by resolving its copy chain
//! to the ultimate source. Values with no forwarding definition are their own
//! root.
//!
//! The result is cached per function and dropped by every invalidation scope
//! that covers instruction- or call-level content.

use std::collections::HashMap;

use crate::ir::{Function, Op, ValueId};

/// Whole-function map from values to their reference-count roots.
#[derive(Debug, Clone)]
pub struct RcIdentity {
    roots: HashMap<ValueId, ValueId>,
}

impl RcIdentity {
    /// Computes reference-count roots for every forwarded value.
    #[must_use]
    pub fn compute(function: &Function) -> Self {
        let mut copies: HashMap<ValueId, ValueId> = HashMap::new();
        for (_, op) in function.ops() {
            if let Op::Copy { result, source } = op {
                copies.insert(*result, *source);
            }
        }

        // Resolve every chain once so lookups are O(1).
        let roots = copies
            .keys()
            .map(|&value| {
                let mut current = value;
                let mut steps = 0;
                while let Some(&source) = copies.get(&current) {
                    current = source;
                    steps += 1;
                    if steps > copies.len() {
                        break;
                    }
                }
                (value, current)
            })
            .collect();

        RcIdentity { roots }
    }

    /// Returns the reference-count root of a value (itself if it is not a
    /// forwarded value).
    #[must_use]
    pub fn rc_root(&self, value: ValueId) -> ValueId {
        self.roots.get(&value).copied().unwrap_or(value)
    }

    /// Returns true if two values refer to the same reference-counted
    /// object.
    #[must_use]
    pub fn same_object(&self, a: ValueId, b: ValueId) -> bool {
        self.rc_root(a) == self.rc_root(b)
    }
}
