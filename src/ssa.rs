//! Static single assignment bookkeeping for path formulas.

use std::collections::BTreeMap;
use std::fmt;

use crate::formula::{Formula, Symbol, Term};

/// Index of a variable that has not been written on the current path.
pub const INITIAL_INDEX: u32 = 1;

/// Maps each variable to the highest version index used so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SsaMap {
    indices: BTreeMap<String, u32>,
}

impl SsaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index of `name`, [`INITIAL_INDEX`] if never written.
    pub fn index(&self, name: &str) -> u32 {
        self.indices.get(name).copied().unwrap_or(INITIAL_INDEX)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.indices.get(name).copied()
    }

    /// Allocates the next version of `name` and returns its index.
    pub fn fresh(&mut self, name: &str) -> u32 {
        let next = self.index(name) + 1;
        self.indices.insert(name.to_string(), next);
        next
    }

    pub fn set(&mut self, name: &str, index: u32) {
        let current = self.index(name);
        assert!(
            index >= current,
            "SSA index of {} must not decrease ({} -> {})",
            name,
            current,
            index
        );
        self.indices.insert(name.to_string(), index);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.indices.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Equalities `v@k = v@(k-1)` that lift every variable of `self` to its index in `target`.
    pub fn equalities_to(&self, target: &SsaMap) -> Formula {
        let mut parts = Vec::new();
        for (name, high) in target.iter() {
            let low = self.index(name);
            for k in (low + 1)..=high {
                let newer = Term::Var(Symbol::indexed(name, k));
                let older = Term::Var(Symbol::indexed(name, k - 1));
                parts.push(newer.equals(older));
            }
        }
        Formula::and(parts)
    }

    /// Max-index merge. Returns the merged map and the equality constraints
    /// to conjoin onto the left and right branch respectively.
    pub fn merge(&self, other: &SsaMap) -> (SsaMap, Formula, Formula) {
        let merged = SsaMap::merge_all([self, other]);
        let left = self.equalities_to(&merged);
        let right = other.equalities_to(&merged);
        (merged, left, right)
    }

    pub fn merge_all<'a>(maps: impl IntoIterator<Item = &'a SsaMap>) -> SsaMap {
        let mut merged = SsaMap::new();
        for map in maps {
            for (name, index) in map.iter() {
                let entry = merged.indices.entry(name.to_string()).or_insert(index);
                *entry = (*entry).max(index);
            }
        }
        merged
    }
}

impl fmt::Display for SsaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, index)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}@{}", name, index)?;
        }
        write!(f, "}}")
    }
}
