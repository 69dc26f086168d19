//! Address resolution over flags and cross-reference lookup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{SessionError, SessionResult};
use crate::model::{Flag, Xref};

/// Flags ordered by offset, answering "nearest named location at or below".
///
/// The engine does not promise any order, so the index sorts on construction.
/// Sorting is stable: flags sharing an offset keep their engine order, and the last
/// of them wins a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagIndex {
    flags: Vec<Flag>,
}

impl FlagIndex {
    pub fn new(mut flags: Vec<Flag>) -> Self {
        flags.sort_by_key(|flag| flag.offset);
        Self { flags }
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Flag> {
        self.flags.iter()
    }

    /// The flag with the greatest offset `<= addr`, and `addr` minus that offset.
    pub fn at(&self, addr: u64) -> SessionResult<(&Flag, u64)> {
        // Right insertion point: an exact match lands left of it.
        let idx = self.flags.partition_point(|flag| flag.offset <= addr);
        let flag = idx
            .checked_sub(1)
            .and_then(|i| self.flags.get(i))
            .ok_or(SessionError::NoPrecedingFlag(addr))?;
        Ok((flag, addr - flag.offset))
    }

    /// One-shot `offset -> name` export. Later flags at the same offset win.
    pub fn symbol_map(&self) -> BTreeMap<u64, String> {
        self.flags.iter().map(|flag| (flag.offset, flag.name.clone())).collect()
    }
}

impl<'a> IntoIterator for &'a FlagIndex {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.iter()
    }
}

/// A resolved address: flag name plus residual offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolicAddress<'a> {
    pub name: &'a str,
    pub offset: u64,
}

impl fmt::Display for SymbolicAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}+{:#x}", self.name, self.offset)
        }
    }
}

/// Every cross-reference the engine reported, indexed by source and destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XrefIndex {
    edges: Vec<Xref>,
    by_source: HashMap<u64, Vec<usize>>,
    by_dest: HashMap<u64, Vec<usize>>,
}

impl XrefIndex {
    pub fn new(edges: Vec<Xref>) -> Self {
        let mut by_source: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut by_dest: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            by_source.entry(edge.fromaddr).or_default().push(idx);
            by_dest.entry(edge.addr).or_default().push(idx);
        }
        Self { edges, by_source, by_dest }
    }

    /// All edges in engine order.
    pub fn edges(&self) -> &[Xref] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The last edge reported with source `addr`.
    pub fn ref_from(&self, addr: u64) -> Option<&Xref> {
        self.by_source.get(&addr).and_then(|idxs| idxs.last()).map(|&idx| &self.edges[idx])
    }

    /// Every edge with source `addr`, in engine order.
    pub fn refs_from(&self, addr: u64) -> Vec<&Xref> {
        self.lookup(&self.by_source, addr)
    }

    /// Every edge with destination `addr`, in engine order.
    pub fn ref_to(&self, addr: u64) -> Vec<&Xref> {
        self.lookup(&self.by_dest, addr)
    }

    fn lookup(&self, index: &HashMap<u64, Vec<usize>>, addr: u64) -> Vec<&Xref> {
        index
            .get(&addr)
            .map(|idxs| idxs.iter().map(|&idx| &self.edges[idx]).collect())
            .unwrap_or_default()
    }
}
