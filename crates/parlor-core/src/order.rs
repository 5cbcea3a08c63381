//! Deterministic total order over a hash-linked entry set.
//!
//! Entries are emitted in topological order (every entry after the heads it
//! references). Among entries whose predecessors have all been emitted, the
//! smallest [`EntryId`] goes first. The result depends only on the set of
//! entries, never on the order they arrived in.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::types::EntryId;

/// Linearize a DAG given as `id -> heads referenced by that entry`.
///
/// Heads that are not part of the set are treated as already satisfied, so
/// a partially replicated log still orders everything it holds.
pub fn linearize(graph: &HashMap<EntryId, Vec<EntryId>>) -> Vec<EntryId> {
    let mut pending: HashMap<EntryId, usize> = HashMap::with_capacity(graph.len());
    let mut children: HashMap<EntryId, Vec<EntryId>> = HashMap::new();

    for (id, heads) in graph {
        let known = heads.iter().filter(|h| graph.contains_key(h)).count();
        pending.insert(*id, known);
        for head in heads.iter().filter(|h| graph.contains_key(h)) {
            children.entry(*head).or_default().push(*id);
        }
    }

    let mut ready: BinaryHeap<Reverse<EntryId>> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        if let Some(kids) = children.get(&id) {
            for child in kids {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(*child));
                    }
                }
            }
        }
    }

    order
}

/// The current heads of a DAG: entries no other entry in the set references.
///
/// Returned sorted, ready to be placed in a new entry header.
pub fn frontier(graph: &HashMap<EntryId, Vec<EntryId>>) -> Vec<EntryId> {
    let referenced: HashSet<&EntryId> = graph.values().flatten().collect();
    let mut heads: Vec<EntryId> = graph
        .keys()
        .filter(|id| !referenced.contains(id))
        .copied()
        .collect();
    heads.sort();
    heads
}
