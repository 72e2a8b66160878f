//! Simulation Islands
//!
//! Bodies connected through contacts are grouped into islands with a
//! union-find structure rebuilt every step. Islands sleep and wake as a unit:
//! one energetic body keeps its whole island awake, so stacks never freeze
//! halfway.

use std::collections::HashMap;

/// One element after island extraction: a body handle tagged with the id of
/// the island it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IslandElement {
    pub body: u32,
    pub island_id: u32,
}

/// Union-find over body handles, rebuilt from scratch each step.
#[derive(Debug, Default)]
pub struct IslandContainer {
    /// parent[i] and rank[i] for the slot assigned to each body.
    parents: Vec<u32>,
    ranks: Vec<u8>,
    slots: HashMap<u32, u32>,
    bodies: Vec<u32>,
}

impl IslandContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh partition over the given bodies, each in its own
    /// singleton island. Only bodies listed here can be merged or reported.
    pub fn reset(&mut self, bodies: impl IntoIterator<Item = u32>) {
        self.parents.clear();
        self.ranks.clear();
        self.slots.clear();
        self.bodies.clear();
        for body in bodies {
            let slot = self.parents.len() as u32;
            self.parents.push(slot);
            self.ranks.push(0);
            self.slots.insert(body, slot);
            self.bodies.push(body);
        }
    }

    /// Merge the islands of two bodies. Unknown bodies are ignored, which
    /// covers contacts against bodies excluded from the partition.
    pub fn merge(&mut self, body_a: u32, body_b: u32) {
        let (Some(&sa), Some(&sb)) = (self.slots.get(&body_a), self.slots.get(&body_b)) else {
            return;
        };
        let ra = self.find(sa);
        let rb = self.find(sb);
        if ra == rb {
            return;
        }
        // Union by rank.
        match self.ranks[ra as usize].cmp(&self.ranks[rb as usize]) {
            std::cmp::Ordering::Less => self.parents[ra as usize] = rb,
            std::cmp::Ordering::Greater => self.parents[rb as usize] = ra,
            std::cmp::Ordering::Equal => {
                self.parents[rb as usize] = ra;
                self.ranks[ra as usize] += 1;
            }
        }
    }

    /// True when both bodies are in the partition and share an island.
    pub fn same_island(&mut self, body_a: u32, body_b: u32) -> bool {
        let (Some(&sa), Some(&sb)) = (self.slots.get(&body_a), self.slots.get(&body_b)) else {
            return false;
        };
        self.find(sa) == self.find(sb)
    }

    /// All elements sorted by island id, so one island's bodies are
    /// contiguous. Island ids are root slots and only valid until the next
    /// `reset`.
    pub fn sorted_elements(&mut self) -> Vec<IslandElement> {
        let mut elements: Vec<IslandElement> = self
            .bodies
            .clone()
            .into_iter()
            .map(|body| {
                let slot = self.slots[&body];
                IslandElement {
                    body,
                    island_id: self.find(slot),
                }
            })
            .collect();
        elements.sort_by_key(|e| (e.island_id, e.body));
        elements
    }

    fn find(&mut self, slot: u32) -> u32 {
        let mut root = slot;
        while self.parents[root as usize] != root {
            root = self.parents[root as usize];
        }
        // Path compression.
        let mut cursor = slot;
        while self.parents[cursor as usize] != root {
            let next = self.parents[cursor as usize];
            self.parents[cursor as usize] = root;
            cursor = next;
        }
        root
    }
}

/// Iterate islands as contiguous runs of sorted elements.
pub fn islands(elements: &[IslandElement]) -> impl Iterator<Item = &[IslandElement]> {
    IslandRuns { rest: elements }
}

struct IslandRuns<'a> {
    rest: &'a [IslandElement],
}

impl<'a> Iterator for IslandRuns<'a> {
    type Item = &'a [IslandElement];

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.first()?;
        let len = self
            .rest
            .iter()
            .take_while(|e| e.island_id == first.island_id)
            .count();
        let (run, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(run)
    }
}
