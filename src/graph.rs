//! Communication mesh adjacency and reachability.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Undirected communication graph, frozen for the duration of an engine
/// operation.
///
/// Adjacency is rebuilt once at construction: every edge is attached in
/// both directions, so `a ∈ adj(b)` and `b ∈ adj(a)` hold for any edge
/// (a, b) whose endpoint names a known robot.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    adjacency: HashMap<String, Vec<String>>,
}

impl NetworkTopology {
    pub fn from_edges<'a, I>(robot_ids: I, edges: &[Edge]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut adjacency: HashMap<String, Vec<String>> = robot_ids
            .into_iter()
            .map(|id| (id.to_string(), Vec::new()))
            .collect();

        for edge in edges {
            if let Some(neighbors) = adjacency.get_mut(&edge.from) {
                neighbors.push(edge.to.clone());
            }
            if let Some(neighbors) = adjacency.get_mut(&edge.to) {
                neighbors.push(edge.from.clone());
            }
        }

        Self { adjacency }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    pub fn neighbors(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map_or(&[], Vec::as_slice)
    }

    /// True iff a path exists from `from` to `to` in the current adjacency.
    ///
    /// Breadth-first search, O(V+E); false when either endpoint is absent.
    pub fn reachable(&self, from: &str, to: &str) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }

        let mut visited: HashSet<&str> = HashSet::with_capacity(self.adjacency.len());
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for neighbor in self.neighbors(current) {
                if !visited.contains(neighbor.as_str()) {
                    queue.push_back(neighbor);
                }
            }
        }

        false
    }
}
