//! Target dependency graph used to reject cycles.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::target::Address;

/// The reachable subgraph of a closure, nodes in discovery order.
pub(super) struct TargetDag {
  graph: DiGraph<Address, ()>,
}

impl TargetDag {
  pub(super) fn new(order: &[Address], edges: &[(Address, Address)]) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<&Address, NodeIndex> = HashMap::new();
    for address in order {
      nodes.insert(address, graph.add_node(address.clone()));
    }
    for (from, to) in edges {
      if let (Some(&from), Some(&to)) = (nodes.get(from), nodes.get(to)) {
        graph.add_edge(from, to, ());
      }
    }
    Self { graph }
  }

  /// Returns the offending cycle as `[a, b, ..., a]` when the graph has one.
  pub(super) fn verify_acyclic(&self) -> Result<(), Vec<Address>> {
    if toposort(&self.graph, None).is_ok() {
      return Ok(());
    }
    Err(self.find_cycle().unwrap_or_default())
  }

  /// Pick the strongly connected component holding the earliest discovered
  /// node on a cycle and walk the shortest path from that node back to itself.
  fn find_cycle(&self) -> Option<Vec<Address>> {
    let component = tarjan_scc(&self.graph)
      .into_iter()
      .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| self.graph.contains_edge(n, n)))
      .min_by_key(|scc| scc.iter().map(|n| n.index()).min())?;

    let members: HashSet<NodeIndex> = component.iter().copied().collect();
    let start = *component.iter().min_by_key(|n| n.index())?;

    let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
      for next in self.successors(node) {
        if !members.contains(&next) {
          continue;
        }
        if next == start {
          let mut middle = Vec::new();
          let mut cursor = node;
          while cursor != start {
            middle.push(cursor);
            match parents.get(&cursor) {
              Some(&parent) => cursor = parent,
              None => break,
            }
          }
          middle.reverse();

          let path = std::iter::once(start).chain(middle).chain(std::iter::once(start));
          return Some(path.map(|n| self.graph[n].clone()).collect());
        }
        if !parents.contains_key(&next) {
          parents.insert(next, node);
          queue.push_back(next);
        }
      }
    }
    None
  }

  /// Successors in discovery order, so cycle reports are stable.
  fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
    let mut successors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
    successors.sort_by_key(|n| n.index());
    successors.dedup();
    successors
  }
}
