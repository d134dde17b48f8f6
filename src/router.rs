//! Network topology and BFS routing (§4.5).
//!
//! Grounded 1:1 on `original_source/P2P System/router.py`: a peer-graph
//! (adjacency sets), a BFS shortest-path search, and a derived
//! destination→next-hop routing table recomputed whenever the graph
//! changes.
//!
//! Deliberate departure from the teacher's usual `HashMap`/`HashSet`:
//! this module uses `BTreeMap`/`BTreeSet` so neighbor iteration order is
//! deterministic. BFS tie-breaking among same-distance neighbors
//! otherwise depends on hash iteration order, which would make routing
//! decisions (and their tests) nondeterministic across runs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::types::PeerId;

/// Adjacency graph plus the routing table derived from it.
#[derive(Debug, Default)]
pub struct Router {
    peer_id: PeerId,
    peer_graph: BTreeMap<PeerId, BTreeSet<PeerId>>,
    routing_graph: BTreeMap<PeerId, PeerId>,
}

impl Router {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            peer_graph: BTreeMap::new(),
            routing_graph: BTreeMap::new(),
        }
    }

    /// Shortest path from this node to `target_peer_id`, by hop count.
    /// `None` when the target is unknown or unreachable.
    pub fn bfs_path(&self, target_peer_id: &str) -> Option<Vec<PeerId>> {
        if target_peer_id == self.peer_id {
            return Some(vec![self.peer_id.clone()]);
        }
        if !self.peer_graph.contains_key(target_peer_id) {
            return None;
        }

        let mut frontier: VecDeque<(PeerId, Vec<PeerId>)> = VecDeque::new();
        let mut explored: BTreeSet<PeerId> = BTreeSet::new();
        frontier.push_back((self.peer_id.clone(), vec![self.peer_id.clone()]));

        while let Some((current, path)) = frontier.pop_front() {
            if explored.contains(&current) {
                continue;
            }
            explored.insert(current.clone());
            if current == target_peer_id {
                return Some(path);
            }
            if let Some(neighbors) = self.peer_graph.get(&current) {
                for neighbor in neighbors {
                    if !explored.contains(neighbor) {
                        let mut next_path = path.clone();
                        next_path.push(neighbor.clone());
                        frontier.push_back((neighbor.clone(), next_path));
                    }
                }
            }
        }
        None
    }

    /// The node immediately after `current_node` in `path`, if any.
    fn next_hop_in_path(current_node: &str, path: &[PeerId]) -> Option<PeerId> {
        let index = path.iter().position(|p| p == current_node)?;
        path.get(index + 1).cloned()
    }

    /// Recompute `routing_graph` from scratch via BFS against every peer
    /// in `known_peers` (§4.5: run after every topology change).
    pub fn recompute(&mut self, known_peers: &BTreeSet<PeerId>) {
        self.routing_graph.clear();
        for target in known_peers {
            if *target == self.peer_id {
                continue;
            }
            if let Some(path) = self.bfs_path(target) {
                if let Some(next_hop) = Self::next_hop_in_path(&self.peer_id, &path) {
                    self.routing_graph.insert(target.clone(), next_hop);
                }
            }
        }
    }

    /// The precomputed next hop toward `target`, if routable.
    pub fn next_hop(&self, target: &str) -> Option<&PeerId> {
        self.routing_graph.get(target)
    }

    /// A snapshot of the full destination→next-hop table (for operator
    /// inspection via `snapshot()`, spec.md §6).
    pub fn routes(&self) -> BTreeMap<PeerId, PeerId> {
        self.routing_graph.clone()
    }

    /// Record a direct link between this node and `other_peer_id`.
    /// Returns whether the graph actually changed, so callers can skip
    /// a recompute when gossip reports an already-known edge.
    pub fn add_edge(&mut self, other_peer_id: &str) -> bool {
        let added_self = self
            .peer_graph
            .entry(self.peer_id.clone())
            .or_default()
            .insert(other_peer_id.to_string());
        let added_other = self
            .peer_graph
            .entry(other_peer_id.to_string())
            .or_default()
            .insert(self.peer_id.clone());
        added_self || added_other
    }

    /// Remove a disconnected peer from the graph and from every route
    /// that passed through it — either as the final destination or as
    /// an intermediate hop.
    pub fn remove_peer(&mut self, other_peer_id: &str) {
        self.peer_graph.remove(other_peer_id);

        self.routing_graph
            .retain(|destination, hop| destination != other_peer_id && hop != other_peer_id);

        for neighbors in self.peer_graph.values_mut() {
            neighbors.remove(other_peer_id);
        }
    }

    /// Merge in a neighbor's view of the network (received in a
    /// `NETWORK_UPDATE` gossip message, §4.6.4). Returns whether any new
    /// edge was learned, so the caller knows whether to recompute and
    /// re-gossip.
    pub fn merge_remote_graph(&mut self, remote: &BTreeMap<PeerId, BTreeSet<PeerId>>) -> bool {
        let mut changed = false;
        for (node, neighbors) in remote {
            let entry = self.peer_graph.entry(node.clone()).or_default();
            for neighbor in neighbors {
                if entry.insert(neighbor.clone()) {
                    changed = true;
                }
                if self
                    .peer_graph
                    .entry(neighbor.clone())
                    .or_default()
                    .insert(node.clone())
                {
                    changed = true;
                }
            }
        }
        changed
    }

    /// A snapshot of the current graph, suitable for gossiping onward.
    pub fn graph_snapshot(&self) -> BTreeMap<PeerId, BTreeSet<PeerId>> {
        self.peer_graph.clone()
    }

    pub fn known_peers(&self) -> BTreeSet<PeerId> {
        self.peer_graph.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with_chain() -> Router {
        // a - b - c - d
        let mut r = Router::new("a".to_string());
        r.add_edge("b");
        r.peer_graph.entry("b".to_string()).or_default().insert("c".to_string());
        r.peer_graph.entry("c".to_string()).or_default().insert("b".to_string());
        r.peer_graph.entry("c".to_string()).or_default().insert("d".to_string());
        r.peer_graph.entry("d".to_string()).or_default().insert("c".to_string());
        r
    }

    #[test]
    fn bfs_finds_shortest_path() {
        let r = router_with_chain();
        let path = r.bfs_path("d").unwrap();
        assert_eq!(path, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn bfs_to_self_is_trivial() {
        let r = Router::new("a".to_string());
        assert_eq!(r.bfs_path("a"), Some(vec!["a".to_string()]));
    }

    #[test]
    fn bfs_to_unknown_peer_is_none() {
        let r = Router::new("a".to_string());
        assert_eq!(r.bfs_path("z"), None);
    }

    #[test]
    fn recompute_builds_next_hop_table() {
        let mut r = router_with_chain();
        let known: BTreeSet<PeerId> = ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        r.recompute(&known);
        assert_eq!(r.next_hop("b"), Some(&"b".to_string()));
        assert_eq!(r.next_hop("c"), Some(&"b".to_string()));
        assert_eq!(r.next_hop("d"), Some(&"b".to_string()));
    }

    #[test]
    fn remove_peer_drops_routes_through_it() {
        let mut r = router_with_chain();
        let known: BTreeSet<PeerId> = ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        r.recompute(&known);
        r.remove_peer("b");
        let known: BTreeSet<PeerId> = ["c", "d"].iter().map(|s| s.to_string()).collect();
        r.recompute(&known);
        assert_eq!(r.next_hop("c"), None);
        assert_eq!(r.next_hop("d"), None);
    }

    #[test]
    fn merge_remote_graph_reports_whether_it_learned_anything() {
        let mut r = Router::new("a".to_string());
        r.add_edge("b");

        let mut remote = BTreeMap::new();
        let mut b_neighbors = BTreeSet::new();
        b_neighbors.insert("a".to_string());
        remote.insert("b".to_string(), b_neighbors);
        assert!(!r.merge_remote_graph(&remote), "already-known edge changes nothing");

        let mut remote2 = BTreeMap::new();
        let mut c_neighbors = BTreeSet::new();
        c_neighbors.insert("b".to_string());
        remote2.insert("c".to_string(), c_neighbors);
        assert!(r.merge_remote_graph(&remote2), "new edge b-c should be learned");
        assert!(r.peer_graph.get("b").unwrap().contains("c"));
    }

    #[test]
    fn add_edge_reports_change_only_once() {
        let mut r = Router::new("a".to_string());
        assert!(r.add_edge("b"));
        assert!(!r.add_edge("b"));
    }
}
