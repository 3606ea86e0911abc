use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::circuit::{Component, ComponentType, NodeId};

/// Undirected graph whose vertices are node ids and whose edges are
/// two-terminal components.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl ConnectivityGraph {
    /// Build the adjacency map. Single-terminal components (ground) add
    /// their node without edges; self-loops are skipped.
    pub fn from_components(components: &[Component]) -> Self {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        for component in components {
            for &node in &component.nodes {
                adjacency.entry(node).or_default();
            }

            if let &[n1, n2, ..] = component.nodes.as_slice() {
                if n1 != n2 {
                    adjacency.entry(n1).or_default().insert(n2);
                    adjacency.entry(n2).or_default().insert(n1);
                }
            }
        }

        ConnectivityGraph { adjacency }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.get(&node).into_iter().flatten().copied()
    }

    /// Connected networks, ordered by their lowest node id
    pub fn connected_networks(&self) -> Vec<BTreeSet<NodeId>> {
        let mut visited = BTreeSet::new();
        let mut networks = Vec::new();

        for node in self.nodes() {
            if !visited.contains(&node) {
                networks.push(self.reachable_from(node, &mut visited));
            }
        }

        networks
    }

    /// Returns true for an empty circuit or a single network
    pub fn is_connected(&self) -> bool {
        self.connected_networks().len() <= 1
    }

    fn reachable_from(&self, start: NodeId, visited: &mut BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut network = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            network.insert(current);

            for neighbor in self.neighbors(current) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        network
    }
}

/// What one isolated network contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDetail {
    /// Sorted node ids of the network
    pub nodes: Vec<NodeId>,
    /// Kinds of components with at least one terminal in the network
    pub component_types: BTreeSet<ComponentType>,
    /// Names of those components, in list order
    pub component_names: Vec<String>,
}

impl NetworkDetail {
    pub fn classify(network: &BTreeSet<NodeId>, components: &[Component]) -> Self {
        let mut component_types = BTreeSet::new();
        let mut component_names = Vec::new();

        for component in components {
            if component.nodes.iter().any(|node| network.contains(node)) {
                component_types.insert(component.component_type);
                component_names.push(component.name.clone());
            }
        }

        NetworkDetail {
            nodes: network.iter().copied().collect(),
            component_types,
            component_names,
        }
    }

    pub fn contains_kind(&self, kind: ComponentType) -> bool {
        self.component_types.contains(&kind)
    }
}

impl fmt::Display for NetworkDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.component_types.iter().map(ComponentType::name).collect();
        write!(f, "nodes {:?} (contains: {})", self.nodes, kinds.join(", "))
    }
}

/// Classify every network of a component list
pub fn describe_networks(networks: &[BTreeSet<NodeId>], components: &[Component]) -> Vec<NetworkDetail> {
    networks
        .iter()
        .map(|network| NetworkDetail::classify(network, components))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floating_example() -> Vec<Component> {
        vec![
            Component::new_voltage_source("VS1", 1, 0, 15.0),
            Component::new_wire("W1", 3, 4),
            Component::new_wire("W2", 5, 6),
            Component::new_wire("W3", 4, 5),
            Component::new_ground("GND", 7),
        ]
    }

    #[test]
    fn test_empty_graph_is_connected() {
        let graph = ConnectivityGraph::from_components(&[]);
        assert_eq!(graph.node_count(), 0);
        assert!(graph.connected_networks().is_empty());
        assert!(graph.is_connected());
    }

    #[test]
    fn test_networks_of_floating_example() {
        let graph = ConnectivityGraph::from_components(&floating_example());
        let networks = graph.connected_networks();

        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0], BTreeSet::from([0, 1]));
        assert_eq!(networks[1], BTreeSet::from([3, 4, 5, 6]));
        assert_eq!(networks[2], BTreeSet::from([7]));
        assert!(!graph.is_connected());
    }

    #[test]
    fn test_self_loop_adds_node_without_edge() {
        let graph = ConnectivityGraph::from_components(&[Component::new_wire("W1", 2, 2)]);
        assert!(graph.contains(2));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.neighbors(2).count(), 0);
    }

    #[test]
    fn test_parallel_edges_collapse() {
        let components = vec![
            Component::new_resistor("R1", 1, 2, 100.0),
            Component::new_resistor("R2", 2, 1, 200.0),
        ];
        let graph = ConnectivityGraph::from_components(&components);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_network_detail_classification() {
        let components = floating_example();
        let graph = ConnectivityGraph::from_components(&components);
        let details = describe_networks(&graph.connected_networks(), &components);

        assert!(details[0].contains_kind(ComponentType::VoltageSource));
        assert_eq!(details[1].component_names, vec!["W1", "W2", "W3"]);
        assert_eq!(details[1].component_types, BTreeSet::from([ComponentType::Wire]));
        assert!(details[2].contains_kind(ComponentType::Ground));
        assert_eq!(details[2].to_string(), "nodes [7] (contains: Ground)");
    }
}
