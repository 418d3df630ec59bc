//! Static set of nodes taking part in consensus.

use std::collections::BTreeMap;

use itemnet_types::NodeInfo;

/// All known nodes, including the local one.
#[derive(Clone, Debug)]
pub struct NetworkTopology {
    local: NodeInfo,
    nodes: Vec<NodeInfo>,
    by_number: BTreeMap<u32, usize>,
}

impl NetworkTopology {
    /// Build a topology. The local node is added if `nodes` omits it, and
    /// duplicate node numbers keep the first entry.
    pub fn new(local: NodeInfo, nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        let mut topology = Self {
            local: local.clone(),
            nodes: Vec::new(),
            by_number: BTreeMap::new(),
        };
        topology.insert(local);
        for node in nodes {
            topology.insert(node);
        }
        topology
    }

    fn insert(&mut self, node: NodeInfo) {
        if self.by_number.contains_key(&node.number) {
            return;
        }
        self.by_number.insert(node.number, self.nodes.len());
        self.nodes.push(node);
    }

    pub fn local(&self) -> &NodeInfo {
        &self.local
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Every node but the local one.
    pub fn peers(&self) -> impl Iterator<Item = &NodeInfo> {
        let local = self.local.number;
        self.nodes.iter().filter(move |n| n.number != local)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn by_number(&self, number: u32) -> Option<&NodeInfo> {
        self.by_number.get(&number).map(|&i| &self.nodes[i])
    }

    pub fn is_local(&self, node: &NodeInfo) -> bool {
        node.number == self.local.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u32) -> NodeInfo {
        NodeInfo::new(n, format!("node-{n}"))
    }

    #[test]
    fn local_node_always_present() {
        let t = NetworkTopology::new(node(1), vec![node(2), node(3)]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.by_number(1), Some(&node(1)));
    }

    #[test]
    fn duplicates_collapse() {
        let t = NetworkTopology::new(node(1), vec![node(1), node(2), node(2)]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn peers_exclude_local() {
        let t = NetworkTopology::new(node(2), (1..=4).map(node));
        let peers: Vec<u32> = t.peers().map(|n| n.number).collect();
        assert_eq!(peers, vec![1, 3, 4]);
        assert!(t.is_local(&node(2)));
        assert!(t.by_number(9).is_none());
    }
}
