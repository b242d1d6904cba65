/// Bidirected sequence graph primitives.
///
/// Nodes carry DNA sequences and are identified by compact 1-based ids.
/// A `Handle` is an oriented reference to a node, packed into a single
/// u64 as `id << 1 | orientation` so handles sort by (id, strand) and
/// can be used directly as tie-breakers when ordering layouts.
use std::collections::BTreeSet;
use std::fmt;

/// An oriented node reference: node id plus strand, bit-packed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn new(node_id: usize, is_reverse: bool) -> Self {
        Handle(((node_id as u64) << 1) | is_reverse as u64)
    }

    pub fn forward(node_id: usize) -> Self {
        Handle::new(node_id, false)
    }

    pub fn reverse(node_id: usize) -> Self {
        Handle::new(node_id, true)
    }

    /// The 1-based node id.
    pub fn node_id(&self) -> usize {
        (self.0 >> 1) as usize
    }

    /// The 0-based node rank, usable as a direct index into per-node arrays.
    /// Valid because the graph keeps its id space compact.
    pub fn index(&self) -> usize {
        self.node_id() - 1
    }

    pub fn is_reverse(&self) -> bool {
        self.0 & 1 == 1
    }

    /// The same node on the opposite strand.
    pub fn flip(self) -> Self {
        Handle(self.0 ^ 1)
    }

    /// The packed representation, used for stable tie-breaking.
    pub fn as_integer(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.node_id(),
            if self.is_reverse() { '-' } else { '+' }
        )
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self)
    }
}

/// A node: id plus its DNA sequence.
#[derive(Clone, Debug)]
pub struct BiNode {
    pub id: usize,
    pub sequence: Vec<u8>,
}

/// An edge between two oriented node ends.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct BiEdge {
    pub from: Handle,
    pub to: Handle,
}

/// An embedded path: a named sequence of handles.
#[derive(Clone, Debug)]
pub struct BiPath {
    pub name: String,
    pub steps: Vec<Handle>,
}

impl BiPath {
    pub fn new(name: impl Into<String>) -> Self {
        BiPath {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, handle: Handle) {
        self.steps.push(handle);
    }
}

/// A bidirected graph with a compact, 1-based node id space.
///
/// Handle iteration order is id order and is stable across calls; layout
/// initialization and order finalization both rely on that.
#[derive(Clone, Debug, Default)]
pub struct BidirectedGraph {
    nodes: Vec<BiNode>,
    pub edges: BTreeSet<BiEdge>,
    pub paths: Vec<BiPath>,
}

impl BidirectedGraph {
    pub fn new() -> Self {
        BidirectedGraph::default()
    }

    /// Add a node. Ids must be assigned densely in ascending order
    /// starting from 1.
    pub fn add_node(&mut self, id: usize, sequence: Vec<u8>) -> Handle {
        assert_eq!(
            id,
            self.nodes.len() + 1,
            "node ids must be compact and added in ascending order"
        );
        self.nodes.push(BiNode { id, sequence });
        Handle::forward(id)
    }

    pub fn add_edge(&mut self, from: Handle, to: Handle) {
        self.edges.insert(BiEdge { from, to });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Sequence length of the node referenced by `handle`.
    pub fn length(&self, handle: Handle) -> usize {
        self.nodes[handle.index()].sequence.len()
    }

    /// Forward-strand sequence of the node referenced by `handle`.
    pub fn sequence(&self, handle: Handle) -> &[u8] {
        &self.nodes[handle.index()].sequence
    }

    /// Visit the forward handle of every node, in id order.
    pub fn for_each_handle<F: FnMut(Handle)>(&self, mut f: F) {
        for node in &self.nodes {
            f(Handle::forward(node.id));
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.nodes.iter().map(|n| Handle::forward(n.id))
    }

    /// Rebuild the graph with nodes renumbered in `order`. The k-th handle
    /// of `order` becomes node k+1; reversed handles have their sequence
    /// complement-reversed and all edge and step orientations are remapped
    /// so the embedding is unchanged. `order` must reference every node
    /// exactly once.
    pub fn apply_ordering(&self, order: &[Handle]) -> crate::Result<BidirectedGraph> {
        if order.len() != self.node_count() {
            return Err(crate::Error::InvalidParameter(format!(
                "ordering covers {} of {} nodes",
                order.len(),
                self.node_count()
            )));
        }
        let mut new_id = vec![0usize; self.node_count()];
        let mut flipped = vec![false; self.node_count()];
        for (k, handle) in order.iter().enumerate() {
            if new_id[handle.index()] != 0 {
                return Err(crate::Error::InvalidParameter(format!(
                    "node {} appears more than once in the ordering",
                    handle.node_id()
                )));
            }
            new_id[handle.index()] = k + 1;
            flipped[handle.index()] = handle.is_reverse();
        }

        let mut graph = BidirectedGraph::new();
        for (k, handle) in order.iter().enumerate() {
            let sequence = if handle.is_reverse() {
                reverse_complement(self.sequence(*handle))
            } else {
                self.sequence(*handle).to_vec()
            };
            graph.add_node(k + 1, sequence);
        }
        let remap = |h: Handle| Handle::new(new_id[h.index()], h.is_reverse() ^ flipped[h.index()]);
        for edge in &self.edges {
            graph.add_edge(remap(edge.from), remap(edge.to));
        }
        for path in &self.paths {
            let mut new_path = BiPath::new(path.name.clone());
            for &step in &path.steps {
                new_path.add_step(remap(step));
            }
            graph.paths.push(new_path);
        }
        Ok(graph)
    }
}

/// Reverse complement of a DNA sequence, case-preserving.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            b'a' => b't',
            b't' => b'a',
            b'c' => b'g',
            b'g' => b'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let h = Handle::forward(7);
        assert_eq!(h.node_id(), 7);
        assert_eq!(h.index(), 6);
        assert!(!h.is_reverse());
        assert!(h.flip().is_reverse());
        assert_eq!(h.flip().node_id(), 7);
        assert_eq!(h.flip().flip(), h);
        // forward sorts before reverse for the same node
        assert!(h.as_integer() < h.flip().as_integer());
        assert!(h.as_integer() < Handle::forward(8).as_integer());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(Handle::forward(3).to_string(), "3+");
        assert_eq!(Handle::reverse(3).to_string(), "3-");
    }

    #[test]
    fn test_graph_build() {
        let mut graph = BidirectedGraph::new();
        graph.add_node(1, b"ACGT".to_vec());
        graph.add_node(2, b"TT".to_vec());
        graph.add_edge(Handle::forward(1), Handle::forward(2));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.length(Handle::forward(1)), 4);
        assert_eq!(graph.length(Handle::reverse(2)), 2);

        let mut seen = Vec::new();
        graph.for_each_handle(|h| seen.push(h.node_id()));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT".to_vec());
        assert_eq!(reverse_complement(b"AAC"), b"GTT".to_vec());
        assert_eq!(reverse_complement(b"acgtN"), b"Nacgt".to_vec());
    }

    #[test]
    fn test_apply_ordering_renumbers() {
        let mut graph = BidirectedGraph::new();
        graph.add_node(1, b"A".to_vec());
        graph.add_node(2, b"CC".to_vec());
        graph.add_node(3, b"GGG".to_vec());
        graph.add_edge(Handle::forward(1), Handle::forward(2));
        graph.add_edge(Handle::forward(2), Handle::forward(3));
        let mut path = BiPath::new("p");
        path.add_step(Handle::forward(1));
        path.add_step(Handle::forward(2));
        path.add_step(Handle::forward(3));
        graph.paths.push(path);

        let order = vec![
            Handle::forward(3),
            Handle::forward(2),
            Handle::forward(1),
        ];
        let reordered = graph.apply_ordering(&order).unwrap();
        assert_eq!(reordered.node_count(), 3);
        // node 3 became node 1
        assert_eq!(reordered.sequence(Handle::forward(1)), b"GGG");
        assert_eq!(reordered.sequence(Handle::forward(3)), b"A");
        // the path now runs 3,2,1 in the new id space
        let steps: Vec<usize> = reordered.paths[0]
            .steps
            .iter()
            .map(|h| h.node_id())
            .collect();
        assert_eq!(steps, vec![3, 2, 1]);
    }

    #[test]
    fn test_apply_ordering_rejects_partial_order() {
        let mut graph = BidirectedGraph::new();
        graph.add_node(1, b"A".to_vec());
        graph.add_node(2, b"C".to_vec());
        assert!(graph.apply_ordering(&[Handle::forward(1)]).is_err());
        assert!(graph
            .apply_ordering(&[Handle::forward(1), Handle::forward(1)])
            .is_err());
    }
}
