/// Succinct path/step index over the embedded paths of a bidirected graph.
///
/// Flat per-step arrays answer handle/position/rank queries, and a
/// bit-packed node/path ("np") layout supports sampling steps uniformly or
/// per node: `np_bv` carries one set bit per node followed by a cleared bit
/// for every path visit to that node, while `npi_iv` / `nr_iv` record the
/// owning path and the 1-based step rank at each visit slot.
use crate::graph::{BidirectedGraph, Handle};

/// A bit-packed vector with constant-time select over set bits.
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    // positions of set bits, in order; select1(k) = ones[k - 1]
    ones: Vec<usize>,
}

impl BitVec {
    pub fn new() -> Self {
        BitVec {
            words: Vec::new(),
            len: 0,
            ones: Vec::new(),
        }
    }

    pub fn push(&mut self, bit: bool) {
        let word = self.len / 64;
        if word == self.words.len() {
            self.words.push(0);
        }
        if bit {
            self.words[word] |= 1 << (self.len % 64);
            self.ones.push(self.len);
        }
        self.len += 1;
    }

    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / 64] >> (i % 64) & 1 == 1
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        self.ones.len()
    }

    /// Position of the k-th set bit, 1-based k.
    pub fn select1(&self, k: usize) -> usize {
        self.ones[k - 1]
    }
}

impl Default for BitVec {
    fn default() -> Self {
        BitVec::new()
    }
}

struct PathMeta {
    step_count: usize,
    // in bp
    length: usize,
    // index of the path's first step in the flat step arrays
    first_step: usize,
}

/// Read-only index of every path step: owning path, rank, handle, and
/// nucleotide position, plus the np layout for node/step sampling.
pub struct PathIndex {
    step_handle: Vec<Handle>,
    step_position: Vec<usize>,
    paths: Vec<PathMeta>,
    np_bv: BitVec,
    npi_iv: Vec<u64>,
    nr_iv: Vec<u64>,
}

impl PathIndex {
    pub fn from_graph(graph: &BidirectedGraph) -> Self {
        let mut step_handle = Vec::new();
        let mut step_position = Vec::new();
        let mut paths = Vec::new();

        // per-node path visits, as (path rank, step rank), in path order
        let mut visits: Vec<Vec<(usize, usize)>> = vec![Vec::new(); graph.node_count()];

        for (path_rank, path) in graph.paths.iter().enumerate() {
            let first_step = step_handle.len();
            let mut position = 0usize;
            for (rank, &handle) in path.steps.iter().enumerate() {
                step_handle.push(handle);
                step_position.push(position);
                position += graph.length(handle);
                visits[handle.index()].push((path_rank, rank));
            }
            paths.push(PathMeta {
                step_count: path.steps.len(),
                length: position,
                first_step,
            });
        }

        let mut np_bv = BitVec::new();
        let mut npi_iv = Vec::new();
        let mut nr_iv = Vec::new();
        for node_visits in &visits {
            // node boundary; the value slots here are never dereferenced
            np_bv.push(true);
            npi_iv.push(0);
            nr_iv.push(0);
            for &(path_rank, step_rank) in node_visits {
                np_bv.push(false);
                npi_iv.push(path_rank as u64);
                nr_iv.push(step_rank as u64 + 1);
            }
        }

        PathIndex {
            step_handle,
            step_position,
            paths,
            np_bv,
            npi_iv,
            nr_iv,
        }
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn total_steps(&self) -> usize {
        self.step_handle.len()
    }

    /// Path length in nucleotides.
    pub fn path_length(&self, path: usize) -> usize {
        self.paths[path].length
    }

    pub fn path_step_count(&self, path: usize) -> usize {
        self.paths[path].step_count
    }

    /// Global step index for a (path, rank) pair.
    pub fn step_at(&self, path: usize, rank: usize) -> usize {
        debug_assert!(rank < self.paths[path].step_count);
        self.paths[path].first_step + rank
    }

    /// The step of `path` covering nucleotide offset `pos`.
    pub fn get_step_at_position(&self, path: usize, pos: usize) -> usize {
        let meta = &self.paths[path];
        debug_assert!(pos < meta.length);
        let steps = &self.step_position[meta.first_step..meta.first_step + meta.step_count];
        // last step starting at or before pos
        let rank = steps.partition_point(|&start| start <= pos) - 1;
        meta.first_step + rank
    }

    pub fn get_handle_of_step(&self, step: usize) -> Handle {
        self.step_handle[step]
    }

    /// Nucleotide offset of the step's node start within its path.
    pub fn get_position_of_step(&self, step: usize) -> usize {
        self.step_position[step]
    }

    pub fn np_bv(&self) -> &BitVec {
        &self.np_bv
    }

    pub fn npi_iv(&self) -> &[u64] {
        &self.npi_iv
    }

    pub fn nr_iv(&self) -> &[u64] {
        &self.nr_iv
    }

    /// Position of the k-th node boundary in the np layout, 1-based k.
    pub fn np_bv_select(&self, k: usize) -> usize {
        self.np_bv.select1(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BiPath;

    fn two_path_graph() -> BidirectedGraph {
        // node 1: "AC" (2bp), node 2: "GGG" (3bp), node 3: "T" (1bp)
        // path a: 1+, 2+, 3+
        // path b: 1+, 3-
        let mut graph = BidirectedGraph::new();
        graph.add_node(1, b"AC".to_vec());
        graph.add_node(2, b"GGG".to_vec());
        graph.add_node(3, b"T".to_vec());
        let mut a = BiPath::new("a");
        a.add_step(Handle::forward(1));
        a.add_step(Handle::forward(2));
        a.add_step(Handle::forward(3));
        graph.paths.push(a);
        let mut b = BiPath::new("b");
        b.add_step(Handle::forward(1));
        b.add_step(Handle::reverse(3));
        graph.paths.push(b);
        graph
    }

    #[test]
    fn test_bitvec_select() {
        let mut bv = BitVec::new();
        for i in 0..200 {
            bv.push(i % 3 == 0);
        }
        assert_eq!(bv.len(), 200);
        assert!(bv.get(0));
        assert!(!bv.get(1));
        assert!(bv.get(99));
        assert_eq!(bv.select1(1), 0);
        assert_eq!(bv.select1(2), 3);
        assert_eq!(bv.select1(34), 99);
        assert_eq!(bv.count_ones(), 67);
    }

    #[test]
    fn test_path_lengths_and_positions() {
        let graph = two_path_graph();
        let index = PathIndex::from_graph(&graph);

        assert_eq!(index.path_count(), 2);
        assert_eq!(index.total_steps(), 5);
        assert_eq!(index.path_length(0), 6);
        assert_eq!(index.path_length(1), 3);
        assert_eq!(index.path_step_count(0), 3);

        // positions along path a: 0, 2, 5
        assert_eq!(index.get_position_of_step(index.step_at(0, 0)), 0);
        assert_eq!(index.get_position_of_step(index.step_at(0, 1)), 2);
        assert_eq!(index.get_position_of_step(index.step_at(0, 2)), 5);
        // path b: 0, 2
        assert_eq!(index.get_position_of_step(index.step_at(1, 1)), 2);
    }

    #[test]
    fn test_step_at_position() {
        let graph = two_path_graph();
        let index = PathIndex::from_graph(&graph);

        // path a covers [0,2) with step 0, [2,5) with step 1, [5,6) with step 2
        assert_eq!(index.get_step_at_position(0, 0), index.step_at(0, 0));
        assert_eq!(index.get_step_at_position(0, 1), index.step_at(0, 0));
        assert_eq!(index.get_step_at_position(0, 2), index.step_at(0, 1));
        assert_eq!(index.get_step_at_position(0, 4), index.step_at(0, 1));
        assert_eq!(index.get_step_at_position(0, 5), index.step_at(0, 2));

        let h = index.get_handle_of_step(index.get_step_at_position(1, 2));
        assert_eq!(h, Handle::reverse(3));
    }

    #[test]
    fn test_np_layout() {
        let graph = two_path_graph();
        let index = PathIndex::from_graph(&graph);
        let np_bv = index.np_bv();

        // node 1 visited by a and b, node 2 by a, node 3 by a and b:
        // layout 1,0,0, 1,0, 1,0,0
        assert_eq!(np_bv.len(), 8);
        assert_eq!(np_bv.count_ones(), 3);
        assert_eq!(index.np_bv_select(1), 0);
        assert_eq!(index.np_bv_select(2), 3);
        assert_eq!(index.np_bv_select(3), 5);

        // visit slots for node 1: path a rank 0, path b rank 0
        assert!(!np_bv.get(1));
        assert_eq!(index.npi_iv()[1], 0);
        assert_eq!(index.nr_iv()[1], 1);
        assert_eq!(index.npi_iv()[2], 1);
        assert_eq!(index.nr_iv()[2], 1);
        // node 3's second visit is path b rank 1
        assert_eq!(index.npi_iv()[7], 1);
        assert_eq!(index.nr_iv()[7], 2);
    }
}
