//! # pathsgd
//!
//! Path-guided stochastic gradient descent (PG-SGD) 1-D layout and ordering
//! for bidirected pangenome variation graphs.
//!
//! Given a graph whose nodes carry DNA sequences and a set of embedded
//! paths, the engine learns one real coordinate per node such that nodes
//! close along paths are close in the coordinate, weighted inversely by
//! path distance. Sorting nodes by that coordinate (within weakly-connected
//! components) yields a 1-D order of the graph.
//!
//! ## Features
//!
//! - **Path-guided SGD**: term distances come straight from path embeddings
//! - **Three sampling modes**: uniform over path nucleotides, over path
//!   steps, or over nodes
//! - **Lock-free concurrency**: Hogwild-style workers update a shared
//!   coordinate vector without locks
//! - **Deterministic mode**: a single-threaded seeded driver reproduces
//!   bit-identical layouts for testing
//!
//! ## Quick start
//!
//! ```rust
//! use pathsgd::{BidirectedGraph, BiPath, PathIndex, PathSgdParams, path_linear_sgd_order};
//!
//! let mut graph = BidirectedGraph::new();
//! let a = graph.add_node(1, b"ACGTACGTAC".to_vec());
//! let b = graph.add_node(2, b"TTTT".to_vec());
//! graph.add_edge(a, b);
//! let mut path = BiPath::new("sample");
//! path.add_step(a);
//! path.add_step(b);
//! graph.paths.push(path);
//!
//! let index = PathIndex::from_graph(&graph);
//! let params = PathSgdParams {
//!     deterministic: true,
//!     iter_max: 20,
//!     min_term_updates: 10,
//!     space: 14,
//!     ..Default::default()
//! };
//! let result = path_linear_sgd_order(&graph, &index, &[0], &params).unwrap();
//! assert_eq!(result.order.len(), 2);
//! ```

mod gfa;
mod graph;
mod order;
mod pathindex;
mod sgd;
mod zipf;

pub use gfa::{load_gfa, write_gfa};
pub use graph::{reverse_complement, BiEdge, BiNode, BiPath, BidirectedGraph, Handle};
pub use order::{path_linear_sgd_order, weakly_connected_components, SgdOrder};
pub use pathindex::{BitVec, PathIndex};
pub use sgd::{
    deterministic_path_linear_sgd, path_linear_sgd, path_linear_sgd_schedule, PathSgdParams,
    SgdLayout,
};
pub use zipf::ZipfianInt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hyperparameter or argument violates its precondition.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The path-interval index failed to cover a sampled position. This is
    /// unreachable for a consistent index and aborts the run.
    #[error("no path interval covers pangenomic position {0}")]
    IntervalNotFound(u64),
    #[error("invalid GFA: {0}")]
    InvalidGfa(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
