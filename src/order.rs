/// Order finalization: convert learned 1-D coordinates into a node order,
/// refined by weakly-connected components so disconnected subgraphs stay
/// contiguous and appear in a stable, id-driven sequence.
use crate::graph::{BidirectedGraph, Handle};
use crate::pathindex::PathIndex;
use crate::sgd::{deterministic_path_linear_sgd, path_linear_sgd, PathSgdParams};
use crate::Result;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// The final handle order, plus one order per recorded layout snapshot.
#[derive(Debug, Clone, Default)]
pub struct SgdOrder {
    pub order: Vec<Handle>,
    pub snapshots: Vec<Vec<Handle>>,
}

/// Node partition by undirected reachability through the graph's edges.
/// Each component is a sorted list of 1-based node ids.
pub fn weakly_connected_components(graph: &BidirectedGraph) -> Vec<Vec<usize>> {
    let n = graph.node_count();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        let a = edge.from.index();
        let b = edge.to.index();
        if a != b {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    let mut component_of = vec![usize::MAX; n];
    let mut components = Vec::new();
    for start in 0..n {
        if component_of[start] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = vec![start + 1];
        component_of[start] = id;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if component_of[next] == usize::MAX {
                    component_of[next] = id;
                    members.push(next + 1);
                    queue.push_back(next);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }
    components
}

/// Rank each node's component by ascending mean node id; returns the rank
/// for every node, indexed by node rank.
fn component_ranks(graph: &BidirectedGraph) -> Vec<u64> {
    let components = weakly_connected_components(graph);
    let mut by_mean: Vec<(f64, usize)> = components
        .iter()
        .enumerate()
        .map(|(i, members)| {
            let id_sum: usize = members.iter().sum();
            (id_sum as f64 / members.len() as f64, i)
        })
        .collect();
    by_mean.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut rank_of_component = vec![0u64; components.len()];
    for (rank, &(_, component)) in by_mean.iter().enumerate() {
        rank_of_component[component] = rank as u64;
    }
    let mut node_rank = vec![0u64; graph.node_count()];
    for (component, members) in components.iter().enumerate() {
        for &id in members {
            node_rank[id - 1] = rank_of_component[component];
        }
    }
    node_rank
}

/// Sort handles by (component rank, coordinate, handle integer).
fn order_from_layout(
    graph: &BidirectedGraph,
    component_rank: &[u64],
    x: &[f64],
) -> Vec<Handle> {
    let mut layout: Vec<(u64, f64, Handle)> = Vec::with_capacity(graph.node_count());
    graph.for_each_handle(|handle| {
        layout.push((component_rank[handle.index()], x[handle.index()], handle));
    });
    layout.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .then(a.2.as_integer().cmp(&b.2.as_integer()))
    });
    layout.into_iter().map(|(_, _, handle)| handle).collect()
}

/// Run the layout engine and finalize the result as a handle order. Picks
/// the deterministic or concurrent driver according to
/// `params.deterministic`; snapshots, when recorded, are finalized the
/// same way.
pub fn path_linear_sgd_order(
    graph: &BidirectedGraph,
    path_index: &PathIndex,
    use_paths: &[usize],
    params: &PathSgdParams,
) -> Result<SgdOrder> {
    let layout = if params.deterministic {
        deterministic_path_linear_sgd(graph, path_index, use_paths, params)?
    } else {
        path_linear_sgd(graph, path_index, use_paths, params)?
    };
    let component_rank = component_ranks(graph);
    let order = order_from_layout(graph, &component_rank, &layout.x);
    let snapshots = layout
        .snapshots
        .iter()
        .map(|snapshot| order_from_layout(graph, &component_rank, snapshot))
        .collect();
    Ok(SgdOrder { order, snapshots })
}
