use rendezvous_rs::{graph::PatrolGraph, types::basic::VertexId};

/// `0 - 1 - ... - (len - 1)`, every edge costing one tick.
pub(crate) fn path(len: u32) -> PatrolGraph {
    PatrolGraph::from_edges((0..len - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1), 1)))
}

/// A `width` x `height` grid with unit edges. Vertex `(x, y)` has id `y * width + x`.
pub(crate) fn grid(width: u32, height: u32) -> PatrolGraph {
    let id = |x: u32, y: u32| VertexId::new(y * width + x);
    let mut graph = PatrolGraph::new();
    for y in 0..height {
        for x in 0..width {
            graph.add_vertex(id(x, y));
            if x + 1 < width {
                graph.add_edge(id(x, y), id(x + 1, y), 1);
            }
            if y + 1 < height {
                graph.add_edge(id(x, y), id(x, y + 1), 1);
            }
        }
    }
    graph
}
