//! Welsh–Powell greedy graph colouring.

use std::collections::{BTreeMap, BTreeSet};

/// Colour `nodes` so that no two nodes joined in `conflicts` share a colour.
///
/// Nodes are visited in descending order of degree (ties: ascending node order). Colour 0 is given to
/// every node that does not conflict with a node already coloured 0, then colour 1 to the remaining
/// nodes in the same order, and so on. The result is deterministic for a given input.
pub fn welsh_powell<N: Ord + Copy>(
    nodes: &BTreeSet<N>,
    conflicts: &BTreeMap<N, BTreeSet<N>>,
) -> BTreeMap<N, u32> {
    let degree = |node: &N| conflicts.get(node).map_or(0, |adjacent| adjacent.len());
    let mut order: Vec<N> = nodes.iter().copied().collect();
    order.sort_by(|a, b| degree(b).cmp(&degree(a)).then(a.cmp(b)));

    let mut colours: BTreeMap<N, u32> = BTreeMap::new();
    let mut colour = 0;
    while colours.len() < order.len() {
        for node in &order {
            if colours.contains_key(node) {
                continue;
            }
            let clashes = conflicts.get(node).is_some_and(|adjacent| {
                adjacent
                    .iter()
                    .any(|other| colours.get(other) == Some(&colour))
            });
            if !clashes {
                colours.insert(*node, colour);
            }
        }
        colour += 1;
    }
    colours
}

/// Number of distinct colours used by a colouring (at least 1).
pub fn colour_count<N>(colours: &BTreeMap<N, u32>) -> u32 {
    colours.values().max().map_or(1, |max| max + 1)
}
