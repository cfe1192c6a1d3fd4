//! Assembly of the learned graph and its Graphviz rendering.
//!
//! The skeleton keeps an edge between two variables only when each appears
//! in the other's candidate parents-and-children set (the symmetry
//! correction). Orientation is limited to the immediate v-structure rule:
//! an unshielded triple u − w − v becomes u → w ← v when w is missing from
//! the separating set recovered for (u, v). No Meek-rule closure is applied;
//! the remaining edges stay undirected.

use crate::data::DiscreteData;
use crate::{VariableId, VariableSet};
use std::collections::BTreeSet;
use std::io::{self, Write};
use tracing::debug;

/// A learned network: a skeleton, optionally with its v-structures oriented.
pub struct Network<V: VariableId> {
    names: Vec<String>,
    oriented: bool,
    undirected: Vec<(V, V)>,
    directed: Vec<(V, V)>,
}

impl<V: VariableId> Network<V> {
    /// Builds the network from one candidate PC set per variable.
    ///
    /// The separating sets that drive orientation are recomputed from the
    /// oracle with the same ascending-size scan the discovery phase uses, so
    /// the smallest separating set always decides. Triples are visited in
    /// ascending (w, u, v) order and the first orientation of an edge wins.
    pub fn assemble(
        data: &DiscreteData<'_>,
        cpcs: &[VariableSet<V>],
        direct_edges: bool,
        max_conditioning: usize,
    ) -> Network<V> {
        let n = cpcs.len();
        let adjacency: Vec<VariableSet<V>> = (0..n)
            .map(|u| {
                let at_u = V::from_usize(u);
                cpcs[u]
                    .iter()
                    .filter(|&v| cpcs[v.as_usize()].contains(at_u))
                    .collect()
            })
            .collect();

        let mut skeleton: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (u, neighbors) in adjacency.iter().enumerate() {
            for v in neighbors.iter() {
                let v = v.as_usize();
                if u < v {
                    skeleton.insert((u, v));
                }
            }
        }

        let names = (0..n)
            .map(|u| data.var_name(V::from_usize(u)).to_owned())
            .collect();

        if !direct_edges {
            return Network {
                names,
                oriented: false,
                undirected: pairs(skeleton.iter().copied()),
                directed: Vec::new(),
            };
        }

        let mut arrows: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (w, neighbors) in adjacency.iter().enumerate() {
            let spokes: Vec<usize> = neighbors.iter().map(|x| x.as_usize()).collect();
            for (i, &u) in spokes.iter().enumerate() {
                for &v in &spokes[i + 1..] {
                    if skeleton.contains(&(u, v)) {
                        continue;
                    }
                    let mut pool = adjacency[u].union(&adjacency[v]);
                    pool.remove(V::from_usize(u));
                    pool.remove(V::from_usize(v));
                    let (_, sep) = data.min_assoc_score_subset(
                        V::from_usize(u),
                        V::from_usize(v),
                        &pool,
                        max_conditioning,
                    );
                    if !sep.contains(V::from_usize(w)) {
                        for parent in [u, v] {
                            if arrows.contains(&(w, parent)) {
                                debug!(at = w, from = parent, "conflicting v-structure, keeping first");
                            } else {
                                arrows.insert((parent, w));
                            }
                        }
                    }
                }
            }
        }

        let undirected = pairs(
            skeleton
                .iter()
                .copied()
                .filter(|&(u, v)| !arrows.contains(&(u, v)) && !arrows.contains(&(v, u))),
        );
        Network {
            names,
            oriented: true,
            undirected,
            directed: pairs(arrows.iter().copied()),
        }
    }

    /// The edges left undirected, as index pairs with the smaller index
    /// first, in ascending order.
    pub fn undirected_edges(&self) -> &[(V, V)] {
        &self.undirected
    }

    /// The oriented edges as (parent, child) pairs, in ascending order.
    pub fn directed_edges(&self) -> &[(V, V)] {
        &self.directed
    }

    /// Writes the network in Graphviz DOT form: a `graph` of `--` edges for
    /// a plain skeleton, a `digraph` with `[dir=none]` leftovers when the
    /// v-structures have been oriented.
    pub fn write_graphviz<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.oriented {
            writeln!(out, "digraph {{")?;
            for &(u, v) in &self.directed {
                writeln!(
                    out,
                    "  \"{}\" -> \"{}\";",
                    self.names[u.as_usize()],
                    self.names[v.as_usize()]
                )?;
            }
            for &(u, v) in &self.undirected {
                writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [dir=none];",
                    self.names[u.as_usize()],
                    self.names[v.as_usize()]
                )?;
            }
        } else {
            writeln!(out, "graph {{")?;
            for &(u, v) in &self.undirected {
                writeln!(
                    out,
                    "  \"{}\" -- \"{}\";",
                    self.names[u.as_usize()],
                    self.names[v.as_usize()]
                )?;
            }
        }
        writeln!(out, "}}")
    }

    /// The DOT rendering as a string.
    pub fn to_dot(&self) -> String {
        let mut out = Vec::new();
        self.write_graphviz(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }
}

fn pairs<V: VariableId>(edges: impl Iterator<Item = (usize, usize)>) -> Vec<(V, V)> {
    edges
        .map(|(u, v)| (V::from_usize(u), V::from_usize(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CtCounter;

    #[test]
    fn symmetry_correction_drops_one_sided_edges() {
        // Names only; skeleton assembly asks the oracle nothing else.
        let counter = CtCounter::create(3, 2, vec![0u8; 6]).unwrap();
        let data = DiscreteData::with_names(&counter, ["A", "B", "C"], 0.05).unwrap();
        let cpcs = vec![
            VariableSet::from_slice(&[1u8, 2]), // A claims B and C
            VariableSet::from_slice(&[0u8]),    // B claims A
            VariableSet::new(),                 // C claims nobody
        ];
        let network = Network::assemble(&data, &cpcs, false, 3);
        assert_eq!(network.undirected_edges(), &[(0u8, 1)]);
        assert!(network.directed_edges().is_empty());
        let dot = network.to_dot();
        assert_eq!(dot, "graph {\n  \"A\" -- \"B\";\n}\n");
    }
}
