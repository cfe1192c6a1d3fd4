//! Exact synthetic datasets for the end-to-end suites.
//!
//! Each dataset is generated from a small Bayesian network whose conditional
//! probabilities are rationals with a constant denominator per node, and the
//! observation counts are exactly proportional to the joint distribution.
//! Two things follow: every d-separation statement of the network holds in
//! the data with G² = 0 exactly, and with the scales chosen here every
//! d-connection statement is decisive at α = 0.05. The expected blankets
//! are therefore readable straight off the graph.

#![allow(dead_code)]

use blanket::counter::CtCounter;

/// One binary node of a generating network: its parents (by index) and the
/// numerators of P(value | parents). The denominator is the numerator sum
/// and must not depend on the parent values.
pub struct Node {
    pub name: &'static str,
    pub parents: &'static [usize],
    pub dist: fn(&[u8]) -> [u32; 2],
}

fn coin(_: &[u8]) -> [u32; 2] {
    [1, 1]
}

fn always_zero(_: &[u8]) -> [u32; 2] {
    [1, 0]
}

/// Leans toward its single parent's value: P(child = parent) = 3/4.
fn lean(parents: &[u8]) -> [u32; 2] {
    if parents[0] == 0 {
        [3, 1]
    } else {
        [1, 3]
    }
}

/// A noisy two-parent collider: P(1) grows with the number of active
/// parents (1/4, 1/2, 3/4), never deterministic.
fn tilt(parents: &[u8]) -> [u32; 2] {
    match parents[0] + parents[1] {
        0 => [3, 1],
        1 => [2, 2],
        _ => [1, 3],
    }
}

/// A → B → C.
pub fn chain() -> Vec<Node> {
    vec![
        Node { name: "A", parents: &[], dist: coin },
        Node { name: "B", parents: &[0], dist: lean },
        Node { name: "C", parents: &[1], dist: lean },
    ]
}

/// D → F ← E, with G on the side.
pub fn collider() -> Vec<Node> {
    vec![
        Node { name: "D", parents: &[], dist: coin },
        Node { name: "E", parents: &[], dist: coin },
        Node { name: "F", parents: &[0, 1], dist: tilt },
        Node { name: "G", parents: &[], dist: coin },
    ]
}

/// The chain and the collider side by side, plus two isolated variables.
pub fn eight_variables() -> Vec<Node> {
    vec![
        Node { name: "A", parents: &[], dist: coin },
        Node { name: "B", parents: &[0], dist: lean },
        Node { name: "C", parents: &[1], dist: lean },
        Node { name: "D", parents: &[], dist: coin },
        Node { name: "E", parents: &[], dist: coin },
        Node { name: "F", parents: &[3, 4], dist: tilt },
        Node { name: "G", parents: &[], dist: coin },
        Node { name: "H", parents: &[], dist: coin },
    ]
}

/// X never varies; Y and Z are fair coins.
pub fn constant_column() -> Vec<Node> {
    vec![
        Node { name: "X", parents: &[], dist: always_zero },
        Node { name: "Y", parents: &[], dist: coin },
        Node { name: "Z", parents: &[], dist: coin },
    ]
}

/// Expands a generating network into names and a variable-major dataset
/// with `scale` observations per unit of joint probability mass.
pub fn build_dataset(nodes: &[Node], scale: u32) -> (Vec<&'static str>, usize, Vec<u8>) {
    let n = nodes.len();
    let mut cells: Vec<(u32, u32)> = Vec::new();
    let mut m = 0usize;
    for mask in 0..(1u32 << n) {
        let value = |i: usize| ((mask >> i) & 1) as u8;
        let mut count = scale;
        for (i, node) in nodes.iter().enumerate() {
            let parents: Vec<u8> = node.parents.iter().map(|&p| value(p)).collect();
            count *= (node.dist)(&parents)[value(i) as usize];
            if count == 0 {
                break;
            }
        }
        if count > 0 {
            cells.push((mask, count));
            m += count as usize;
        }
    }

    let mut data = vec![0u8; n * m];
    let mut row = 0usize;
    for (mask, count) in cells {
        for _ in 0..count {
            for v in 0..n {
                data[v * m + row] = ((mask >> v) & 1) as u8;
            }
            row += 1;
        }
    }
    (nodes.iter().map(|node| node.name).collect(), m, data)
}

/// Builds the counter for a generating network.
pub fn counter_for(nodes: &[Node], scale: u32) -> (Vec<&'static str>, CtCounter) {
    let (names, m, values) = build_dataset(nodes, scale);
    let counter = CtCounter::create(nodes.len(), m, values).unwrap();
    (names, counter)
}
