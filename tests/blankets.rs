//! End-to-end neighborhood recovery on exact datasets, for every strategy.

mod common;

use blanket::comm::SoloComm;
use blanket::data::DiscreteData;
use blanket::discovery::{Algorithm, Discovery};
use blanket::VariableSet;
use common::*;

const ALL_ALGORITHMS: [Algorithm; 7] = [
    Algorithm::Gs,
    Algorithm::Iamb,
    Algorithm::InterIamb,
    Algorithm::Mmpc,
    Algorithm::Hiton,
    Algorithm::SiHitonPc,
    Algorithm::GetPc,
];

/// The blankets and PC sets of `eight_variables`, read off the graph:
/// a chain A → B → C, a collider D → F ← E, and two isolated variables.
const EXPECTED_MB: [(&str, &[&str]); 8] = [
    ("A", &["B"]),
    ("B", &["A", "C"]),
    ("C", &["B"]),
    ("D", &["E", "F"]),
    ("E", &["D", "F"]),
    ("F", &["D", "E"]),
    ("G", &[]),
    ("H", &[]),
];

const EXPECTED_PC: [(&str, &[&str]); 8] = [
    ("A", &["B"]),
    ("B", &["A", "C"]),
    ("C", &["B"]),
    ("D", &["F"]),
    ("E", &["F"]),
    ("F", &["D", "E"]),
    ("G", &[]),
    ("H", &[]),
];

fn check_neighborhoods(algo: Algorithm) {
    let (names, counter) = counter_for(&eight_variables(), 8);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let discovery = Discovery::<u8, _>::new(&data, &SoloComm, algo, 8);

    for (target, members) in EXPECTED_MB {
        let t: u8 = data.var_index(target).unwrap();
        let want: VariableSet<u8> = data.var_indices(members).unwrap();
        assert_eq!(discovery.mb(t), want, "blanket of {} under {:?}", target, algo);
    }
    for (target, members) in EXPECTED_PC {
        let t: u8 = data.var_index(target).unwrap();
        let want: VariableSet<u8> = data.var_indices(members).unwrap();
        assert_eq!(discovery.pc(t), want, "pc of {} under {:?}", target, algo);
    }
}

macro_rules! neighborhood_suite {
    ($($name:ident => $algo:expr,)*) => {
        $(
        #[test]
        fn $name() {
            check_neighborhoods($algo);
        }
        )*
    }
}

neighborhood_suite! {
    neighborhoods_gs => Algorithm::Gs,
    neighborhoods_iamb => Algorithm::Iamb,
    neighborhoods_inter_iamb => Algorithm::InterIamb,
    neighborhoods_mmpc => Algorithm::Mmpc,
    neighborhoods_hiton => Algorithm::Hiton,
    neighborhoods_si_hiton_pc => Algorithm::SiHitonPc,
    neighborhoods_getpc => Algorithm::GetPc,
}

#[test]
fn constant_column_is_separated_from_everything() {
    let (names, counter) = counter_for(&constant_column(), 8);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let nil = VariableSet::new();
    let x: u8 = data.var_index("X").unwrap();
    for other in ["Y", "Z"] {
        let y: u8 = data.var_index(other).unwrap();
        assert_eq!(data.p_value(x, y, &nil), 1.0);
    }
    for algo in ALL_ALGORITHMS {
        let discovery = Discovery::<u8, _>::new(&data, &SoloComm, algo, 3);
        assert_eq!(discovery.mb(x), VariableSet::new(), "under {:?}", algo);
    }
}

#[test]
fn blankets_are_symmetric() {
    let (names, counter) = counter_for(&eight_variables(), 8);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    for algo in [Algorithm::Gs, Algorithm::SiHitonPc] {
        let discovery = Discovery::<u8, _>::new(&data, &SoloComm, algo, 8);
        for u in 0..8u8 {
            for v in discovery.mb(u).iter() {
                assert!(
                    discovery.mb(v).contains(u),
                    "{} in mb({}) but not vice versa under {:?}",
                    v,
                    u,
                    algo
                );
            }
        }
    }
}

#[test]
fn collider_is_oriented() {
    let (names, counter) = counter_for(&collider(), 500);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let discovery = Discovery::<u8, _>::new(&data, &SoloComm, Algorithm::Gs, 4);
    let network = discovery.network(true, 2.0);
    assert_eq!(network.directed_edges(), &[(0u8, 2), (1, 2)]);
    assert!(network.undirected_edges().is_empty());
    assert_eq!(
        network.to_dot(),
        "digraph {\n  \"D\" -> \"F\";\n  \"E\" -> \"F\";\n}\n"
    );
}

#[test]
fn chain_stays_undirected() {
    let (names, counter) = counter_for(&chain(), 100);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let discovery = Discovery::<u8, _>::new(&data, &SoloComm, Algorithm::Iamb, 3);
    let network = discovery.network(true, 2.0);
    assert!(network.directed_edges().is_empty());
    assert_eq!(network.undirected_edges(), &[(0u8, 1), (1, 2)]);
}

#[test]
fn skeleton_mode_emits_an_undirected_graph() {
    let (names, counter) = counter_for(&chain(), 100);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let discovery = Discovery::<u8, _>::new(&data, &SoloComm, Algorithm::Mmpc, 3);
    let network = discovery.network(false, 2.0);
    assert_eq!(
        network.to_dot(),
        "graph {\n  \"A\" -- \"B\";\n  \"B\" -- \"C\";\n}\n"
    );
}

#[test]
fn separating_set_of_the_chain_is_the_middle_variable() {
    let (names, counter) = counter_for(&chain(), 100);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let a: u8 = data.var_index("A").unwrap();
    let b: u8 = data.var_index("B").unwrap();
    let c: u8 = data.var_index("C").unwrap();
    let pool = VariableSet::from_slice(&[b]);
    let (score, sep) = data.min_assoc_score_subset(a, c, &pool, 3);
    assert!(data.is_independent_score(score));
    assert_eq!(sep, VariableSet::from_slice(&[b]));
}

#[test]
fn cross_component_independence_is_exact() {
    let (names, counter) = counter_for(&eight_variables(), 8);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();
    let nil = VariableSet::new();
    let a: u8 = data.var_index("A").unwrap();
    let f: u8 = data.var_index("F").unwrap();
    let d: u8 = data.var_index("D").unwrap();
    assert_eq!(data.p_value(a, f, &nil), 1.0);
    assert_eq!(data.p_value(a, d, &VariableSet::from_slice(&[f])), 1.0);
}
