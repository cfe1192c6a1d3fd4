//! Rank-count equivalence: the distributed paths must return exactly what
//! the sequential paths return, for any number of ranks.

mod common;

use blanket::comm::{channel_group, SoloComm};
use blanket::data::DiscreteData;
use blanket::discovery::{Algorithm, Discovery};
use blanket::VariableSet;
use common::*;
use std::thread;

type Query = (u8, u8, VariableSet<u8>);

// On the collider dataset D → F ← E (with G on the side): the parents are
// separated by the empty set, parent and child are never separated.
fn queries() -> Vec<Query> {
    vec![
        (0, 1, VariableSet::from_slice(&[2u8, 3])),
        (0, 2, VariableSet::from_slice(&[1u8, 3])),
        (1, 2, VariableSet::from_slice(&[0u8, 3])),
        (0, 3, VariableSet::from_slice(&[1u8, 2])),
    ]
}

#[test]
fn any_subset_verdicts_match_across_rank_counts() {
    let (names, counter) = counter_for(&collider(), 500);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();

    let serial: Vec<bool> = queries()
        .iter()
        .map(|(x, y, given)| data.is_independent_any_subset(*x, *y, given, 3))
        .collect();
    assert_eq!(serial, vec![true, false, false, true]);

    for ranks in [1, 2, 4] {
        let per_rank: Vec<Vec<bool>> = thread::scope(|scope| {
            let handles: Vec<_> = channel_group(ranks)
                .into_iter()
                .map(|comm| {
                    let fork = data.fork();
                    scope.spawn(move || {
                        queries()
                            .iter()
                            .map(|(x, y, given)| {
                                fork.is_independent_any_subset_comm(*x, *y, given, 3, &comm)
                            })
                            .collect::<Vec<bool>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for verdicts in per_rank {
            assert_eq!(verdicts, serial, "ranks = {}", ranks);
        }
    }
}

fn network_dots(
    data: &DiscreteData<'_>,
    ranks: usize,
    algo: Algorithm,
    imbalance: f64,
) -> Vec<String> {
    thread::scope(|scope| {
        let handles: Vec<_> = channel_group(ranks)
            .into_iter()
            .map(|comm| {
                let fork = data.fork();
                scope.spawn(move || {
                    let discovery = Discovery::<u8, _>::new(&fork, &comm, algo, 4);
                    discovery.network(true, imbalance).to_dot()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn network_is_identical_for_every_rank_count() {
    let (names, counter) = counter_for(&collider(), 500);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();

    let solo = Discovery::<u8, _>::new(&data, &SoloComm, Algorithm::Gs, 4)
        .network(true, 2.0)
        .to_dot();

    for ranks in [1, 2, 4] {
        for imbalance in [2.0, 0.5] {
            for dot in network_dots(&data, ranks, Algorithm::Gs, imbalance) {
                assert_eq!(dot, solo, "ranks = {}, imbalance = {}", ranks, imbalance);
            }
        }
    }
}

#[test]
fn blanket_queries_agree_across_rank_counts() {
    let (names, counter) = counter_for(&collider(), 500);
    let data = DiscreteData::with_names(&counter, names, 0.05).unwrap();

    for algo in [Algorithm::Mmpc, Algorithm::SiHitonPc] {
        let solo = Discovery::<u8, _>::new(&data, &SoloComm, algo, 4);
        let expected: Vec<VariableSet<u8>> = (0..4u8).map(|t| solo.mb(t)).collect();

        for ranks in [2, 4] {
            let per_rank: Vec<Vec<VariableSet<u8>>> = thread::scope(|scope| {
                let handles: Vec<_> = channel_group(ranks)
                    .into_iter()
                    .map(|comm| {
                        let fork = data.fork();
                        scope.spawn(move || {
                            let discovery = Discovery::<u8, _>::new(&fork, &comm, algo, 4);
                            (0..4u8).map(|t| discovery.mb(t)).collect::<Vec<_>>()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            for blankets in per_rank {
                assert_eq!(blankets, expected, "ranks = {}, algo = {:?}", ranks, algo);
            }
        }
    }
}
