//! Conditional-independence queries over a discrete dataset.
//!
//! [`DiscreteData`] wraps a [`CtCounter`] together with the variable names
//! and the nominal type-I error rate, and answers every statistical question
//! the discovery algorithms ask: the G² likelihood-ratio statistic for a
//! triple ⟨x, y, Z⟩, its χ² p-value, and the derived association scores and
//! independence verdicts, including the "independent given any subset of Z
//! up to size k" scans in a local and a rank-distributed form.
//!
//! Degenerate tables are verdicts, not errors: a zero marginal contributes
//! nothing to G², and a statistic of exactly zero maps to a p-value of 1.

use crate::comm::Communicator;
use crate::counter::CtCounter;
use crate::error::{Error, Result};
use crate::{VariableId, VariableSet};
use lasso::{Key, Rodeo, RodeoReader, Spur};
use statrs::distribution::{ChiSquared, Univariate};
use std::cell::Cell;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::debug;

/// Batch size for the distributed any-subset scan when `CSL_TESTS_THRESHOLD`
/// is not set.
const DEFAULT_TEST_THRESHOLD: u32 = 100;

/// A conditional-independence oracle over one discrete dataset.
///
/// Cloning via [`fork`](DiscreteData::fork) is cheap and gives each rank its
/// own query counter over the same shared observations.
pub struct DiscreteData<'a> {
    counter: &'a CtCounter,
    names: Arc<RodeoReader>,
    threshold: f64,
    tests: Cell<u64>,
}

impl<'a> DiscreteData<'a> {
    /// Constructs the oracle for the given dataset.
    ///
    /// `names` must resolve exactly one name per variable, interned in
    /// variable order; `threshold` is the nominal type-I error rate α.
    pub fn new(counter: &'a CtCounter, names: Arc<RodeoReader>, threshold: f64) -> Result<Self> {
        if names.len() != counter.n() {
            return Err(Error::Shape(format!(
                "number of variables ({}) != number of variable names ({})",
                counter.n(),
                names.len()
            )));
        }
        Ok(DiscreteData {
            counter,
            names,
            threshold,
            tests: Cell::new(0),
        })
    }

    /// Constructs the oracle, interning the given names in order.
    ///
    /// Duplicate names are rejected: the name⇄index mapping must be a
    /// bijection.
    pub fn with_names<I, S>(counter: &'a CtCounter, names: I, threshold: f64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rodeo = Rodeo::default();
        for name in names {
            let before = rodeo.len();
            rodeo.get_or_intern(name.as_ref());
            if rodeo.len() == before {
                return Err(Error::Shape(format!(
                    "duplicate variable name {:?}",
                    name.as_ref()
                )));
            }
        }
        DiscreteData::new(counter, Arc::new(rodeo.into_reader()), threshold)
    }

    /// A copy of this oracle with a fresh query counter, for another rank.
    pub fn fork(&self) -> DiscreteData<'a> {
        DiscreteData {
            counter: self.counter,
            names: Arc::clone(&self.names),
            threshold: self.threshold,
            tests: Cell::new(0),
        }
    }

    /// Number of variables in the dataset.
    pub fn num_vars(&self) -> usize {
        self.counter.n()
    }

    /// Number of observations in the dataset.
    pub fn num_obs(&self) -> usize {
        self.counter.m()
    }

    /// The nominal type-I error rate α.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of p-value evaluations this oracle has performed. The
    /// variable partitioner uses this as its load measure.
    pub fn tests_run(&self) -> u64 {
        self.tests.get()
    }

    /// The name of a variable.
    pub fn var_name<V: VariableId>(&self, x: V) -> &str {
        let key = Spur::try_from_usize(x.as_usize()).expect("variable index out of range");
        self.names.resolve(&key)
    }

    /// The names of all variables in the given set, in set order.
    pub fn var_names<V: VariableId>(&self, vars: &VariableSet<V>) -> Vec<String> {
        vars.iter().map(|x| self.var_name(x).to_owned()).collect()
    }

    /// The index of the variable with the given name, if any.
    pub fn var_index<V: VariableId>(&self, name: &str) -> Option<V> {
        self.names
            .get(name)
            .map(|key| V::from_usize(key.into_usize()))
    }

    /// The indices of all the named variables; `None` if any name is
    /// unknown.
    pub fn var_indices<V: VariableId>(&self, names: &[&str]) -> Option<VariableSet<V>> {
        names.iter().map(|name| self.var_index(*name)).collect()
    }

    /// The degrees of freedom and the G² statistic for ⟨x, y, Z⟩.
    ///
    /// Cells of the contingency cube whose Z-slice is empty are skipped, and
    /// a variable with fewer than two observed values pins the statistic at
    /// zero.
    fn g_square<V: VariableId>(&self, x: V, y: V, given: &VariableSet<V>) -> (f64, f64) {
        let table = self.counter.tabulate(x, y, given);
        let (dx, dy, dz) = (table.dx, table.dy, table.dz);
        if dx < 2 || dy < 2 {
            return (0.0, 0.0);
        }
        let df = ((dx - 1) * (dy - 1) * dz) as f64;

        let mut g = 0.0f64;
        let mut nx = vec![0u32; dx];
        let mut ny = vec![0u32; dy];
        for z in 0..dz {
            let slice = &table.cells[z * dx * dy..(z + 1) * dx * dy];
            let nz: u32 = slice.iter().sum();
            if nz == 0 {
                continue;
            }
            nx.iter_mut().for_each(|c| *c = 0);
            ny.iter_mut().for_each(|c| *c = 0);
            for a in 0..dx {
                for b in 0..dy {
                    let nab = slice[a * dy + b];
                    nx[a] += nab;
                    ny[b] += nab;
                }
            }
            for a in 0..dx {
                for b in 0..dy {
                    let nab = slice[a * dy + b];
                    if nab > 0 {
                        let expected = nx[a] as f64 * ny[b] as f64 / nz as f64;
                        g += nab as f64 * (nab as f64 / expected).ln();
                    }
                }
            }
        }
        (df, 2.0 * g)
    }

    /// The χ² p-value for the G² statistic of ⟨x, y, Z⟩.
    pub fn p_value<V: VariableId>(&self, x: V, y: V, given: &VariableSet<V>) -> f64 {
        self.tests.set(self.tests.get() + 1);
        let (df, g2) = self.g_square(x, y, given);
        if g2 <= 0.0 || df < 1.0 {
            debug!(g2, df, "degenerate table, p-value = 1");
            return 1.0;
        }
        let dist = ChiSquared::new(df).unwrap();
        let p = (1.0 - dist.cdf(g2)).clamp(0.0, 1.0);
        debug!(g2, df, p, "g-square evaluated");
        p
    }

    /// The strength of association between x and y given Z, in `[0, 1]`.
    pub fn assoc_score<V: VariableId>(&self, x: V, y: V, given: &VariableSet<V>) -> f64 {
        1.0 - self.p_value(x, y, given)
    }

    /// Whether an association score certifies independence at α.
    pub fn is_independent_score(&self, assoc_score: f64) -> bool {
        1.0 - assoc_score > self.threshold
    }

    /// Whether x and y are independent given Z at α.
    pub fn is_independent<V: VariableId>(&self, x: V, y: V, given: &VariableSet<V>) -> bool {
        self.p_value(x, y, given) > self.threshold
    }

    /// The smallest association score between x and y over all subsets of
    /// `given` of size at most `max_size`, scanned in ascending size and
    /// lexicographic order within a size.
    ///
    /// The scan stops the moment a score certifies independence; the
    /// smallest separating set is therefore always the one found.
    pub fn min_assoc_score<V: VariableId>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        max_size: usize,
    ) -> f64 {
        let cap = given.len().min(max_size);
        let mut min_score = f64::MAX;
        'sizes: for k in 0..=cap {
            for condition in given.subsets(k) {
                let score = self.assoc_score(x, y, &condition);
                min_score = min_score.min(score);
                if self.is_independent_score(min_score) {
                    break 'sizes;
                }
            }
        }
        debug!(min_score, "min assoc score");
        min_score
    }

    /// Like [`min_assoc_score`](DiscreteData::min_assoc_score), but every
    /// candidate subset is unioned with `seed` before scoring.
    pub fn min_assoc_score_seeded<V: VariableId>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        seed: &VariableSet<V>,
        max_size: usize,
    ) -> f64 {
        let cap = given.len().min(max_size);
        let mut min_score = f64::MAX;
        'sizes: for k in 0..=cap {
            for condition in given.subsets(k) {
                let condition = condition.union(seed);
                let score = self.assoc_score(x, y, &condition);
                min_score = min_score.min(score);
                if self.is_independent_score(min_score) {
                    break 'sizes;
                }
            }
        }
        debug!(min_score, "min assoc score (seeded)");
        min_score
    }

    /// The smallest association score together with the witnessing subset.
    /// Ties go to the first subset encountered in the scan order.
    pub fn min_assoc_score_subset<V: VariableId>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        max_size: usize,
    ) -> (f64, VariableSet<V>) {
        let cap = given.len().min(max_size);
        let mut min_score = f64::MAX;
        let mut witness = VariableSet::new();
        'sizes: for k in 0..=cap {
            for condition in given.subsets(k) {
                let score = self.assoc_score(x, y, &condition);
                if score < min_score {
                    min_score = score;
                    witness = condition;
                }
                if self.is_independent_score(min_score) {
                    break 'sizes;
                }
            }
        }
        (min_score, witness)
    }

    /// Whether x and y are independent given any subset of `given` of size
    /// at most `max_size`.
    pub fn is_independent_any_subset<V: VariableId>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        max_size: usize,
    ) -> bool {
        let min_score = self.min_assoc_score(x, y, given, max_size);
        self.is_independent_score(min_score)
    }

    /// The seeded form of
    /// [`is_independent_any_subset`](DiscreteData::is_independent_any_subset).
    pub fn is_independent_any_subset_seeded<V: VariableId>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        seed: &VariableSet<V>,
        max_size: usize,
    ) -> bool {
        let min_score = self.min_assoc_score_seeded(x, y, given, seed, max_size);
        self.is_independent_score(min_score)
    }

    /// The batch size for the distributed any-subset scan: the value of the
    /// `CSL_TESTS_THRESHOLD` environment variable, read once per process, or
    /// the built-in default.
    pub fn test_threshold() -> u32 {
        static THRESHOLD: OnceLock<u32> = OnceLock::new();
        *THRESHOLD.get_or_init(|| {
            std::env::var("CSL_TESTS_THRESHOLD")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_TEST_THRESHOLD)
        })
    }

    /// The distributed form of
    /// [`is_independent_any_subset`](DiscreteData::is_independent_any_subset):
    /// the subsets are dealt round-robin over the ranks of `comm`.
    ///
    /// Every rank walks the same deterministic enumeration and keeps two
    /// tallies: tests it ran and tests it skipped. Whenever the tallies say
    /// each rank has seen `T` subsets, the ranks reduce their running
    /// minima; an independence verdict at a reduction ends the call on every
    /// rank at once, otherwise the tallies reset and the walk continues. One
    /// final reduction covers the tail batch, so every rank returns the same
    /// boolean.
    pub fn is_independent_any_subset_comm<V: VariableId, C: Communicator>(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        max_size: usize,
        comm: &C,
    ) -> bool {
        let batch = Self::test_threshold() as usize * comm.size();
        let mut mine = 0usize;
        let mut others = 0usize;
        let mut r = 0usize;
        let mut min_score = f64::MAX;
        let cap = given.len().min(max_size);
        for k in 0..=cap {
            for condition in given.subsets(k) {
                if comm.rank() != r {
                    // This test is conducted by some other rank.
                    others += 1;
                } else {
                    mine += 1;
                    // Only conduct more tests while the ones so far have not
                    // already certified independence.
                    if !self.is_independent_score(min_score) {
                        let score = self.assoc_score(x, y, &condition);
                        min_score = min_score.min(score);
                    }
                }
                if mine + others == batch {
                    min_score = comm.all_reduce_min(min_score);
                    if self.is_independent_score(min_score) {
                        return true;
                    }
                    mine = 0;
                    others = 0;
                }
                r = (r + 1) % comm.size();
            }
        }
        min_score = comm.all_reduce_min(min_score);
        self.is_independent_score(min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloComm;
    use crate::counter::CtCounter;

    fn oracle<'a>(counter: &'a CtCounter, names: &[&str]) -> DiscreteData<'a> {
        DiscreteData::with_names(counter, names.iter().copied(), 0.05).unwrap()
    }

    // A: perfectly balanced coin; B: copy of A; C: balanced and exactly
    // independent of both; D: constant.
    fn dataset() -> CtCounter {
        #[rustfmt::skip]
        let values = vec![
            0, 0, 1, 1, 0, 0, 1, 1, // A
            0, 0, 1, 1, 0, 0, 1, 1, // B
            0, 1, 0, 1, 0, 1, 0, 1, // C
            0, 0, 0, 0, 0, 0, 0, 0, // D
        ];
        CtCounter::create(4, 8, values).unwrap()
    }

    #[test]
    fn name_index_round_trip() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        assert_eq!(data.var_name(2u8), "C");
        assert_eq!(data.var_index::<u8>("C"), Some(2));
        assert_eq!(data.var_index::<u8>("missing"), None);
        assert_eq!(
            data.var_indices::<u8>(&["D", "A"]),
            Some(VariableSet::from_slice(&[0, 3]))
        );
        assert_eq!(
            data.var_names(&VariableSet::from_slice(&[1u8, 2])),
            vec!["B".to_owned(), "C".to_owned()]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let counter = dataset();
        assert!(DiscreteData::with_names(&counter, ["A", "A", "C", "D"], 0.05).is_err());
    }

    #[test]
    fn exact_independence_has_unit_p_value() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        let nil = VariableSet::new();
        assert_eq!(data.p_value(0u8, 2, &nil), 1.0);
        assert!(data.is_independent(0u8, 2, &nil));
    }

    #[test]
    fn copies_are_decisively_dependent() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        let nil = VariableSet::new();
        let p = data.p_value(0u8, 1, &nil);
        assert!(p < 0.05, "p = {}", p);
        assert!(!data.is_independent(0u8, 1, &nil));
        assert_eq!(data.assoc_score(0u8, 1, &nil), 1.0 - p);
    }

    #[test]
    fn constant_column_is_independent_of_everything() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        let nil = VariableSet::new();
        for other in [0u8, 1, 2] {
            assert_eq!(data.p_value(3u8, other, &nil), 1.0);
        }
    }

    #[test]
    fn p_values_are_symmetric_and_bounded() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        for x in 0..4u8 {
            for y in 0..4u8 {
                if x == y {
                    continue;
                }
                for z in 0..4u8 {
                    let given = if z == x || z == y {
                        VariableSet::new()
                    } else {
                        VariableSet::from_slice(&[z])
                    };
                    let pxy = data.p_value(x, y, &given);
                    let pyx = data.p_value(y, x, &given);
                    assert!((0.0..=1.0).contains(&pxy));
                    assert!((pxy - pyx).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn min_assoc_score_is_a_lower_bound() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        let given = VariableSet::from_slice(&[1u8, 3]);
        let min = data.min_assoc_score(0u8, 2, &given, 2);
        for k in 0..=2 {
            for subset in given.subsets(k) {
                assert!(min <= data.assoc_score(0u8, 2, &subset));
            }
        }
    }

    #[test]
    fn witness_is_the_smallest_separating_set() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        // A and C are already independent marginally, so the first witness
        // must be the empty set.
        let given = VariableSet::from_slice(&[1u8, 3]);
        let (score, witness) = data.min_assoc_score_subset(0u8, 2, &given, 2);
        assert!(data.is_independent_score(score));
        assert!(witness.is_empty());
    }

    #[test]
    fn solo_distributed_scan_matches_serial() {
        let counter = dataset();
        let data = oracle(&counter, &["A", "B", "C", "D"]);
        let given = VariableSet::from_slice(&[2u8, 3]);
        let serial = data.is_independent_any_subset(0u8, 1, &given, 2);
        let solo = data.is_independent_any_subset_comm(0u8, 1, &given, 2, &SoloComm);
        assert_eq!(serial, solo);
        assert!(!serial);
    }
}
